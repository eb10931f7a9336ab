use std::path::Path;

use vecload_core::config::{EmbeddingBackend, EmbeddingSettings};
use vecload_core::traits::Embedder;
use vecload_embed::{load_embedder, HashEmbedder};

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[test]
fn hashed_embedder_shapes_and_determinism() {
    let embedder = HashEmbedder::new(384);
    let texts = vec![
        r#"{"id":"e1","text":"red banner"}"#.to_string(),
        r#"{"id":"e1","text":"red banner"}"#.to_string(),
    ];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let (v1, v2) = (&embs[0], &embs[1]);

    assert_eq!(v1.len(), 384, "embedding dim is 384");
    assert!((norm(v1) - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={})", norm(v1));
    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn hashed_embedder_separates_different_texts() {
    let embedder = HashEmbedder::new(64);
    let a = embedder.embed_text("red banner").unwrap();
    let b = embedder.embed_text("blue banner").unwrap();
    assert_ne!(a, b);
    assert!(embedder.embed_text("   ").is_err(), "empty text is a per-record failure");
    assert!((norm(&embedder.embed_text("{}").unwrap()) - 1.0).abs() <= 1e-3, "punctuation-only text still embeds");
}

#[test]
fn hashed_backend_is_selected_from_settings() {
    let settings = EmbeddingSettings { backend: EmbeddingBackend::Hashed, hashed_dim: 16, ..EmbeddingSettings::default() };
    let embedder = load_embedder(&settings, Path::new(".")).expect("embedder");
    assert_eq!(embedder.dim(), 16);
    assert_eq!(embedder.embed_text("hello world").unwrap().len(), 16);
}

#[test]
fn missing_model_dir_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let settings = EmbeddingSettings { model_dir: "no-such-model".into(), ..EmbeddingSettings::default() };
    if std::env::var("APP_USE_FAKE_EMBEDDINGS").is_ok() || std::env::var("APP_MODEL_DIR").is_ok() || std::env::var("MODEL_DIR").is_ok() {
        return;
    }
    assert!(load_embedder(&settings, tmp.path()).is_err());
}
