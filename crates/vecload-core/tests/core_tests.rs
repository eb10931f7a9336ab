use std::fs;
use std::path::Path;
use tempfile::TempDir;

use vecload_core::config::{Config, FailurePolicy, ProvisionMode};
use vecload_core::record_source::RecordSource;
use vecload_core::types::{IndexDescription, Metric, Topology, CONTENT_METADATA_KEY};
use vecload_core::types::{EmbeddingVector, VectorItem};
use vecload_core::{Error, Stage};

#[test]
fn missing_id_elements_are_dropped_not_fatal() {
    let raw = br#"{"design":[{"id":"a","text":"one"},{"x":"no-id"},{"id":"b","text":"two"}]}"#;
    let set = RecordSource::default().parse(raw).expect("parse");

    let ids: Vec<&str> = set.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"], "exactly the two elements with ids survive, in order");
    assert_eq!(set.elements_seen, 3);
    assert_eq!(set.missing_id, 1);
    assert_eq!(set.duplicate_id, 0);
}

#[test]
fn missing_records_field_is_fatal() {
    let err = RecordSource::default()
        .parse(br#"{"items":[{"id":"a"}]}"#)
        .expect_err("no design array");
    assert!(matches!(err, Error::MalformedInput(_)));
    assert_eq!(err.stage(), Stage::Input);

    let err = RecordSource::default()
        .parse(br#"{"design":{"id":"a"}}"#)
        .expect_err("design is not an array");
    assert!(err.to_string().contains("not an array"));

    assert!(RecordSource::default().parse(b"[1,2,3]").is_err(), "top level must be an object");
    assert!(RecordSource::default().parse(b"{not json").is_err());
}

#[test]
fn empty_design_array_yields_no_records() {
    let set = RecordSource::default().parse(br#"{"design":[]}"#).expect("parse");
    assert!(set.records.is_empty());
    assert_eq!(set.elements_seen, 0);
}

#[test]
fn duplicate_ids_keep_first_occurrence() {
    let raw = br#"{"design":[{"id":"a","v":1},{"id":"a","v":2},{"id":"b"}]}"#;
    let set = RecordSource::default().parse(raw).expect("parse");
    assert_eq!(set.records.len(), 2);
    assert_eq!(set.records[0].payload["v"], 1);
    assert_eq!(set.duplicate_id, 1);
    assert_eq!(set.skipped(), 1);
}

#[test]
fn content_is_the_whole_element_in_key_order() {
    let raw = br#"{"design":[{"text":"red banner","id":"e1","size":{"w":728,"h":90}}]}"#;
    let set = RecordSource::default().parse(raw).expect("parse");
    assert_eq!(
        set.records[0].content,
        r#"{"text":"red banner","id":"e1","size":{"w":728,"h":90}}"#
    );

    let item = VectorItem::from_record(
        &set.records[0],
        EmbeddingVector { id: "e1".into(), values: vec![0.0; 3] },
    );
    assert_eq!(item.metadata[CONTENT_METADATA_KEY], set.records[0].content.as_str());
}

#[test]
fn integral_floats_are_written_like_javascript() {
    let raw = br#"{"design":[{"id":"e1","w":1.0,"h":2.5,"z":-0.0,"tags":[3.0,{"x":1e3}]}]}"#;
    let set = RecordSource::default().parse(raw).expect("parse");
    assert_eq!(set.records[0].content, r#"{"id":"e1","w":1,"h":2.5,"z":0,"tags":[3,{"x":1000}]}"#);
    assert_eq!(set.records[0].payload["w"], serde_json::json!(1.0), "payload stays verbatim");
}

#[test]
fn load_reads_from_disk() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("designs.json");
    fs::write(&path, r#"{"design":[{"id":"e1"}]}"#).unwrap();
    let set = RecordSource::default().load(&path).expect("load");
    assert_eq!(set.records.len(), 1);

    let err = RecordSource::default().load(&tmp.path().join("missing.json")).expect_err("missing file");
    assert_eq!(err.stage(), Stage::Input);
}

#[test]
fn differences_name_each_drifted_field() {
    let desired = vecload_core::config::IndexSettings::default().descriptor();
    let observed = IndexDescription {
        name: desired.name.clone(),
        dimension: 768,
        metric: Metric::Dotproduct,
        topology: Some(Topology::Serverless { cloud: "gcp".into(), region: "us-central1".into() }),
        host: None,
        ready: true,
    };
    let diffs = observed.differences(&desired);
    assert_eq!(diffs.len(), 3, "{diffs:?}");
    assert!(diffs[0].contains("768"));

    let same = IndexDescription { dimension: 384, metric: Metric::Cosine, topology: Some(desired.topology.clone()), ..observed };
    assert!(same.differences(&desired).is_empty());
}

#[test]
fn settings_layer_defaults_file_and_env() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
            [index]
            name = "banners"
            mode = "recreate_on_drift"

            [ingest]
            batch_size = 50
            on_batch_failure = "continue"
            "#,
        )?;
        jail.set_env("APP_INGEST__BATCH_SIZE", "25");
        jail.set_env("PINECONE_API_KEY", "pc-test");

        let config = Config::load_from(Path::new("config.toml")).expect("load");
        let settings = config.settings().expect("settings");
        assert_eq!(settings.index.name, "banners");
        assert_eq!(settings.index.mode, ProvisionMode::RecreateOnDrift);
        assert_eq!(settings.index.dimension, 384, "default survives");
        assert_eq!(settings.ingest.batch_size, 25, "env overrides file");
        assert_eq!(settings.ingest.on_batch_failure, FailurePolicy::Continue);
        assert_eq!(settings.pinecone.api_key.as_deref(), Some("pc-test"));

        let name: String = config.get("index.name").expect("get");
        assert_eq!(name, "banners");
        Ok(())
    });
}

#[test]
fn invalid_settings_are_rejected() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[ingest]\nbatch_size = 0\n")?;
        let err = Config::load_from(Path::new("config.toml"))
            .expect("load")
            .settings()
            .expect_err("zero batch size");
        assert_eq!(err.stage(), Stage::Config);
        Ok(())
    });
}
