use std::hash::Hasher;

use anyhow::{ensure, Result};
use twox_hash::XxHash64;
use vecload_core::traits::Embedder;

/// Model-free embedder: each alphanumeric token is hashed into a bucket of a
/// fixed-size vector, which is then L2-normalized. Deterministic across runs
/// and platforms; used for tests and dry runs.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn bucket(token: &str) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(token.as_bytes());
        hasher.finish()
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        usize::MAX
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        ensure!(!text.trim().is_empty(), "cannot embed empty text");
        let mut v = vec![0f32; self.dim];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        let mut any = false;
        for (i, token) in tokens.enumerate() {
            let h = Self::bucket(&token);
            let idx = (h % self.dim as u64) as usize;
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += val + (i % 3) as f32 * 0.01;
            any = true;
        }
        if !any {
            let h = Self::bucket(text);
            v[(h % self.dim as u64) as usize] = 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        Ok(v)
    }
}
