//! Embedding utilities
//!
//! Vector helpers plus the deterministic SHA-256-derived fallback used when
//! no remote embedding endpoint is reachable. The fallback keeps semantic
//! dedup reproducible in tests and degraded environments.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::LlmError;

/// Anything that can turn text into a fixed-dimension vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// Output dimension
    fn dim(&self) -> usize;
}

/// Scale a vector to unit L2 norm in place
///
/// Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f64 = vector.iter().map(|v| f64::from(*v) * f64::from(*v)).sum();
    let norm = norm.sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v = (f64::from(*v) / norm) as f32;
        }
    }
}

/// Cosine similarity of two vectors
///
/// Returns 0.0 when either vector has zero norm or lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Deterministic SHA-256-derived embedding
///
/// Expands `SHA-256(text)` into `dim` floats in `[-1, 1]` by hashing the
/// seed with a block counter, then L2-normalizes. Identical text always
/// yields an identical vector.
#[must_use]
pub fn fallback_embedding(text: &str, dim: usize) -> Vec<f32> {
    let seed = Sha256::digest(text.as_bytes());
    let mut out = Vec::with_capacity(dim);
    let mut counter: u32 = 0;

    while out.len() < dim {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(counter.to_le_bytes());
        let block = hasher.finalize();
        for chunk in block.chunks_exact(4) {
            if out.len() == dim {
                break;
            }
            let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let unit = f64::from(raw) / f64::from(u32::MAX);
            out.push((unit * 2.0 - 1.0) as f32);
        }
        counter += 1;
    }

    l2_normalize(&mut out);
    out
}
