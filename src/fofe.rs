//! Fixed-size ordinally-forgetting encoding (FOFE).
//!
//! FOFE collapses a variable-length sequence of token vectors into a single
//! fixed-size vector while remaining sensitive to token order: the most
//! recent token has weight 1 and every earlier token is down-weighted by a
//! power of the forgetting factor `α ∈ (0, 1)`:
//!
//! ```text
//! z = Σ_{i=1..k} α^{k-i} · v_i
//! ```
//!
//! The implementation precomputes, per sequence length `k`, the lower
//! triangular matrix `M_k` with `M_k[r][c] = α^{r-c}` for `r ≥ c`; the
//! encoding of a `k`-token sequence is the last row of `M_k · V`, where `V`
//! stacks the token vectors as rows. Matrices are cached inside the encoder,
//! grown lazily, and bounded by the maximum supported sequence length;
//! longer sequences are truncated to that length before encoding.
//!
//! Reference: Zhang, Jiang, Xu, Hou, Dai, "The Fixed-Size
//! Ordinally-Forgetting Encoding Method for Neural Network Language Models"
//! (ACL 2015).

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Default maximum number of tokens a sequence may contribute.
pub const DEFAULT_MAX_ORDER: usize = 50;

/// FOFE encoder with an owned, lazily grown matrix cache.
///
/// The cache is internally synchronized, so a shared `Fofe` can serve
/// concurrent `encode` calls without external locking.
#[derive(Debug)]
pub struct Fofe {
    alpha: f32,
    max_order: usize,
    matrices: Mutex<HashMap<usize, Arc<Vec<f32>>>>,
}

impl Fofe {
    /// Create an encoder with the given forgetting factor.
    ///
    /// Fails unless `alpha` lies strictly in `(0, 1)`.
    pub fn new(alpha: f32) -> Result<Self> {
        Self::with_max_order(alpha, DEFAULT_MAX_ORDER)
    }

    /// Create an encoder with an explicit maximum supported order.
    pub fn with_max_order(alpha: f32, max_order: usize) -> Result<Self> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(Error::invalid_input(format!(
                "forgetting factor must be in (0, 1), got {alpha}"
            )));
        }
        if max_order == 0 {
            return Err(Error::invalid_input("max order must be at least 1"));
        }
        Ok(Self {
            alpha,
            max_order,
            matrices: Mutex::new(HashMap::new()),
        })
    }

    /// The forgetting factor.
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// The maximum sequence length encoded without truncation.
    #[must_use]
    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// The cached lower-triangular matrix of the given order, row-major.
    ///
    /// `matrix(k)[r * k + c]` is `α^{r-c}` for `r ≥ c` and `0` otherwise.
    /// Orders above the supported maximum are clamped to it.
    pub fn matrix(&self, order: usize) -> Arc<Vec<f32>> {
        let order = order.min(self.max_order).max(1);
        let mut cache = self.matrices.lock().expect("fofe matrix cache poisoned");
        cache
            .entry(order)
            .or_insert_with(|| Arc::new(build_matrix(self.alpha, order)))
            .clone()
    }

    /// Encode a sequence of token vectors into one fixed-size vector.
    ///
    /// All vectors must share the same dimension. Sequences longer than the
    /// maximum supported order are truncated to it; an empty sequence
    /// produces the zero vector of dimension `dim`.
    pub fn encode(&self, vectors: &[Vec<f32>], dim: usize) -> Result<Vec<f32>> {
        if vectors.is_empty() {
            return Ok(vec![0.0; dim]);
        }
        let k = vectors.len().min(self.max_order);
        let vectors = &vectors[..k];
        for v in vectors {
            if v.len() != dim {
                return Err(Error::inference(format!(
                    "token vector dimension {} does not match expected {dim}",
                    v.len()
                )));
            }
        }

        // The encoding is the last row of M_k · V; row k-1 of M_k holds
        // α^{k-1-c}, so only that row participates.
        let matrix = self.matrix(k);
        let last_row = &matrix[(k - 1) * k..k * k];

        let mut encoding = vec![0.0f32; dim];
        for (weight, v) in last_row.iter().zip(vectors) {
            for (z, x) in encoding.iter_mut().zip(v) {
                *z += weight * x;
            }
        }
        Ok(encoding)
    }
}

/// Build the order-`k` lower-triangular forgetting matrix, row-major.
fn build_matrix(alpha: f32, order: usize) -> Vec<f32> {
    let mut m = vec![0.0f32; order * order];
    for c in 0..order {
        let mut p = 0i32;
        for r in c..order {
            m[r * order + c] = alpha.powi(p);
            p += 1;
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_alpha_outside_unit_interval() {
        assert!(Fofe::new(0.0).is_err());
        assert!(Fofe::new(1.0).is_err());
        assert!(Fofe::new(-0.5).is_err());
        assert!(Fofe::new(0.5).is_ok());
    }

    #[test]
    fn matrix_is_lower_triangular_with_unit_diagonal() {
        let fofe = Fofe::new(0.5).unwrap();
        for k in [1usize, 3, 6] {
            let m = fofe.matrix(k);
            for r in 0..k {
                for c in 0..k {
                    let value = m[r * k + c];
                    if r >= c {
                        let expected = 0.5f32.powi((r - c) as i32);
                        assert!((value - expected).abs() < 1e-6, "M[{r}][{c}]");
                    } else {
                        assert_eq!(value, 0.0, "M[{r}][{c}] above diagonal");
                    }
                }
            }
        }
    }

    #[test]
    fn single_token_is_identity() {
        let fofe = Fofe::new(0.3).unwrap();
        let v = vec![vec![0.25f32, -1.0, 4.0]];
        let z = fofe.encode(&v, 3).unwrap();
        assert_eq!(z, v[0]);
    }

    #[test]
    fn encoding_is_order_sensitive() {
        let fofe = Fofe::new(0.5).unwrap();
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        let ab = fofe.encode(&[a.clone(), b.clone()], 2).unwrap();
        let ba = fofe.encode(&[b, a], 2).unwrap();
        assert_ne!(ab, ba);
        // Most recent token carries weight 1, earlier token α.
        assert_eq!(ab, vec![0.5, 1.0]);
        assert_eq!(ba, vec![1.0, 0.5]);
    }

    #[test]
    fn truncates_beyond_max_order() {
        let fofe = Fofe::with_max_order(0.5, 3).unwrap();
        let tokens: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32]).collect();
        let z = fofe.encode(&tokens, 1).unwrap();
        // Only the first three tokens contribute: 0·α² + 1·α + 2·1.
        assert!((z[0] - (0.25 * 0.0 + 0.5 * 1.0 + 2.0)).abs() < 1e-6);
    }

    #[test]
    fn empty_sequence_is_zero_vector() {
        let fofe = Fofe::new(0.9).unwrap();
        let z = fofe.encode(&[], 4).unwrap();
        assert_eq!(z, vec![0.0; 4]);
    }

    #[test]
    fn cache_is_grown_lazily_and_reused() {
        let fofe = Fofe::new(0.8).unwrap();
        let first = fofe.matrix(5);
        let second = fofe.matrix(5);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
