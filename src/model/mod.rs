//! Byte-level model interface (spec §4.D, component D).
//!
//! This is the contract the concrete LM backends (remote HTTP service,
//! in-process neural network, n-gram table) satisfy; this crate never talks
//! to any of them directly, only through [`ByteModel`]. `predict` is the
//! crate's only external suspension point (spec §5): every other `async fn`
//! in this crate eventually bottoms out in a call to it (directly, or via the
//! [`crate::cache::TrieCache`]).

use crate::{Error, Probability, Result};
use async_trait::async_trait;

/// `predict(prefix, min_prob) -> distribution` (spec §6). The returned
/// vector always has exactly 256 entries summing to 1 within
/// [`crate::DISTRIBUTION_SUM_TOLERANCE`]; bytes that would produce illegal
/// UTF-8 continuations must be exactly 0. Implementations may omit
/// (zero-out) entries below `min_prob`, but must never omit a non-zero entry
/// at or above it.
#[async_trait]
pub trait ByteModel: Send + Sync {
    async fn predict(&self, prefix: &[u8], min_prob: Probability) -> Result<Distribution>;

    /// The "trie-pre-populated variant" (spec §6): a backend may override
    /// this to return not just the requested distribution but a nested
    /// structure of sub-trees it has already expanded, so
    /// [`crate::cache::CachingByteModel`] can populate several cache entries
    /// from one call instead of one. The default wraps a plain [`predict`]
    /// call into a childless leaf — the common case for backends with no
    /// eager-expansion capability.
    ///
    /// [`predict`]: ByteModel::predict
    async fn predict_tree(&self, prefix: &[u8], min_prob: Probability) -> Result<PredictionTree> {
        Ok(PredictionTree::leaf(self.predict(prefix, min_prob).await?))
    }
}

/// A nested `{dist, children: {byte -> subtree}}` structure (spec §6): some
/// backends expand several levels of the byte trie in one round trip and
/// return every sub-tree they computed along the way, not just the one at
/// the requested prefix.
#[derive(Debug, Clone)]
pub struct PredictionTree {
    pub distribution: Distribution,
    pub children: std::collections::HashMap<u8, PredictionTree>,
}

impl PredictionTree {
    /// A tree with no pre-expanded children, the shape every plain
    /// [`ByteModel::predict`] call degrades to.
    pub fn leaf(distribution: Distribution) -> Self {
        PredictionTree { distribution, children: std::collections::HashMap::new() }
    }
}

/// A validated 256-wide byte distribution.
#[derive(Debug, Clone)]
pub struct Distribution {
    probabilities: [Probability; 256],
}

impl Distribution {
    /// Validates the §7 `InvalidDistribution` contract: exactly 256
    /// non-negative entries summing to 1 within tolerance.
    pub fn new(probabilities: [Probability; 256]) -> Result<Self> {
        let sum: Probability = probabilities.iter().sum();
        if probabilities.iter().any(|&p| p < 0.0) {
            return Err(Error::InvalidDistribution {
                detail: "negative probability entry".into(),
            });
        }
        if (sum - 1.0).abs() > crate::DISTRIBUTION_SUM_TOLERANCE {
            return Err(Error::InvalidDistribution {
                detail: format!("sum {sum} outside [1 - 1e-6, 1 + 1e-6]"),
            });
        }
        Ok(Distribution { probabilities })
    }

    /// Bypasses the sum-to-1 check for the one legitimate all-zero case:
    /// the UTF-8 legality filter's renormalisation (spec §4.G) produces the
    /// all-zero vector when no continuation byte is legal, and that vector
    /// cannot itself sum to 1.
    pub(crate) fn from_raw_unchecked(probabilities: [Probability; 256]) -> Self {
        Distribution { probabilities }
    }

    pub fn get(&self, byte: u8) -> Probability {
        self.probabilities[byte as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, Probability)> + '_ {
        self.probabilities
            .iter()
            .enumerate()
            .map(|(b, &p)| (b as u8, p))
    }

    pub fn as_array(&self) -> &[Probability; 256] {
        &self.probabilities
    }
}

/// Validates an arbitrary (non-byte-length) distribution against the same
/// sum/negativity contract, used by [`crate::cdf::adapt_model`] callers that
/// wrap a plain `(prefix) -> distribution` token model.
pub fn validate_probabilities<I: IntoIterator<Item = Probability>>(ps: I) -> Result<()> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for p in ps {
        if p < 0.0 {
            return Err(Error::InvalidDistribution {
                detail: "negative probability entry".into(),
            });
        }
        sum += p;
        count += 1;
    }
    if count == 0 {
        return Ok(());
    }
    if (sum - 1.0).abs() > crate::DISTRIBUTION_SUM_TOLERANCE {
        return Err(Error::InvalidDistribution {
            detail: format!("sum {sum} outside [1 - 1e-6, 1 + 1e-6]"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_valid_distribution() {
        let mut p = [0.0; 256];
        p[0] = 0.5;
        p[1] = 0.5;
        assert!(Distribution::new(p).is_ok());
    }

    #[test]
    fn rejects_negative_entries() {
        let mut p = [0.0; 256];
        p[0] = 1.5;
        p[1] = -0.5;
        assert!(matches!(
            Distribution::new(p),
            Err(Error::InvalidDistribution { .. })
        ));
    }

    #[test]
    fn rejects_bad_sum() {
        let mut p = [0.0; 256];
        p[0] = 0.9;
        assert!(matches!(
            Distribution::new(p),
            Err(Error::InvalidDistribution { .. })
        ));
    }
}
