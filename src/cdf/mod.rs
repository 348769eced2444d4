//! CDF view and `adaptModel` (spec §4.E, component E).
//!
//! A CDF view turns a plain `(prefix) -> distribution` model into a
//! filterable, lazy listing of `(token, start, end)` extents. Every other
//! probability-bearing component in this crate (the byte→codepoint adapter,
//! the interpolator, the scene builder) consumes this trait rather than a
//! concrete model, so they can be composed freely.

use crate::model::validate_probabilities;
use crate::{Error, Probability, Result, Token, TokenProb};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// `(token, start, end)` with `0 ≤ start ≤ end ≤ 1`. The extent of a
/// `(prefix, token)` pair is deterministic: any two queries against the same
/// prefix return identical extents for a token they both yield (spec §8,
/// property 1).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TokenCdfExtent<T> {
    pub token: T,
    pub start: Probability,
    pub end: Probability,
}

impl<T> TokenCdfExtent<T> {
    pub fn probability(&self) -> Probability {
        self.end - self.start
    }
}

/// The range/min-probability half of a CDF query. Uses the closed
/// convention `end ≥ start ∧ start ≤ end` (spec §9 Open Question): a
/// point query at an exact boundary yields both adjacent tokens.
#[derive(Debug, Clone, Copy)]
pub struct ProbeRange {
    pub start: Probability,
    pub end: Probability,
    pub min_prob: Probability,
}

impl ProbeRange {
    pub const FULL: ProbeRange = ProbeRange { start: 0.0, end: 1.0, min_prob: 0.0 };

    pub fn overlaps(&self, extent_start: Probability, extent_end: Probability) -> bool {
        extent_end >= self.start && extent_start <= self.end
    }
}

/// A polymorphic, filterable, lazy CDF view over a language model.
///
/// `query` is not itself `async`: it returns a cold, cancellable stream —
/// dropping it before exhausting it must make no further model calls (spec
/// §5 cancellation).
pub trait CdfView<T: Token>: Send + Sync {
    /// If `specific` is given, at most one element is produced — the extent
    /// of that token — and `range` is ignored. Otherwise, produces exactly
    /// those extents with `end ≥ range.start ∧ start ≤ range.end` and
    /// `end - start ≥ range.min_prob`.
    fn query<'a>(
        &'a self,
        prefix: &'a [T],
        range: ProbeRange,
        specific: Option<&'a T>,
    ) -> BoxStream<'a, Result<TokenCdfExtent<T>>>;

    /// Convenience wrapper for the common single-token lookup.
    fn specific<'a>(
        &'a self,
        prefix: &'a [T],
        token: &'a T,
    ) -> BoxStream<'a, Result<TokenCdfExtent<T>>> {
        self.query(prefix, ProbeRange::FULL, Some(token))
    }
}

/// A plain `(prefix) -> distribution` model, the input to `adapt_model`.
#[async_trait]
pub trait PlainModel<T: Token>: Send + Sync {
    async fn distribution(&self, prefix: &[T]) -> Result<Vec<TokenProb<T>>>;
}

/// `adaptModel(inner)`: wraps a [`PlainModel`] into a [`CdfView`] by
/// accumulating cumulative positions in input order, short-circuiting on
/// `specific`, and otherwise filtering by `range`. The cumulative sum uses
/// the same float operations in the same order for every call against a
/// given prefix, so extents are deterministic regardless of the query
/// window (spec §4.E).
pub struct AdaptedModel<T, M> {
    inner: M,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T, M> AdaptedModel<T, M> {
    pub fn new(inner: M) -> Self {
        AdaptedModel { inner, _marker: std::marker::PhantomData }
    }
}

pub fn adapt_model<T: Token, M: PlainModel<T>>(inner: M) -> AdaptedModel<T, M> {
    AdaptedModel::new(inner)
}

impl<T: Token, M: PlainModel<T>> CdfView<T> for AdaptedModel<T, M> {
    fn query<'a>(
        &'a self,
        prefix: &'a [T],
        range: ProbeRange,
        specific: Option<&'a T>,
    ) -> BoxStream<'a, Result<TokenCdfExtent<T>>> {
        let inner = &self.inner;
        Box::pin(async_stream::try_stream! {
            let dist = inner.distribution(prefix).await?;
            validate_probabilities(dist.iter().map(|tp| tp.probability)).map_err(|_| {
                Error::InvalidDistribution { detail: "adapted model distribution".into() }
            })?;
            let mut cumulative: Probability = 0.0;
            for tp in dist {
                let start = cumulative;
                let end = cumulative + tp.probability;
                cumulative = end;
                if let Some(target) = specific {
                    if &tp.token == target {
                        yield TokenCdfExtent { token: tp.token, start, end };
                        return;
                    }
                    continue;
                }
                if range.overlaps(start, end) && (end - start) >= range.min_prob {
                    yield TokenCdfExtent { token: tp.token, start, end };
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct Fixed(Vec<TokenProb<char>>);

    #[async_trait]
    impl PlainModel<char> for Fixed {
        async fn distribution(&self, _prefix: &[char]) -> Result<Vec<TokenProb<char>>> {
            Ok(self.0.clone())
        }
    }

    fn ab_model() -> AdaptedModel<char, Fixed> {
        adapt_model(Fixed(vec![
            TokenProb { token: 'a', probability: 0.5 },
            TokenProb { token: 'b', probability: 0.5 },
        ]))
    }

    #[tokio::test]
    async fn full_cdf_tiles_with_no_gaps() {
        let model = ab_model();
        let extents: Vec<_> = model
            .query(&[], ProbeRange::FULL, None)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(extents.len(), 2);
        let mut sorted = extents.clone();
        sorted.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap());
        assert_eq!(sorted[0].start, 0.0);
        assert_eq!(sorted[0].end, 0.5);
        assert_eq!(sorted[1].start, 0.5);
        assert_eq!(sorted[1].end, 1.0);
    }

    #[tokio::test]
    async fn specific_token_short_circuits() {
        let model = ab_model();
        let extents: Vec<_> = model
            .specific(&[], &'b')
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(extents, vec![TokenCdfExtent { token: 'b', start: 0.5, end: 1.0 }]);
    }

    #[tokio::test]
    async fn closed_range_boundary_yields_both_adjacent_tokens() {
        let model = ab_model();
        let range = ProbeRange { start: 0.5, end: 0.5, min_prob: 0.0 };
        let extents: Vec<_> = model
            .query(&[], range, None)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(extents.len(), 2);
    }

    /// Property 1 (spec §8): for any two queries against the same prefix,
    /// each token they both yield has an identical `(start, end)`. Checked
    /// against several randomly generated distributions rather than one
    /// fixed example.
    #[tokio::test]
    async fn extents_are_deterministic_across_repeated_queries() {
        for _ in 0..20 {
            let dist = crate::random_distribution(5);
            let model = adapt_model(Fixed(dist));
            let full: Vec<_> = model.query(&[], ProbeRange::FULL, None).map(|r| r.unwrap()).collect().await;
            let narrow: Vec<_> = model
                .query(&[], ProbeRange { start: 0.2, end: 0.8, min_prob: 0.0 }, None)
                .map(|r| r.unwrap())
                .collect()
                .await;
            for extent in &narrow {
                let matching = full.iter().find(|e| e.token == extent.token).unwrap();
                assert_eq!(matching.start, extent.start);
                assert_eq!(matching.end, extent.end);
            }
        }
    }

    #[tokio::test]
    async fn min_prob_filters_low_probability_tokens() {
        let model = adapt_model(Fixed(vec![
            TokenProb { token: 'a', probability: 0.01 },
            TokenProb { token: 'b', probability: 0.99 },
        ]));
        let range = ProbeRange { start: 0.0, end: 1.0, min_prob: 0.5 };
        let extents: Vec<_> = model
            .query(&[], range, None)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(extents, vec![TokenCdfExtent { token: 'b', start: 0.01, end: 1.0 }]);
    }
}
