//! Model interpolator (spec §4.H, component H).
//!
//! Mixes two [`CdfView`]s with weights `wA + wB = 1` into a single view whose
//! per-conditional distribution is `wA·PA + wB·PB`. Both inputs must share
//! the same canonical token ordering (spec §4.H): whichever order each
//! yields tokens in, the stacking they imply on the combined CDF has to
//! agree, which holds automatically for [`crate::codepoint::ByteCodepointAdapter`]
//! and [`crate::cdf::AdaptedModel`] since both order by ascending byte/index.

use crate::cdf::{CdfView, ProbeRange, TokenCdfExtent};
use crate::{Error, Probability, Result, Token};
use futures::stream::StreamExt;
use futures::{future::BoxFuture, stream::BoxStream};
use std::collections::HashMap;
use std::marker::PhantomData;

pub struct Interpolator<T, A, B> {
    a: A,
    b: B,
    wa: Probability,
    wb: Probability,
    _marker: PhantomData<fn() -> T>,
}

impl<T, A, B> Interpolator<T, A, B> {
    pub fn new(a: A, b: B, wa: Probability, wb: Probability) -> Result<Self> {
        if wa < 0.0 || wb < 0.0 {
            return Err(Error::InvalidDistribution {
                detail: "interpolation weights must be non-negative".into(),
            });
        }
        if (wa + wb - 1.0).abs() > crate::DISTRIBUTION_SUM_TOLERANCE {
            return Err(Error::InvalidDistribution {
                detail: format!("interpolation weights {wa} + {wb} do not sum to 1"),
            });
        }
        Ok(Interpolator { a, b, wa, wb, _marker: PhantomData })
    }
}

pub fn interpolate<T: Token, A: CdfView<T>, B: CdfView<T>>(
    a: A,
    b: B,
    wa: Probability,
    wb: Probability,
) -> Result<Interpolator<T, A, B>> {
    Interpolator::new(a, b, wa, wb)
}

/// Combines a known extent with an optional extent from the other model.
/// When the token is absent from the other model (probability exactly 0),
/// its position is taken to coincide with the known extent rather than an
/// arbitrary fixed point, so the weighted sum reduces to the known extent
/// untouched instead of distorting it toward zero.
fn combine<T: Clone>(
    known: &TokenCdfExtent<T>,
    known_weight: Probability,
    other: Option<&TokenCdfExtent<T>>,
    other_weight: Probability,
    range: ProbeRange,
) -> Option<TokenCdfExtent<T>> {
    let (other_start, other_end) = match other {
        Some(o) => (o.start, o.end),
        None => (known.start, known.end),
    };
    let start = known_weight * known.start + other_weight * other_start;
    let end = known_weight * known.end + other_weight * other_end;
    if range.overlaps(start, end) && (end - start) >= range.min_prob {
        Some(TokenCdfExtent { token: known.token.clone(), start, end })
    } else {
        None
    }
}

impl<T: Token, A: CdfView<T>, B: CdfView<T>> Interpolator<T, A, B> {
    async fn compute_specific(&self, prefix: &[T], token: &T) -> Result<Option<TokenCdfExtent<T>>> {
        let mut a_stream = self.a.specific(prefix, token);
        let mut b_stream = self.b.specific(prefix, token);
        let (a_item, b_item) = futures::join!(a_stream.next(), b_stream.next());
        let a_extent = a_item.transpose()?;
        let b_extent = b_item.transpose()?;
        match (a_extent, b_extent) {
            (Some(ea), Some(eb)) => Ok(Some(TokenCdfExtent {
                token: token.clone(),
                start: self.wa * ea.start + self.wb * eb.start,
                end: self.wa * ea.end + self.wb * eb.end,
            })),
            _ => Ok(None),
        }
    }

    fn query_specific<'a>(&'a self, prefix: &'a [T], token: T) -> BoxStream<'a, Result<TokenCdfExtent<T>>> {
        Box::pin(async_stream::try_stream! {
            if let Some(extent) = self.compute_specific(prefix, &token).await? {
                yield extent;
            }
        })
    }

    fn query_general<'a>(&'a self, prefix: &'a [T], range: ProbeRange) -> BoxStream<'a, Result<TokenCdfExtent<T>>> {
        Box::pin(async_stream::try_stream! {
            let fetch_range = ProbeRange { start: 0.0, end: 1.0, min_prob: range.min_prob };
            let sources = vec![
                self.a.query(prefix, fetch_range, None),
                self.b.query(prefix, fetch_range, None),
            ];
            let mut merged = crate::stream::race_async_iterables(sources);
            let mut seen_a: HashMap<T, TokenCdfExtent<T>> = HashMap::new();
            let mut seen_b: HashMap<T, TokenCdfExtent<T>> = HashMap::new();
            while let Some((item, idx)) = merged.next().await {
                let extent = item?;
                if idx == 0 {
                    if let Some(eb) = seen_b.remove(&extent.token) {
                        if let Some(combined) = combine(&extent, self.wa, Some(&eb), self.wb, range) {
                            yield combined;
                        }
                    } else {
                        seen_a.insert(extent.token.clone(), extent);
                    }
                } else if let Some(ea) = seen_a.remove(&extent.token) {
                    if let Some(combined) = combine(&extent, self.wb, Some(&ea), self.wa, range) {
                        yield combined;
                    }
                } else {
                    seen_b.insert(extent.token.clone(), extent);
                }
            }

            let mut resolutions: Vec<BoxFuture<'a, Result<Option<TokenCdfExtent<T>>>>> = Vec::new();
            for (_, ea) in seen_a {
                resolutions.push(Box::pin(async move {
                    let mut lookup = self.b.specific(prefix, &ea.token);
                    let eb = lookup.next().await.transpose()?;
                    Ok(combine(&ea, self.wa, eb.as_ref(), self.wb, range))
                }));
            }
            for (_, eb) in seen_b {
                resolutions.push(Box::pin(async move {
                    let mut lookup = self.a.specific(prefix, &eb.token);
                    let ea = lookup.next().await.transpose()?;
                    Ok(combine(&eb, self.wb, ea.as_ref(), self.wa, range))
                }));
            }
            let mut resolved = crate::stream::race_promises(resolutions);
            while let Some(result) = resolved.next().await {
                if let Some(extent) = result? {
                    yield extent;
                }
            }
        })
    }
}

impl<T: Token, A: CdfView<T>, B: CdfView<T>> CdfView<T> for Interpolator<T, A, B> {
    fn query<'a>(
        &'a self,
        prefix: &'a [T],
        range: ProbeRange,
        specific: Option<&'a T>,
    ) -> BoxStream<'a, Result<TokenCdfExtent<T>>> {
        match specific {
            Some(token) => self.query_specific(prefix, token.clone()),
            None => self.query_general(prefix, range),
        }
    }
}
