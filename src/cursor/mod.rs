//! Cursor normaliser (spec §4.I, component I).
//!
//! After a continuous `(dx, dy)` drag the cursor can land outside its
//! current prefix's unit square, or deep inside a child's; `normalise`
//! repeatedly ascends out of or descends into the tiling until `(x, y)`
//! lands in `[0, 1)²` with no child containing it, while preserving the
//! point the cursor maps to in the global unit square (spec §8 property 2).
//! Ascent/descent multiplications run in exact [`crate::rat::Rat`]
//! arithmetic; only the model queries that drive them (and the final
//! result) touch `f64`.

use crate::cdf::{CdfView, ProbeRange};
use crate::rat::Rat;
use crate::{Error, Probability, Result, Token};
use futures::StreamExt;

/// `(prefix, x, y)`. `x, y` are local to the square `prefix` occupies.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Cursor<T> {
    pub prefix: Vec<T>,
    pub x: Probability,
    pub y: Probability,
}

impl<T> Cursor<T> {
    pub fn new(prefix: Vec<T>, x: Probability, y: Probability) -> Self {
        Cursor { prefix, x, y }
    }
}

impl crate::Arbitrary for Cursor<char> {
    /// `x, y` drawn from `[0, 1)`: already in range, so normalisation only
    /// ever descends, never ascends or clamps. Clamping is a deliberate,
    /// lossy boundary operation (there is no square above the root to
    /// ascend into), so it is excluded here rather than fed into a
    /// position-preservation property that assumes a lossless transform.
    fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        Cursor { prefix: Vec::new(), x: rng.random_range(0.0..1.0), y: rng.random_range(0.0..1.0) }
    }
}

fn out_of_range(x: &Rat, y: &Rat, zero: &Rat, one: &Rat) -> bool {
    x.lt(zero) || x.gte(one) || y.lt(zero) || y.gte(one)
}

/// `normalise(model, cursor, {maxDepth?})` (spec §4.I).
pub async fn normalise<T: Token, V: CdfView<T>>(
    model: &V,
    cursor: Cursor<T>,
    max_depth: Option<usize>,
) -> Result<Cursor<T>> {
    let max_depth = max_depth.unwrap_or(crate::DEFAULT_MAX_DEPTH);
    let mut prefix = cursor.prefix;
    let mut x = Rat::from_float(cursor.x)?;
    let mut y = Rat::from_float(cursor.y)?;

    let zero = Rat::zero();
    let one = Rat::one();
    let eps = Rat::from_float(crate::POSITION_EPSILON)?;
    let clamp_bound = one.sub(&eps);

    let iteration_bound = prefix.len() + max_depth + 2;
    let mut converged = false;

    for _ in 0..iteration_bound {
        let mut ascended = false;
        let mut descended = false;

        if out_of_range(&x, &y, &zero, &one) {
            if let Some(popped) = prefix.pop() {
                let parent = prefix.clone();
                let mut lookup = model.specific(&parent, &popped);
                let extent = lookup
                    .next()
                    .await
                    .transpose()?
                    .ok_or_else(|| Error::ModelFailure {
                        detail: "ascended token missing from parent distribution".into(),
                    })?;
                let c = Rat::from_float(extent.start)?;
                let p = Rat::from_float(extent.end)?.sub(&c);
                x = one.sub(&p).add(&x.mul(&p));
                y = c.add(&y.mul(&p));
                ascended = true;
            } else {
                if x.lt(&zero) {
                    x = zero.clone();
                } else if x.gte(&one) {
                    x = clamp_bound.clone();
                }
                if y.lt(&zero) {
                    y = zero.clone();
                } else if y.gte(&one) {
                    y = clamp_bound.clone();
                }
            }
        }

        if prefix.len() < max_depth {
            let min_prob = 1.0 - x.to_float();
            let y_f = y.to_float();
            let range = ProbeRange { start: y_f, end: y_f, min_prob };
            let candidates: Vec<_> = model.query(&prefix, range, None).collect().await;
            let mut child = None;
            for result in candidates {
                let extent = result?;
                let c = Rat::from_float(extent.start)?;
                let p = Rat::from_float(extent.end)?.sub(&c);
                if p == zero {
                    continue;
                }
                let one_minus_p = one.sub(&p);
                if x.gte(&one_minus_p) && y.gte(&c) && y.lt(&c.add(&p)) {
                    child = Some((extent.token, c, p));
                    break;
                }
            }
            if let Some((token, c, p)) = child {
                let one_minus_p = one.sub(&p);
                x = x.sub(&one_minus_p).div(&p)?;
                y = y.sub(&c).div(&p)?;
                prefix.push(token);
                descended = true;
            }
        }

        if !ascended && !descended {
            converged = true;
            break;
        }
    }

    if !converged {
        log::warn!("cursor normalisation hit max depth without converging; returning best partial result");
    }

    Ok(Cursor { prefix, x: x.to_float(), y: y.to_float() })
}

/// `toGlobal(model, cursor)` (spec §3): folds the prefix's per-token
/// `(cumulative-before, conditional probability)` pairs into the point the
/// cursor maps to in the global unit square.
pub async fn to_global<T: Token, V: CdfView<T>>(model: &V, cursor: &Cursor<T>) -> Result<(Probability, Probability)> {
    let mut size: Probability = 1.0;
    let mut top: Probability = 0.0;
    for i in 0..cursor.prefix.len() {
        let parent = &cursor.prefix[..i];
        let token = &cursor.prefix[i];
        let mut lookup = model.specific(parent, token);
        let extent = lookup
            .next()
            .await
            .transpose()?
            .ok_or_else(|| Error::ModelFailure { detail: "prefix token missing from model".into() })?;
        let size_prev = size;
        size *= extent.end - extent.start;
        top += extent.start * size_prev;
    }
    Ok((1.0 - size + cursor.x * size, top + cursor.y * size))
}
