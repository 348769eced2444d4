//! Scene builder (spec §4.J, component J).
//!
//! Ascends from the cursor's prefix to a stable "scene root" — one level
//! above where the cursor's window first fits inside `[0, 1]`, so the node
//! that fully covers the viewport is always a rendered child rather than
//! the root itself — then lazily descends, producing a render tree whose
//! nodes arrive as the underlying model yields them. Unlike the cursor
//! normaliser, descent here stays in plain `f64` (spec §9 design note: only
//! ascent needs exact arithmetic for position preservation; the descent hot
//! path tolerates float rounding).

use crate::cdf::{CdfView, ProbeRange};
use crate::cursor::Cursor;
use crate::{Error, Probability, Result, Token};
use futures::stream::{BoxStream, StreamExt};

/// `SceneNode(token, y0, y1, children)`. `children` is a lazy, cancellable
/// sequence produced only as the consumer pulls it.
pub struct SceneNode<'a, T> {
    pub token: T,
    pub y0: Probability,
    pub y1: Probability,
    pub children: BoxStream<'a, Result<SceneNode<'a, T>>>,
}

/// `Scene(children, prefix_length)`: wraps the scene root's children plus
/// the depth (in prefix tokens) of the scene root itself.
pub struct Scene<'a, T> {
    pub children: BoxStream<'a, Result<SceneNode<'a, T>>>,
    pub prefix_length: usize,
}

async fn ascend_one<T: Token, V: CdfView<T>>(
    model: &V,
    prefix: &mut Vec<T>,
    win_top: &mut Probability,
    win_bot: &mut Probability,
) -> Result<()> {
    let popped = prefix.pop().expect("ascend_one requires a non-empty prefix");
    let mut lookup = model.specific(prefix, &popped);
    let extent = lookup
        .next()
        .await
        .transpose()?
        .ok_or_else(|| Error::ModelFailure {
            detail: "ascended token missing from parent distribution".into(),
        })?;
    let c = extent.start;
    let p = extent.end - extent.start;
    *win_top = c + *win_top * p;
    *win_bot = c + *win_bot * p;
    Ok(())
}

/// `buildScene(model, cursor, minHeight, {maxDepth?})` (spec §4.J).
pub async fn build_scene<'a, T: Token, V: CdfView<T>>(
    model: &'a V,
    cursor: &Cursor<T>,
    min_height: Probability,
    max_depth: Option<usize>,
) -> Result<Scene<'a, T>> {
    let max_depth = max_depth.unwrap_or(crate::DEFAULT_MAX_DEPTH);

    // Phase 1: window in the cursor-local frame.
    let half_height = 1.0 - cursor.x;
    let mut win_top = cursor.y - half_height;
    let mut win_bot = cursor.y + half_height;
    let mut prefix = cursor.prefix.clone();

    // Phase 2: ascend to the scene root.
    loop {
        let fits = win_top >= 0.0 && win_bot <= 1.0;
        if fits {
            if prefix.is_empty() {
                break;
            }
            ascend_one(model, &mut prefix, &mut win_top, &mut win_bot).await?;
            break;
        }
        if prefix.is_empty() {
            break;
        }
        ascend_one(model, &mut prefix, &mut win_top, &mut win_bot).await?;
    }

    // Phase 3: lazy descent.
    let span = win_bot - win_top;
    let scale = 1.0 / span;
    let offset = -win_top * scale;
    let min_abs_prob = min_height * span;
    let prefix_length = prefix.len();
    let children = build_children(model, prefix, scale, offset, 1.0, min_abs_prob, 0, max_depth);
    Ok(Scene { children, prefix_length })
}

/// Recursively builds one level of lazy scene children. Takes `prefix` by
/// value (rather than the `&'a [T]` a [`CdfView::query`] call ordinarily
/// borrows) so each recursion's freshly extended prefix can be moved into,
/// and live exactly as long as, the boxed stream it drives — the same
/// self-referential-stream pattern the byte→codepoint adapter uses for its
/// continuation-byte recursion.
fn build_children<'a, T: Token, V: CdfView<T>>(
    model: &'a V,
    prefix: Vec<T>,
    scale: Probability,
    offset: Probability,
    abs_prob: Probability,
    min_abs_prob: Probability,
    depth: usize,
    max_depth: usize,
) -> BoxStream<'a, Result<SceneNode<'a, T>>> {
    if depth >= max_depth {
        return futures::stream::empty().boxed();
    }
    let range_start = -offset / scale;
    let range_end = (1.0 - offset) / scale;
    let min_prob = if abs_prob > 0.0 { min_abs_prob / abs_prob } else { 0.0 };
    let range = ProbeRange { start: range_start, end: range_end, min_prob };

    Box::pin(async_stream::try_stream! {
        let mut stream = model.query(&prefix, range, None);
        while let Some(item) = stream.next().await {
            let extent = item?;
            let p = extent.end - extent.start;
            let y0 = offset + extent.start * scale;
            let y1 = offset + extent.end * scale;
            let mut child_prefix = prefix.clone();
            child_prefix.push(extent.token.clone());
            let children = build_children(
                model,
                child_prefix,
                scale * p,
                offset + extent.start * scale,
                abs_prob * p,
                min_abs_prob,
                depth + 1,
                max_depth,
            );
            yield SceneNode { token: extent.token, y0, y1, children };
        }
    })
}
