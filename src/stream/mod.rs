//! Async-stream primitives: race/merge over lazy sequences, and race of
//! futures (spec §4.B, component B).
//!
//! These are the fan-in primitives the byte→codepoint adapter ([`crate::codepoint`])
//! uses to interleave parallel continuation-byte sub-trees, and the
//! interpolator ([`crate::interpolate`]) uses to race its two underlying CDF
//! streams. Built on `futures::stream::FuturesUnordered`, which already gives
//! cancellation-on-drop for free: dropping the combined stream drops every
//! pending source future, releasing whatever resources they hold.
//!
//! Generic over a borrow lifetime `'a` rather than pinned to `'static`: the
//! codepoint adapter's sibling sub-trees borrow the adapter's own model
//! reference, so the combinators need to carry that lifetime through.

use futures::future::BoxFuture;
use futures::stream::{BoxStream, FuturesUnordered, StreamExt};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Wraps one source stream so the combinator can resume pulling it after
/// yielding a value, while remembering which source slot it came from.
struct IndexedStream<'a, T> {
    index: usize,
    stream: BoxStream<'a, T>,
}

type PullFuture<'a, T> = Pin<Box<dyn Future<Output = Option<(T, IndexedStream<'a, T>)>> + Send + 'a>>;

/// `raceAsyncIterables`: yields `(value, index)` whenever any source
/// produces. After a source drains, its slot is freed (it is simply not
/// polled again). Order across sources is non-deterministic; within one
/// source, order is preserved because each slot is always polled in place
/// before being re-queued.
pub struct Race<'a, T> {
    pending: FuturesUnordered<PullFuture<'a, T>>,
}

async fn pull<'a, T: Send + 'a>(mut s: IndexedStream<'a, T>) -> Option<(T, IndexedStream<'a, T>)> {
    let item = s.stream.next().await;
    item.map(|v| (v, s))
}

impl<'a, T: Send + 'a> Race<'a, T> {
    pub fn new(sources: Vec<BoxStream<'a, T>>) -> Self {
        let pending = FuturesUnordered::new();
        for (index, stream) in sources.into_iter().enumerate() {
            pending.push(Box::pin(pull(IndexedStream { index, stream })) as PullFuture<'a, T>);
        }
        Race { pending }
    }
}

impl<'a, T: Send + 'a> Stream for Race<'a, T> {
    type Item = (T, usize);

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            return match Pin::new(&mut self.pending).poll_next(cx) {
                Poll::Ready(Some(Some((value, rest)))) => {
                    let index = rest.index;
                    self.pending.push(Box::pin(pull(rest)) as PullFuture<'a, T>);
                    Poll::Ready(Some((value, index)))
                }
                Poll::Ready(Some(None)) => continue, // that source drained; try the rest
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            };
        }
    }
}

/// `raceAsyncIterables(sources)`.
pub fn race_async_iterables<'a, T: Send + 'a>(
    sources: Vec<BoxStream<'a, T>>,
) -> BoxStream<'a, (T, usize)> {
    Race::new(sources).boxed()
}

/// `mergeAsyncIterables(sources)` = `raceAsyncIterables` with the tag
/// stripped.
pub fn merge_async_iterables<'a, T: Send + 'a>(
    sources: Vec<BoxStream<'a, T>>,
) -> BoxStream<'a, T> {
    race_async_iterables(sources).map(|(v, _)| v).boxed()
}

/// `racePromises(futures)`: yields results in settlement order. Built
/// directly on `FuturesUnordered`, which polls every pending future and
/// returns whichever resolves first.
pub fn race_promises<'a, T: Send + 'a>(futures_: Vec<BoxFuture<'a, T>>) -> BoxStream<'a, T> {
    futures_.into_iter().collect::<FuturesUnordered<_>>().boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn race_preserves_per_source_order() {
        let a = stream::iter(vec![1, 2, 3]).boxed();
        let b = stream::iter(vec![10, 20]).boxed();
        let mut out = race_async_iterables(vec![a, b]);
        let mut from_a = Vec::new();
        let mut from_b = Vec::new();
        while let Some((v, idx)) = out.next().await {
            if idx == 0 {
                from_a.push(v)
            } else {
                from_b.push(v)
            }
        }
        assert_eq!(from_a, vec![1, 2, 3]);
        assert_eq!(from_b, vec![10, 20]);
    }

    #[tokio::test]
    async fn merge_strips_the_index() {
        let a = stream::iter(vec!["a1", "a2"]).boxed();
        let b = stream::iter(vec!["b1"]).boxed();
        let mut out = merge_async_iterables(vec![a, b]);
        let mut seen = Vec::new();
        while let Some(v) = out.next().await {
            seen.push(v);
        }
        seen.sort();
        assert_eq!(seen, vec!["a1", "a2", "b1"]);
    }

    #[tokio::test]
    async fn race_promises_yields_in_settlement_order() {
        use std::time::Duration;
        let fast = Box::pin(async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            "fast"
        }) as BoxFuture<'static, &'static str>;
        let slow = Box::pin(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            "slow"
        }) as BoxFuture<'static, &'static str>;
        let mut out = race_promises(vec![slow, fast]);
        assert_eq!(out.next().await, Some("fast"));
        assert_eq!(out.next().await, Some("slow"));
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels_pending_sources() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        let dropped = Arc::new(AtomicBool::new(false));
        struct MarkOnDrop(Arc<AtomicBool>);
        impl Drop for MarkOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let marker = MarkOnDrop(dropped.clone());
        let never = stream::once(async move {
            let _marker = marker;
            futures::future::pending::<()>().await;
            1
        })
        .boxed();
        let combined = race_async_iterables(vec![never]);
        drop(combined);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
