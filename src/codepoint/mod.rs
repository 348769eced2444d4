//! Byte→codepoint adapter (spec §4.F, component F).
//!
//! Wraps a [`ByteModel`] into a [`CdfView<char>`], walking UTF-8 lazily:
//! ASCII lead bytes terminate immediately, multi-byte lead bytes spawn a
//! concurrent continuation-byte expansion per spec §4.F. Callers are
//! expected to wrap the underlying model in [`utf8::Utf8LegalityFilter`]
//! first so illegal continuations never carry probability mass; this
//! adapter does not itself re-validate legality, only consumes whatever the
//! model offers in ascending byte order.

pub mod utf8;

use crate::cdf::{CdfView, ProbeRange, TokenCdfExtent};
use crate::model::ByteModel;
use crate::{Error, Probability, Result};
use futures::future::try_join_all;
use futures::stream::{BoxStream, StreamExt};

/// Adapts a byte-level model into a codepoint-keyed CDF view.
pub struct ByteCodepointAdapter<M> {
    model: M,
}

impl<M> ByteCodepointAdapter<M> {
    pub fn new(model: M) -> Self {
        ByteCodepointAdapter { model }
    }
}

pub fn adapt_byte_model<M: ByteModel>(model: M) -> ByteCodepointAdapter<M> {
    ByteCodepointAdapter::new(model)
}

fn encode_prefix(prefix: &[char]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(prefix.len() * 2);
    let mut buf = [0u8; 4];
    for &c in prefix {
        bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }
    bytes
}

fn encode_char(c: char) -> Vec<u8> {
    let mut buf = [0u8; 4];
    c.encode_utf8(&mut buf).as_bytes().to_vec()
}

fn decode_codepoint(bytes: &[u8]) -> Result<char> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.chars().next())
        .ok_or_else(|| Error::IllegalUtf8 {
            byte: *bytes.last().unwrap_or(&0),
            boundary: "completed sequence did not decode".into(),
        })
}

/// Expected total sequence length for a lead byte, or `None` if `b` is not a
/// legal lead byte (ASCII is handled separately by the caller).
fn sequence_len(b: u8) -> Option<usize> {
    match b {
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}

impl<M: ByteModel + Send + Sync> ByteCodepointAdapter<M> {
    /// `specificToken` fast path (spec §4.F): fire all `L` prefix-length
    /// queries in parallel, then walk the results in order, accumulating the
    /// extent. Produces nothing if any byte along the way has zero
    /// probability.
    async fn compute_specific(&self, prefix: &[char], token: char) -> Result<Option<TokenCdfExtent<char>>> {
        let prefix_bytes = encode_prefix(prefix);
        let target_bytes = encode_char(token);
        let mut full_prefixes = Vec::with_capacity(target_bytes.len());
        for k in 0..target_bytes.len() {
            let mut p = prefix_bytes.clone();
            p.extend_from_slice(&target_bytes[..k]);
            full_prefixes.push(p);
        }
        let distributions = try_join_all(
            full_prefixes
                .iter()
                .map(|p| self.model.predict(p, 0.0)),
        )
        .await?;

        let mut start: Probability = 0.0;
        let mut size: Probability = 1.0;
        for (k, dist) in distributions.iter().enumerate() {
            let b = target_bytes[k];
            let p = dist.get(b);
            if p == 0.0 {
                return Ok(None);
            }
            let mut cum: Probability = 0.0;
            for byte in 0..b {
                cum += dist.get(byte);
            }
            start += cum * size;
            size *= p;
        }
        Ok(Some(TokenCdfExtent { token, start, end: start + size }))
    }

    fn query_specific<'a>(&'a self, prefix: &'a [char], token: char) -> BoxStream<'a, Result<TokenCdfExtent<char>>> {
        Box::pin(async_stream::try_stream! {
            if let Some(extent) = self.compute_specific(prefix, token).await? {
                yield extent;
            }
        })
    }

    /// The root-level call: classifies each non-zero first byte as an ASCII
    /// leaf or a multi-byte lead, pruning groups that cannot overlap `range`
    /// or fall below `range.min_prob` before ever issuing a continuation
    /// call (spec §8 property 8 / scenario S5).
    fn query_general<'a>(&'a self, prefix: &'a [char], range: ProbeRange) -> BoxStream<'a, Result<TokenCdfExtent<char>>> {
        let prefix_bytes = encode_prefix(prefix);
        Box::pin(async_stream::try_stream! {
            let dist = self.model.predict(&prefix_bytes, range.min_prob).await?;
            let mut cum: Probability = 0.0;
            let mut groups: Vec<BoxStream<'a, Result<TokenCdfExtent<char>>>> = Vec::new();
            for b in 0u16..256 {
                let b = b as u8;
                let p = dist.get(b);
                let local_start = cum;
                let local_end = cum + p;
                cum = local_end;
                if p == 0.0 {
                    continue;
                }
                let abs_start = local_start;
                let abs_end = local_end;
                let abs_prob = p;
                if b <= 0x7F {
                    if range.overlaps(abs_start, abs_end) && abs_prob >= range.min_prob {
                        yield TokenCdfExtent { token: b as char, start: abs_start, end: abs_end };
                    }
                    continue;
                }
                let Some(seq_len) = sequence_len(b) else { continue };
                if !(range.overlaps(abs_start, abs_end) && abs_prob >= range.min_prob) {
                    continue;
                }
                let mut partial = prefix_bytes.clone();
                partial.push(b);
                groups.push(self.expand_continuation(partial, seq_len - 1, abs_start, abs_prob, range));
            }
            if !groups.is_empty() {
                let mut merged = crate::stream::merge_async_iterables(groups);
                while let Some(item) = merged.next().await {
                    yield item?;
                }
            }
        })
    }

    /// Recurses one continuation byte at a time. At `remaining == 1` the
    /// next byte completes the sequence, so candidates are decoded and
    /// yielded directly instead of spawning another level.
    fn expand_continuation<'a>(
        &'a self,
        partial: Vec<u8>,
        remaining: usize,
        base: Probability,
        size: Probability,
        range: ProbeRange,
    ) -> BoxStream<'a, Result<TokenCdfExtent<char>>> {
        Box::pin(async_stream::try_stream! {
            let local_min_prob = if size > 0.0 { range.min_prob / size } else { 0.0 };
            let dist = self.model.predict(&partial, local_min_prob).await?;
            let mut cum: Probability = 0.0;
            if remaining == 1 {
                for b in 0u16..256 {
                    let b = b as u8;
                    let p = dist.get(b);
                    let local_start = cum;
                    let local_end = cum + p;
                    cum = local_end;
                    if p == 0.0 {
                        continue;
                    }
                    let abs_start = base + local_start * size;
                    let abs_end = base + local_end * size;
                    let abs_prob = p * size;
                    if !(range.overlaps(abs_start, abs_end) && abs_prob >= range.min_prob) {
                        continue;
                    }
                    let mut full = partial.clone();
                    full.push(b);
                    let token = decode_codepoint(&full)?;
                    yield TokenCdfExtent { token, start: abs_start, end: abs_end };
                }
            } else {
                let mut groups: Vec<BoxStream<'a, Result<TokenCdfExtent<char>>>> = Vec::new();
                for b in 0u16..256 {
                    let b = b as u8;
                    let p = dist.get(b);
                    let local_start = cum;
                    let local_end = cum + p;
                    cum = local_end;
                    if p == 0.0 {
                        continue;
                    }
                    let abs_start = base + local_start * size;
                    let abs_end = base + local_end * size;
                    let abs_prob = p * size;
                    if !(range.overlaps(abs_start, abs_end) && abs_prob >= range.min_prob) {
                        continue;
                    }
                    let mut full = partial.clone();
                    full.push(b);
                    groups.push(self.expand_continuation(full, remaining - 1, abs_start, abs_prob, range));
                }
                if !groups.is_empty() {
                    let mut merged = crate::stream::merge_async_iterables(groups);
                    while let Some(item) = merged.next().await {
                        yield item?;
                    }
                }
            }
        })
    }
}

impl<M: ByteModel + Send + Sync> CdfView<char> for ByteCodepointAdapter<M> {
    fn query<'a>(
        &'a self,
        prefix: &'a [char],
        range: ProbeRange,
        specific: Option<&'a char>,
    ) -> BoxStream<'a, Result<TokenCdfExtent<char>>> {
        match specific {
            Some(token) => self.query_specific(prefix, *token),
            None => self.query_general(prefix, range),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A byte model driven by a fixed `prefix -> 256-vector` table, counting
    /// how many distinct prefixes were queried (scenario S5).
    struct TableModel {
        table: HashMap<Vec<u8>, [Probability; 256]>,
        queried: Mutex<Vec<Vec<u8>>>,
        calls: AtomicUsize,
    }

    impl TableModel {
        fn new(entries: Vec<(Vec<u8>, Vec<(u8, Probability)>)>) -> Self {
            let mut table = HashMap::new();
            for (prefix, bytes) in entries {
                let mut arr = [0.0; 256];
                for (b, p) in bytes {
                    arr[b as usize] = p;
                }
                table.insert(prefix, arr);
            }
            TableModel { table, queried: Mutex::new(Vec::new()), calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl ByteModel for TableModel {
        async fn predict(&self, prefix: &[u8], _min_prob: Probability) -> Result<crate::model::Distribution> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queried.lock().unwrap().push(prefix.to_vec());
            let arr = self.table.get(prefix).copied().unwrap_or([0.0; 256]);
            Ok(crate::model::Distribution::from_raw_unchecked(arr))
        }
    }

    fn s4_model() -> TableModel {
        TableModel::new(vec![
            (vec![], vec![(0x61, 0.5), (0xC3, 0.5)]),
            (vec![0xC3], vec![(0xA8, 0.5), (0xA9, 0.5)]),
        ])
    }

    #[tokio::test]
    async fn s4_utf8_expansion_produces_expected_extents() {
        let adapter = adapt_byte_model(s4_model());
        let mut extents: Vec<_> = adapter
            .query(&[], ProbeRange::FULL, None)
            .map(|r| r.unwrap())
            .collect()
            .await;
        extents.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap());
        assert_eq!(extents.len(), 3);
        assert_eq!(extents[0].token, 'a');
        assert_eq!(extents[0].start, 0.0);
        assert_eq!(extents[0].end, 0.5);
        assert_eq!(extents[1].token, '\u{e8}');
        assert_eq!(extents[1].start, 0.5);
        assert_eq!(extents[1].end, 0.75);
        assert_eq!(extents[2].token, '\u{e9}');
        assert_eq!(extents[2].start, 0.75);
        assert_eq!(extents[2].end, 1.0);
    }

    #[tokio::test]
    async fn s5_call_minimisation_skips_unreachable_continuation() {
        let model = s4_model();
        let adapter = adapt_byte_model(model);
        let range = ProbeRange { start: 0.0, end: 0.49, min_prob: 0.0 };
        let extents: Vec<_> = adapter
            .query(&[], range, None)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(extents.len(), 1);
        assert_eq!(extents[0].token, 'a');
        assert_eq!(adapter.model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*adapter.model.queried.lock().unwrap(), vec![vec![]]);
    }

    #[tokio::test]
    async fn specific_token_matches_general_extent() {
        let adapter = adapt_byte_model(s4_model());
        let general: Vec<_> = adapter
            .query(&[], ProbeRange::FULL, None)
            .map(|r| r.unwrap())
            .collect()
            .await;
        let target = general.iter().find(|e| e.token == '\u{e9}').unwrap().clone();
        let specific: Vec<_> = adapter
            .specific(&[], &'\u{e9}')
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(specific.len(), 1);
        assert_eq!(specific[0].start, target.start);
        assert_eq!(specific[0].end, target.end);
    }

    #[tokio::test]
    async fn specific_token_absent_byte_yields_nothing() {
        let model = TableModel::new(vec![(vec![], vec![(0x61, 1.0)])]);
        let adapter = adapt_byte_model(model);
        let out: Vec<_> = adapter.specific(&[], &'b').collect().await;
        assert!(out.is_empty());
    }
}
