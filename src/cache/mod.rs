//! Generation-based trie cache memoising byte-keyed predictions (spec §4.C,
//! component C).
//!
//! The cache is an explicit object owned by the session and passed into
//! byte-level clients (spec §9 "global mutable cache" design note) — never a
//! process-wide singleton. In-flight computations are deduplicated by storing
//! a [`futures::future::Shared`] future in the cache cell, so concurrent
//! `get_or_set` calls for the same prefix share one underlying computation.

use crate::model::{ByteModel, Distribution, PredictionTree};
use crate::{Probability, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

/// A cache cell is either a resolved value or an in-flight, joinable
/// computation.
enum Slot<V> {
    Value(V),
    Pending(Shared<BoxFuture<'static, V>>),
}

impl<V: Clone> Clone for Slot<V> {
    fn clone(&self) -> Self {
        match self {
            Slot::Value(v) => Slot::Value(v.clone()),
            Slot::Pending(f) => Slot::Pending(f.clone()),
        }
    }
}

struct Node<V> {
    slot: Option<Slot<V>>,
    stamp: u64,
    children: HashMap<u8, Node<V>>,
}

impl<V> Node<V> {
    fn new(stamp: u64) -> Self {
        Node { slot: None, stamp, children: HashMap::new() }
    }
}

/// Maps finite byte sequences to values of type `V`, with FIFO-ish,
/// generation-stamped eviction.
pub struct TrieCache<V> {
    root: Node<V>,
    generation: u64,
    ticks_since_prune: u64,
    prune_interval: u64,
    max_age: u64,
}

impl<V: Clone + Send + Sync + 'static> TrieCache<V> {
    pub fn new() -> Self {
        Self::with_policy(crate::DEFAULT_PRUNE_INTERVAL, crate::DEFAULT_MAX_AGE)
    }

    pub fn with_policy(prune_interval: u64, max_age: u64) -> Self {
        TrieCache {
            root: Node::new(0),
            generation: 0,
            ticks_since_prune: 0,
            prune_interval,
            max_age,
        }
    }

    /// Only writes tick the generation counter; reads stamp but do not tick.
    fn tick(&mut self) {
        self.generation += 1;
        self.ticks_since_prune += 1;
        if self.ticks_since_prune >= self.prune_interval {
            self.ticks_since_prune = 0;
            self.prune();
        }
    }

    /// Read-only walk: follows existing children only, stamping each one
    /// visited with the current generation. Stops (returns `None`) the
    /// moment the prefix runs off the populated part of the trie.
    fn peek(&mut self, prefix: &[u8]) -> Option<Slot<V>> {
        let gen = self.generation;
        let mut node = &mut self.root;
        node.stamp = gen;
        for byte in prefix {
            node = node.children.get_mut(byte)?;
            node.stamp = gen;
        }
        node.slot.clone()
    }

    /// Write walk: creates missing nodes along the path, stamping every node
    /// (including newly created ones) with the current generation.
    fn touch_creating(&mut self, prefix: &[u8]) -> &mut Node<V> {
        let gen = self.generation;
        let mut node = &mut self.root;
        node.stamp = gen;
        for byte in prefix {
            node = node
                .children
                .entry(*byte)
                .or_insert_with(|| Node::new(gen));
            node.stamp = gen;
        }
        node
    }

    pub fn get(&mut self, prefix: &[u8]) -> Option<V> {
        match self.peek(prefix)? {
            Slot::Value(v) => Some(v),
            Slot::Pending(_) => None,
        }
    }

    pub fn set(&mut self, prefix: &[u8], value: V) {
        self.tick();
        self.touch_creating(prefix).slot = Some(Slot::Value(value));
    }

    pub fn delete(&mut self, prefix: &[u8]) {
        let mut node = &mut self.root;
        for byte in prefix {
            match node.children.get_mut(byte) {
                Some(next) => node = next,
                None => return,
            }
        }
        node.slot = None;
    }

    /// Returns the cached value if present; otherwise runs `compute`,
    /// publishing a shared in-flight future immediately so concurrent callers
    /// for the same prefix await the same computation instead of duplicating
    /// work.
    pub async fn get_or_set<F, Fut>(&mut self, prefix: &[u8], compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        if let Some(slot) = self.peek(prefix) {
            return match slot {
                Slot::Value(v) => v,
                Slot::Pending(shared) => shared.await,
            };
        }
        self.tick();
        let shared: Shared<BoxFuture<'static, V>> = compute().boxed().shared();
        self.touch_creating(prefix).slot = Some(Slot::Pending(shared.clone()));
        let value = shared.await;
        self.touch_creating(prefix).slot = Some(Slot::Value(value.clone()));
        value
    }

    /// Deepest valued node on `prefix`'s path, plus its depth, or `None` if
    /// no ancestor (including the empty prefix) has a cached value.
    pub fn find_longest_prefix(&mut self, prefix: &[u8]) -> Option<(V, usize)> {
        let gen = self.generation;
        let mut node = &mut self.root;
        node.stamp = gen;
        let mut best = match &node.slot {
            Some(Slot::Value(v)) => Some((v.clone(), 0)),
            _ => None,
        };
        for (depth, byte) in prefix.iter().enumerate() {
            node = match node.children.get_mut(byte) {
                Some(n) => n,
                None => break,
            };
            node.stamp = gen;
            if let Some(Slot::Value(v)) = &node.slot {
                best = Some((v.clone(), depth + 1));
            }
        }
        best
    }

    /// Sweeps the trie: any child whose stamp is older than
    /// `generation - max_age` is dropped in its entirety (both its value and
    /// every descendant); otherwise the sweep recurses into it. Because
    /// sub-tries share nodes with their descendants, this cleans up
    /// structural nodes once every valued descendant has aged out.
    pub fn prune(&mut self) {
        let threshold = self.generation.saturating_sub(self.max_age);
        Self::prune_node(&mut self.root, threshold);
    }

    fn prune_node(node: &mut Node<V>, threshold: u64) {
        node.children.retain(|_, child| child.stamp >= threshold);
        for child in node.children.values_mut() {
            Self::prune_node(child, threshold);
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<V: Clone + Send + Sync + 'static> Default for TrieCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Memoises a [`ByteModel`]'s `predict` calls in a [`TrieCache`], keyed by
/// byte prefix. Always requests the full (`min_prob = 0.0`) distribution
/// from the wrapped model regardless of the caller's `min_prob`: a full
/// distribution satisfies any future caller's threshold, so one cached entry
/// serves every subsequent query against that prefix, whatever `min_prob` it
/// asks for.
///
/// When the wrapped model's [`ByteModel::predict_tree`] returns pre-expanded
/// sub-trees (spec §6's "trie-pre-populated variant"), every sub-tree is
/// cached eagerly in one pass — a single backend round trip can populate the
/// whole subtree the backend chose to expand, not just the one prefix that
/// was asked for.
///
/// Guarded by a plain [`std::sync::Mutex`] rather than the generation trie's
/// own `get_or_set` dedup: the lock is held only across the synchronous
/// cache bookkeeping, never across the `await` of the backend call, so
/// concurrent misses on distinct prefixes never block each other. Spec §5
/// leaves the cache's concurrency contract unspecified beyond "task-local or
/// mutex-protected", and this crate has no multi-worker backend that would
/// make duplicate concurrent misses on the *same* prefix costly enough to
/// warrant the `Shared`-future dedup `TrieCache::get_or_set` already
/// demonstrates.
pub struct CachingByteModel<M> {
    inner: M,
    cache: Mutex<TrieCache<Distribution>>,
}

impl<M: ByteModel> CachingByteModel<M> {
    pub fn new(inner: M) -> Self {
        CachingByteModel { inner, cache: Mutex::new(TrieCache::new()) }
    }

    pub fn with_policy(inner: M, prune_interval: u64, max_age: u64) -> Self {
        CachingByteModel { inner, cache: Mutex::new(TrieCache::with_policy(prune_interval, max_age)) }
    }

    /// Walks a pre-populated prediction tree, caching every sub-tree the
    /// backend chose to expand, keyed by its full byte path from `prefix`.
    fn absorb(cache: &mut TrieCache<Distribution>, prefix: &[u8], tree: PredictionTree) {
        cache.set(prefix, tree.distribution);
        for (byte, child) in tree.children {
            let mut child_prefix = prefix.to_vec();
            child_prefix.push(byte);
            Self::absorb(cache, &child_prefix, child);
        }
    }
}

#[async_trait]
impl<M: ByteModel> ByteModel for CachingByteModel<M> {
    async fn predict(&self, prefix: &[u8], _min_prob: Probability) -> Result<Distribution> {
        if let Some(cached) = self.cache.lock().unwrap().get(prefix) {
            return Ok(cached);
        }
        let tree = self.inner.predict_tree(prefix, 0.0).await?;
        let dist = tree.distribution.clone();
        Self::absorb(&mut self.cache.lock().unwrap(), prefix, tree);
        Ok(dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut cache: TrieCache<i32> = TrieCache::new();
        cache.set(&[1, 2, 3], 42);
        assert_eq!(cache.get(&[1, 2, 3]), Some(42));
        assert_eq!(cache.get(&[1, 2]), None);
    }

    #[test]
    fn delete_clears_value_but_keeps_descendants() {
        let mut cache: TrieCache<i32> = TrieCache::new();
        cache.set(&[1], 1);
        cache.set(&[1, 2], 12);
        cache.delete(&[1]);
        assert_eq!(cache.get(&[1]), None);
        assert_eq!(cache.get(&[1, 2]), Some(12));
    }

    #[test]
    fn find_longest_prefix_returns_deepest_valued_ancestor() {
        let mut cache: TrieCache<&'static str> = TrieCache::new();
        cache.set(&[1], "one");
        cache.set(&[1, 2, 3], "one-two-three");
        let (value, depth) = cache.find_longest_prefix(&[1, 2, 3, 4]).unwrap();
        assert_eq!(value, "one-two-three");
        assert_eq!(depth, 3);
    }

    #[test]
    fn find_longest_prefix_is_none_when_nothing_cached() {
        let mut cache: TrieCache<i32> = TrieCache::new();
        assert_eq!(cache.find_longest_prefix(&[9, 9]), None);
    }

    #[tokio::test]
    async fn get_or_set_computes_once_and_caches() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cache: TrieCache<i32> = TrieCache::new();
        let c = calls.clone();
        let v1 = cache
            .get_or_set(&[7], || async move {
                c.fetch_add(1, Ordering::SeqCst);
                100
            })
            .await;
        assert_eq!(v1, 100);
        let c = calls.clone();
        let v2 = cache
            .get_or_set(&[7], || async move {
                c.fetch_add(1, Ordering::SeqCst);
                999
            })
            .await;
        assert_eq!(v2, 100);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Scenario S8 (spec §8): capacity 4, insert keys 1..4, read key 1,
    /// insert key 5 (triggers pruning — `prune_interval = 5` makes the 5th
    /// write the sweep point): key 2 or 3 is evicted; keys 1 and 5 survive
    /// because key 1 was refreshed by the read and key 5 was just written.
    #[test]
    fn s8_stale_entries_are_pruned_on_schedule() {
        let mut cache: TrieCache<i32> = TrieCache::with_policy(5, 2);
        cache.set(&[1], 1);
        cache.set(&[2], 2);
        cache.set(&[3], 3);
        cache.set(&[4], 4);
        // touch key 1 to keep it fresh ahead of the upcoming sweep
        let _ = cache.get(&[1]);
        cache.set(&[5], 5);
        assert_eq!(cache.get(&[1]), Some(1));
        assert_eq!(cache.get(&[5]), Some(5));
        assert!(cache.get(&[2]).is_none() || cache.get(&[3]).is_none());
    }

    struct CountingModel {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ByteModel for CountingModel {
        async fn predict(&self, prefix: &[u8], _min_prob: Probability) -> Result<Distribution> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut p = [0.0; 256];
            p[prefix.len().min(255)] = 1.0;
            Ok(Distribution::from_raw_unchecked(p))
        }
    }

    #[tokio::test]
    async fn caching_byte_model_memoises_repeated_prefix_queries() {
        use std::sync::atomic::Ordering;
        let model = CachingByteModel::new(CountingModel { calls: std::sync::atomic::AtomicUsize::new(0) });
        let first = model.predict(&[1, 2], 0.0).await.unwrap();
        let second = model.predict(&[1, 2], 0.9).await.unwrap();
        assert_eq!(first.get(2), 1.0);
        assert_eq!(second.get(2), 1.0);
        assert_eq!(model.inner.calls.load(Ordering::SeqCst), 1);
    }

    struct TreeModel;

    #[async_trait]
    impl ByteModel for TreeModel {
        async fn predict(&self, prefix: &[u8], min_prob: Probability) -> Result<Distribution> {
            Ok(self.predict_tree(prefix, min_prob).await?.distribution)
        }

        /// Pre-expands one level of `0x01` children alongside the root.
        async fn predict_tree(&self, prefix: &[u8], _min_prob: Probability) -> Result<PredictionTree> {
            let mut root = [0.0; 256];
            root[1] = 1.0;
            let mut child = [0.0; 256];
            child[2] = 1.0;
            let mut children = std::collections::HashMap::new();
            if prefix.is_empty() {
                children.insert(1u8, PredictionTree::leaf(Distribution::from_raw_unchecked(child)));
            }
            Ok(PredictionTree { distribution: Distribution::from_raw_unchecked(root), children })
        }
    }

    #[tokio::test]
    async fn caching_byte_model_absorbs_pre_populated_subtrees() {
        let model = CachingByteModel::new(TreeModel);
        let root = model.predict(&[], 0.0).await.unwrap();
        assert_eq!(root.get(1), 1.0);
        // The child at [0x01] was pre-populated by the same call and should
        // be served from cache without invoking the backend again.
        let cached_child = model.cache.lock().unwrap().get(&[1]);
        assert!(cached_child.is_some());
        assert_eq!(cached_child.unwrap().get(2), 1.0);
    }
}
