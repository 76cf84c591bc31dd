//! `RangeTokenMap` (§3 "RangeTokenMap shard", §4.E) — Component E.
//!
//! A concurrent map `RangeToken -> V` sharded by `key`. Each shard keeps the
//! exact entries plus two ordered indexes (by each canonical piece's left
//! and right endpoint) so a range query narrows to a small candidate set
//! before the exact `Interval::overlaps` check runs, instead of sweeping
//! every entry under the key (§4.E "a naive O(N) sweep per lock acquisition
//! is unacceptable under write load").

use std::collections::BTreeMap;
use std::sync::RwLock;

use dashmap::DashMap;

use crate::range::{ranges, Operator, RangeToken};
use crate::value::{Endpoint, Interval, Scalar};

struct Shard<V: Scalar, T> {
    exact: std::collections::HashMap<RangeToken<V>, T>,
    by_left: BTreeMap<Endpoint<V>, Vec<RangeToken<V>>>,
    by_right: BTreeMap<Endpoint<V>, Vec<RangeToken<V>>>,
}

impl<V: Scalar, T> Default for Shard<V, T> {
    fn default() -> Self {
        Self {
            exact: std::collections::HashMap::new(),
            by_left: BTreeMap::new(),
            by_right: BTreeMap::new(),
        }
    }
}

impl<V: Scalar, T> Shard<V, T> {
    fn index(&mut self, token: &RangeToken<V>) {
        for piece in ranges::expand(token.effective_operator(), token.values()) {
            self.by_left.entry(piece.lo).or_default().push(token.clone());
            self.by_right.entry(piece.hi).or_default().push(token.clone());
        }
    }

    fn deindex(&mut self, token: &RangeToken<V>) {
        for piece in ranges::expand(token.effective_operator(), token.values()) {
            if let Some(bucket) = self.by_left.get_mut(&piece.lo) {
                bucket.retain(|t| t != token);
                if bucket.is_empty() {
                    self.by_left.remove(&piece.lo);
                }
            }
            if let Some(bucket) = self.by_right.get_mut(&piece.hi) {
                bucket.retain(|t| t != token);
                if bucket.is_empty() {
                    self.by_right.remove(&piece.hi);
                }
            }
        }
    }

    /// Tokens whose stored canonical pieces could plausibly overlap
    /// `query` (a superset of the true answer), narrowed via the dual
    /// endpoint indexes.
    fn candidates(&self, query: &Interval<V>) -> Vec<RangeToken<V>> {
        let left_hits: std::collections::HashSet<_> = self
            .by_left
            .range(..=query.hi.clone())
            .flat_map(|(_, tokens)| tokens.iter())
            .map(RangeToken::to_bytes)
            .map(<[u8]>::to_vec)
            .collect();
        self.by_right
            .range(query.lo.clone()..)
            .flat_map(|(_, tokens)| tokens.iter())
            .filter(|t| left_hits.contains(t.to_bytes()))
            .cloned()
            .collect()
    }

    fn matching(&self, query_pieces: &[Interval<V>]) -> Vec<RangeToken<V>> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for query in query_pieces {
            for candidate in self.candidates(query) {
                let candidate_pieces = ranges::expand(candidate.effective_operator(), candidate.values());
                if ranges::any_overlap(&candidate_pieces, std::slice::from_ref(query))
                    && seen.insert(candidate.to_bytes().to_vec())
                {
                    out.push(candidate.clone());
                }
            }
        }
        out
    }
}

/// A concurrent map from [`RangeToken`] to an arbitrary value `T`, sharded
/// by the token's key (§4.E).
pub struct RangeTokenMap<V: Scalar, T> {
    shards: DashMap<Vec<u8>, RwLock<Shard<V, T>>>,
}

impl<V: Scalar, T: Clone> Default for RangeTokenMap<V, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Scalar, T: Clone> RangeTokenMap<V, T> {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self { shards: DashMap::new() }
    }

    /// Insert or replace the entry for `token`, returning the previous
    /// value if one existed.
    pub fn insert(&self, token: RangeToken<V>, value: T) -> Option<T> {
        let mut shard = self
            .shards
            .entry(token.key().to_vec())
            .or_default()
            .write()
            .expect("range token map shard lock poisoned");
        let previous = shard.exact.remove(&token);
        if previous.is_some() {
            shard.deindex(&token);
        }
        shard.index(&token);
        shard.exact.insert(token, value)
    }

    /// Return the value stored for `token`, inserting `make()`'s result
    /// first if absent. The whole check-then-insert runs under the shard's
    /// write lock, so concurrent callers racing to create the same exact
    /// token's entry always observe the same value (the same atomicity
    /// guarantee §4.D requires of `TokenLockService::get_or_create`,
    /// reused here for the per-exact-token lock instances in
    /// `RangeLockService`).
    pub fn get_or_insert_with(&self, token: RangeToken<V>, make: impl FnOnce() -> T) -> T {
        let mut shard = self
            .shards
            .entry(token.key().to_vec())
            .or_default()
            .write()
            .expect("range token map shard lock poisoned");
        if let Some(existing) = shard.exact.get(&token) {
            return existing.clone();
        }
        let value = make();
        shard.index(&token);
        shard.exact.insert(token, value.clone());
        value
    }

    /// The value stored for the exact token, if any.
    #[must_use]
    pub fn get(&self, token: &RangeToken<V>) -> Option<T> {
        let shard = self.shards.get(token.key())?;
        let shard = shard.read().expect("range token map shard lock poisoned");
        shard.exact.get(token).cloned()
    }

    /// Remove the exact entry for `token`.
    pub fn remove_exact(&self, token: &RangeToken<V>) -> Option<T> {
        let shard_ref = self.shards.get(token.key())?;
        let mut shard = shard_ref.write().expect("range token map shard lock poisoned");
        let removed = shard.exact.remove(token);
        if removed.is_some() {
            shard.deindex(token);
        }
        removed
    }

    /// A read-through snapshot of every entry sharing `key` (§4.E
    /// `filter(key)`).
    #[must_use]
    pub fn filter(&self, key: &[u8]) -> Vec<(RangeToken<V>, T)> {
        self.shards.get(key).map_or_else(Vec::new, |shard| {
            let shard = shard.read().expect("range token map shard lock poisoned");
            shard.exact.iter().map(|(t, v)| (t.clone(), v.clone())).collect()
        })
    }

    /// Whether any stored entry under `key` intersects `operator` applied
    /// to `values`, without materializing the filtered set (§4.E
    /// `contains`).
    #[must_use]
    pub fn contains(&self, key: &[u8], operator: Operator, values: &[Endpoint<V>]) -> bool {
        let Some(shard_ref) = self.shards.get(key) else {
            return false;
        };
        let shard = shard_ref.read().expect("range token map shard lock poisoned");
        let query_pieces = ranges::expand(operator, values);
        !shard.matching(&query_pieces).is_empty()
    }

    /// Entries under `key` whose stored token intersects `operator` applied
    /// to `values`.
    #[must_use]
    pub fn matching(&self, key: &[u8], operator: Operator, values: &[Endpoint<V>]) -> Vec<(RangeToken<V>, T)> {
        let Some(shard_ref) = self.shards.get(key) else {
            return Vec::new();
        };
        let shard = shard_ref.read().expect("range token map shard lock poisoned");
        let query_pieces = ranges::expand(operator, values);
        shard
            .matching(&query_pieces)
            .into_iter()
            .filter_map(|token| shard.exact.get(&token).cloned().map(|v| (token, v)))
            .collect()
    }

    /// Atomically remove every entry under `token`'s key whose stored
    /// range token intersects `token` and satisfies `predicate`, calling
    /// `cleanup` on each removed `(token, value)` pair (§4.E `remove`).
    pub fn remove_where(
        &self,
        token: &RangeToken<V>,
        mut predicate: impl FnMut(&RangeToken<V>, &T) -> bool,
        mut cleanup: impl FnMut(&RangeToken<V>, &T),
    ) {
        let Some(shard_ref) = self.shards.get(token.key()) else {
            return;
        };
        let mut shard = shard_ref.write().expect("range token map shard lock poisoned");
        let query_pieces = ranges::expand(token.effective_operator(), token.values());
        let candidates = shard.matching(&query_pieces);
        for candidate in candidates {
            let keep = shard.exact.get(&candidate).is_some_and(|v| !predicate(&candidate, v));
            if keep {
                continue;
            }
            if let Some(value) = shard.exact.remove(&candidate) {
                cleanup(&candidate, &value);
                shard.deindex(&candidate);
            }
        }
    }

    /// Total entries across every shard, for tests and diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().expect("range token map shard lock poisoned").exact.len())
            .sum()
    }

    /// Whether the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trip() {
        let map: RangeTokenMap<i64, &'static str> = RangeTokenMap::new();
        let token = RangeToken::for_write("age", 7i64);
        map.insert(token.clone(), "writer-a");
        assert_eq!(map.get(&token), Some("writer-a"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn contains_finds_overlapping_between_range() {
        let map: RangeTokenMap<i64, ()> = RangeTokenMap::new();
        let between = RangeToken::for_read("age", Operator::Between, vec![3, 8]).unwrap();
        map.insert(between, ());
        assert!(map.contains("age", Operator::Equals, &[Endpoint::Value(5)]));
        assert!(!map.contains("age", Operator::Equals, &[Endpoint::Value(8)]));
    }

    #[test]
    fn different_keys_do_not_interfere() {
        let map: RangeTokenMap<i64, ()> = RangeTokenMap::new();
        map.insert(RangeToken::for_write("age", 5), ());
        assert!(!map.contains("height", Operator::Equals, &[Endpoint::Value(5)]));
    }

    #[test]
    fn remove_where_evicts_overlapping_entries_and_runs_cleanup() {
        let map: RangeTokenMap<i64, ()> = RangeTokenMap::new();
        let token = RangeToken::for_write("age", 5);
        map.insert(token.clone(), ());
        let mut cleaned = 0;
        map.remove_where(&token, |_, ()| true, |_, ()| cleaned += 1);
        assert_eq!(cleaned, 1);
        assert!(map.is_empty());
    }
}
