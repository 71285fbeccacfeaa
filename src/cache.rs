//! Per-sentence memoization of inside and outside probabilities.
//!
//! One cache is created at the start of processing a sentence and dropped at
//! its end. Keys pack a `(symbol, begin, end)` triple into a `u64`:
//! `(symbol << 16) | (begin << 8) | end`, which is unique for sentences of
//! length <= 256 (the trainer enforces that bound).

use crate::signature::Symbol;
use rustc_hash::FxHashMap;

/// Maximum sentence length the packed cache key can address.
pub const MAX_SENTENCE_LEN: usize = 256;

/// Memo tables for one sentence's inside/outside values.
#[derive(Debug, Default)]
pub struct InsideOutsideCache {
    inside: FxHashMap<u64, f64>,
    outside: FxHashMap<u64, f64>,
}

#[inline]
fn key(symbol: Symbol, begin: usize, end: usize) -> u64 {
    debug_assert!(begin < MAX_SENTENCE_LEN && end < MAX_SENTENCE_LEN);
    ((symbol.as_u32() as u64) << 16) | ((begin as u64) << 8) | end as u64
}

impl InsideOutsideCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inside(&self, symbol: Symbol, begin: usize, end: usize) -> Option<f64> {
        self.inside.get(&key(symbol, begin, end)).copied()
    }

    pub fn store_inside(&mut self, symbol: Symbol, begin: usize, end: usize, prob: f64) {
        self.inside.insert(key(symbol, begin, end), prob);
    }

    pub fn outside(&self, symbol: Symbol, begin: usize, end: usize) -> Option<f64> {
        self.outside.get(&key(symbol, begin, end)).copied()
    }

    pub fn store_outside(&mut self, symbol: Symbol, begin: usize, end: usize, prob: f64) {
        self.outside.insert(key(symbol, begin, end), prob);
    }

    /// Number of memoized entries across both tables.
    pub fn len(&self) -> usize {
        self.inside.len() + self.outside.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inside.is_empty() && self.outside.is_empty()
    }

    pub fn clear(&mut self) {
        self.inside.clear();
        self.outside.clear();
    }
}
