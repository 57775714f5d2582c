//! Rolling candle cache for charting
//!
//! Holds the most recent `limit` bars in arrival order; the oldest bar is
//! evicted when a new one would exceed the limit.

use std::collections::VecDeque;

use crate::types::Candle;

#[derive(Debug, Clone, PartialEq)]
pub struct CandleHistory {
    bars: VecDeque<Candle>,
    limit: usize,
}

impl CandleHistory {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            bars: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Append a bar, evicting from the front when full
    pub fn push(&mut self, candle: Candle) {
        while self.bars.len() >= self.limit {
            self.bars.pop_front();
        }
        self.bars.push_back(candle);
    }

    pub fn clear(&mut self) {
        self.bars.clear();
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.bars.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.bars.iter()
    }

    pub fn to_vec(&self) -> Vec<Candle> {
        self.bars.iter().copied().collect()
    }
}
