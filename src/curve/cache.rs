/*
 * Short-lived memoization for the curve inversions
 */

use super::CurveState;
use crate::models::Result;
use ethers::types::U256;
use prometheus::IntCounter;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurveOp {
    CoinsForEth,
    CoinsToBurnForEth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    op: CurveOp,
    amount: U256,
    curve: CurveState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Exported counters bumped on every lookup.
#[derive(Debug, Clone)]
pub struct CacheCounters {
    pub hits: IntCounter,
    pub misses: IntCounter,
}

/// Size- and time-bounded map in front of the binary searches. Owned by the
/// caller and injected where needed; results never depend on it.
#[derive(Debug)]
pub struct CurveQuoteCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<CacheKey, (Instant, U256)>>,
    hits: AtomicU64,
    misses: AtomicU64,
    counters: Option<CacheCounters>,
}

impl CurveQuoteCache {
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            counters: None,
        }
    }

    #[must_use]
    pub fn with_counters(mut self, counters: CacheCounters) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn coins_for_eth(&self, eth_in: U256, curve: &CurveState) -> Result<U256> {
        self.get_or_compute(CurveOp::CoinsForEth, eth_in, curve, || super::coins_for_eth(eth_in, curve))
    }

    pub fn coins_to_burn_for_eth(&self, eth_out: U256, curve: &CurveState) -> Result<U256> {
        self.get_or_compute(CurveOp::CoinsToBurnForEth, eth_out, curve, || {
            super::coins_to_burn_for_eth(eth_out, curve)
        })
    }

    pub fn get_or_compute<F>(&self, op: CurveOp, amount: U256, curve: &CurveState, compute: F) -> Result<U256>
    where
        F: FnOnce() -> Result<U256>,
    {
        self.get_or_compute_at(Instant::now(), op, amount, curve, compute)
    }

    fn get_or_compute_at<F>(
        &self,
        now: Instant,
        op: CurveOp,
        amount: U256,
        curve: &CurveState,
        compute: F,
    ) -> Result<U256>
    where
        F: FnOnce() -> Result<U256>,
    {
        let key = CacheKey { op, amount, curve: *curve };

        if let Some(value) = self.lookup(&key, now) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            if let Some(counters) = &self.counters {
                counters.hits.inc();
            }
            return Ok(value);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        if let Some(counters) = &self.counters {
            counters.misses.inc();
        }

        // Errors are returned as-is and never cached.
        let value = compute()?;
        self.insert(key, value, now);
        Ok(value)
    }

    fn lookup(&self, key: &CacheKey, now: Instant) -> Option<U256> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some((stored_at, value)) if now.duration_since(*stored_at) < self.ttl => Some(*value),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert(&self, key: CacheKey, value: U256, now: Instant) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let ttl = self.ttl;
            entries.retain(|_, (stored_at, _)| now.duration_since(*stored_at) < ttl);
        }
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (stored_at, _))| *stored_at)
                .map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(key, (now, value));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
