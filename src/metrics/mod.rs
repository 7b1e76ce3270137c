/*
 * Prometheus counters for built plans, rejections and curve cache use
 */

use crate::curve::CacheCounters;
use crate::models::{Result, SwaplineError};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    plans_built: IntCounterVec,
    rejections: IntCounterVec,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
}

fn registration(e: prometheus::Error) -> SwaplineError {
    SwaplineError::ConfigError(format!("Failed to register metric: {e}"))
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("swapline".to_string()), None).map_err(registration)?;

        let plans_built = IntCounterVec::new(Opts::new("plans_built_total", "Trade plans built, by route"), &["route"])
            .map_err(registration)?;
        let rejections = IntCounterVec::new(
            Opts::new("rejections_total", "Trade requests rejected, by error kind"),
            &["kind"],
        )
        .map_err(registration)?;
        let cache_hits =
            IntCounter::new("curve_cache_hits_total", "Curve quote cache hits").map_err(registration)?;
        let cache_misses =
            IntCounter::new("curve_cache_misses_total", "Curve quote cache misses").map_err(registration)?;

        registry.register(Box::new(plans_built.clone())).map_err(registration)?;
        registry.register(Box::new(rejections.clone())).map_err(registration)?;
        registry.register(Box::new(cache_hits.clone())).map_err(registration)?;
        registry.register(Box::new(cache_misses.clone())).map_err(registration)?;

        Ok(Self {
            registry,
            plans_built,
            rejections,
            cache_hits,
            cache_misses,
        })
    }

    pub fn record_plan(&self, route: &str) {
        self.plans_built.with_label_values(&[route]).inc();
    }

    pub fn record_rejection(&self, error: &SwaplineError) {
        self.rejections.with_label_values(&[error.kind()]).inc();
    }

    /// Handles for the curve cache to bump as it serves lookups.
    #[must_use]
    pub fn cache_counters(&self) -> CacheCounters {
        CacheCounters {
            hits: self.cache_hits.clone(),
            misses: self.cache_misses.clone(),
        }
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|e| SwaplineError::ConfigError(format!("Failed to encode metrics: {e}")))?;
        String::from_utf8(buf).map_err(|e| SwaplineError::ConfigError(format!("Metrics are not UTF-8: {e}")))
    }
}
