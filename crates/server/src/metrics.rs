//! # Request Metrics
//!
//! Prometheus counters and timings for `/analyze`, scraped from
//! `/api/v1/metrics`.

use std::time::Duration;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

/// Outcome label for a request that returned a report
pub const SUCCESS: &str = "success";

pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    duration: Histogram,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("arcsys".to_string()), None)?;

        let requests = IntCounterVec::new(
            Opts::new("analyze_requests_total", "Analyze requests by outcome"),
            &["outcome"],
        )?;
        let duration = Histogram::with_opts(
            HistogramOpts::new(
                "analyze_duration_seconds",
                "Wall time of analyze requests, including rejected ones",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            requests,
            duration,
        })
    }

    /// Count one request under `outcome` and record how long it took
    pub fn record(&self, outcome: &str, elapsed: Duration) {
        self.requests.with_label_values(&[outcome]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    pub fn count(&self, outcome: &str) -> u64 {
        self.requests.with_label_values(&[outcome]).get()
    }

    /// Text exposition format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Could not encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_else(|e| {
            tracing::error!("Metrics were not valid UTF-8: {}", e);
            String::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_counted_separately() {
        let metrics = Metrics::new().unwrap();
        metrics.record(SUCCESS, Duration::from_millis(1200));
        metrics.record(SUCCESS, Duration::from_millis(800));
        metrics.record("rate_limited", Duration::from_millis(1));

        assert_eq!(metrics.count(SUCCESS), 2);
        assert_eq!(metrics.count("rate_limited"), 1);
        assert_eq!(metrics.count("stage_timeout"), 0);
    }

    #[test]
    fn test_render_exposes_prefixed_series() {
        let metrics = Metrics::new().unwrap();
        metrics.record(SUCCESS, Duration::from_secs(2));

        let text = metrics.render();
        assert!(text.contains("arcsys_analyze_requests_total{outcome=\"success\"} 1"));
        assert!(text.contains("arcsys_analyze_duration_seconds_count 1"));
    }
}
