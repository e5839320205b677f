//! Prometheus observables for the automation worker (§4.5's queue-depth /
//! failure / latency metrics), gated behind the `metrics` feature the same
//! way the `spacebot` sibling example carries `prometheus` as an optional
//! dependency rather than a hard one.

#[cfg(feature = "metrics")]
mod enabled {
    use std::sync::OnceLock;

    use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

    pub struct AutomationMetrics {
        pub registry: Registry,
        pub jobs_total: IntCounterVec,
        pub queue_depth: IntGauge,
    }

    static METRICS: OnceLock<AutomationMetrics> = OnceLock::new();

    fn build() -> AutomationMetrics {
        let registry = Registry::new();

        let jobs_total = IntCounterVec::new(
            Opts::new("automation_jobs_total", "Automation jobs processed, by outcome"),
            &["outcome"],
        )
        .expect("valid metric opts");
        registry.register(Box::new(jobs_total.clone())).expect("register jobs_total");

        let queue_depth =
            IntGauge::new("automation_queue_depth", "Pending automation jobs at last poll")
                .expect("valid metric opts");
        registry.register(Box::new(queue_depth.clone())).expect("register queue_depth");

        AutomationMetrics { registry, jobs_total, queue_depth }
    }

    pub fn metrics() -> &'static AutomationMetrics {
        METRICS.get_or_init(build)
    }

    pub fn record_outcome(outcome: &str) {
        metrics().jobs_total.with_label_values(&[outcome]).inc();
    }

    pub fn set_queue_depth(depth: i64) {
        metrics().queue_depth.set(depth);
    }

    pub fn render() -> String {
        let encoder = TextEncoder::new();
        let families = metrics().registry.gather();
        let mut buf = Vec::new();
        if encoder.encode(&families, &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(feature = "metrics")]
pub use enabled::*;

#[cfg(not(feature = "metrics"))]
pub fn record_outcome(_outcome: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn set_queue_depth(_depth: i64) {}

#[cfg(not(feature = "metrics"))]
pub fn render() -> String {
    String::new()
}
