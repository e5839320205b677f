//! Exponential backoff with jitter, shared by every retry loop in the
//! workspace: webhook buffering, outbound delivery, ingestion, and
//! automation connectors.
//!
//! Jitter is derived from the system clock rather than a `rand` dependency,
//! the same idiom `skynet-channels::manager::jitter_secs` uses.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub factor: f64,
    pub jitter_fraction: f64,
    pub cap_ms: u64,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// Base 500ms, factor 2, jitter ±25%, cap 30s, max 6 attempts.
    pub const WEBHOOK_BUFFER: BackoffPolicy = BackoffPolicy {
        base_ms: 500,
        factor: 2.0,
        jitter_fraction: 0.25,
        cap_ms: 30_000,
        max_attempts: 6,
    };

    /// Delay before the `attempt`-th retry (1-indexed), including jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let unjittered = (self.base_ms as f64) * self.factor.powi(attempt.saturating_sub(1) as i32);
        let capped = unjittered.min(self.cap_ms as f64);
        let jitter_span = capped * self.jitter_fraction;
        let jitter = signed_jitter(jitter_span);
        let total = (capped + jitter).max(0.0) as u64;
        Duration::from_millis(total)
    }

    pub fn exhausted(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }
}

/// A jitter value in `[-span, span]` derived from the low bits of the system clock.
fn signed_jitter(span: f64) -> f64 {
    if span <= 0.0 {
        return 0.0;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    // Map the low bits onto [-1.0, 1.0], then scale by span.
    let unit = (nanos % 2000) as f64 / 1000.0 - 1.0;
    unit * span
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_caps() {
        let p = BackoffPolicy::WEBHOOK_BUFFER;
        let d1 = p.delay_for(1).as_millis() as f64;
        let d6 = p.delay_for(6).as_millis() as f64;
        assert!(d1 <= 700.0);
        assert!(d6 <= (p.cap_ms as f64) * (1.0 + p.jitter_fraction) + 1.0);
    }

    #[test]
    fn exhaustion_matches_max_attempts() {
        let p = BackoffPolicy::WEBHOOK_BUFFER;
        assert!(!p.exhausted(5));
        assert!(p.exhausted(6));
    }
}
