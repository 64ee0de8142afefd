use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// What to do when a tick fires late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPolicy {
    /// Skip the missed tick(s) and resume from now.
    /// Safest default: prevents death spirals.
    #[default]
    Skip,
    /// Run up to `max_catchup` extra ticks immediately.
    CatchUp {
        /// Hard cap on consecutive catch-up ticks.
        max_catchup: u32,
    },
    /// Ignore the overrun; the next tick fires at its original time.
    Drop,
}

/// Configuration for a room's tick scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Length of one tick in milliseconds. Default: 50 (20 Hz).
    pub tick_period_ms: u64,
    /// Overrun handling policy.
    pub policy: TickPolicy,
    /// Budget warning threshold (0.0–1.0). Default: 0.80.
    /// A warning is logged when tick work exceeds this fraction of the
    /// period.
    pub budget_warn_threshold: f64,
    /// Budget critical threshold (0.0–1.0). Default: 1.0.
    pub budget_critical_threshold: f64,
    /// Collect per-tick timing metrics.
    pub metrics_enabled: bool,
    /// Random jitter (0–max µs) added to the *first* tick so rooms created
    /// at the same instant do not tick in lock-step.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 50,
            policy: TickPolicy::default(),
            budget_warn_threshold: 0.80,
            budget_critical_threshold: 1.0,
            metrics_enabled: true,
            initial_jitter_us: 2_000,
        }
    }
}

impl TickConfig {
    /// Shortest supported tick period.
    pub const MIN_PERIOD_MS: u64 = 1;
    /// Longest supported tick period.
    pub const MAX_PERIOD_MS: u64 = 60_000;

    /// A config for the given period with default settings otherwise.
    pub fn with_period_ms(tick_period_ms: u64) -> Self {
        Self {
            tick_period_ms,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called by [`TickScheduler::new`](crate::TickScheduler::new).
    /// - `tick_period_ms` clamped to `MIN_PERIOD_MS..=MAX_PERIOD_MS`.
    /// - Thresholds clamped to `0.0..=1.0`, warn ≤ critical.
    pub fn validated(mut self) -> Self {
        let clamped = self
            .tick_period_ms
            .clamp(Self::MIN_PERIOD_MS, Self::MAX_PERIOD_MS);
        if clamped != self.tick_period_ms {
            warn!(
                period_ms = self.tick_period_ms,
                clamped_ms = clamped,
                "tick_period_ms out of range, clamping"
            );
            self.tick_period_ms = clamped;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self.budget_critical_threshold = self.budget_critical_threshold.clamp(0.0, 1.0);
        if self.budget_warn_threshold > self.budget_critical_threshold {
            self.budget_warn_threshold = self.budget_critical_threshold;
        }
        self
    }

    /// Duration of a single tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_twenty_hertz_skip() {
        let cfg = TickConfig::default();
        assert_eq!(cfg.tick_duration(), Duration::from_millis(50));
        assert_eq!(cfg.policy, TickPolicy::Skip);
    }

    #[test]
    fn test_validated_clamps_period() {
        assert_eq!(TickConfig::with_period_ms(0).validated().tick_period_ms, 1);
        assert_eq!(
            TickConfig::with_period_ms(u64::MAX).validated().tick_period_ms,
            TickConfig::MAX_PERIOD_MS
        );
    }

    #[test]
    fn test_validated_orders_thresholds() {
        let cfg = TickConfig {
            budget_warn_threshold: 2.0,
            budget_critical_threshold: 0.5,
            ..TickConfig::default()
        }
        .validated();
        assert_eq!(cfg.budget_critical_threshold, 0.5);
        assert_eq!(cfg.budget_warn_threshold, 0.5);
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let cfg: TickConfig =
            serde_json::from_str(r#"{"tick_period_ms": 33, "policy": {"catch_up": {"max_catchup": 2}}}"#)
                .unwrap();
        assert_eq!(cfg.tick_period_ms, 33);
        assert_eq!(cfg.policy, TickPolicy::CatchUp { max_catchup: 2 });
        assert!(cfg.metrics_enabled);
    }
}
