use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};

use crate::{TickConfig, TickPolicy};

/// What a room learns when its tick fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// The configured period.
    pub dt: Duration,
    /// Fired more than a tenth of a period after its deadline.
    pub overrun: bool,
    /// Whole periods dropped to get back on schedule.
    pub ticks_skipped: u64,
}

impl TickInfo {
    /// How far the room clock should move for this tick. Skipped periods
    /// still count, so game time keeps pace with wall time.
    pub fn elapsed(&self) -> Duration {
        let periods = 1 + u32::try_from(self.ticks_skipped).unwrap_or(u32::MAX - 1);
        self.dt.saturating_mul(periods)
    }
}

/// Timing counters for one scheduler.
///
/// Work times cover the span between a tick firing and
/// [`TickScheduler::record_tick_end`].
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Moving average of work time, weighted 0.1 toward the latest tick.
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Latest work time over the period. Above 1.0 the room fell behind.
    pub budget_utilization: f64,
}

/// Where one tick's work time landed against the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetLevel {
    Within,
    Warn,
    Critical,
}

impl BudgetLevel {
    pub fn classify(utilization: f64, config: &TickConfig) -> Self {
        if utilization >= config.budget_critical_threshold {
            Self::Critical
        } else if utilization >= config.budget_warn_threshold {
            Self::Warn
        } else {
            Self::Within
        }
    }
}

/// Next deadline chosen after a tick fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reschedule {
    next: TokioInstant,
    skipped: u64,
}

/// Drives one room's ticks at a fixed period.
#[derive(Debug)]
pub struct TickScheduler {
    config: TickConfig,
    period: Duration,
    ticks: u64,
    due: TokioInstant,
    /// Set when a tick fires, taken by `record_tick_end`.
    work_started: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// The first tick fires one period from now, delayed by a random
    /// amount up to `initial_jitter_us`.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let period = config.tick_duration();
        let jitter = match config.initial_jitter_us {
            0 => Duration::ZERO,
            max => Duration::from_micros(rand::rng().random_range(0..max)),
        };

        tracing::debug!(
            period_ms = config.tick_period_ms,
            jitter_us = jitter.as_micros() as u64,
            policy = ?config.policy,
            "tick scheduler created"
        );

        Self {
            due: TokioInstant::now() + period + jitter,
            config,
            period,
            ticks: 0,
            work_started: None,
            metrics: TickMetrics::default(),
        }
    }

    pub fn with_period_ms(tick_period_ms: u64) -> Self {
        Self::new(TickConfig::with_period_ms(tick_period_ms))
    }

    /// Sleeps until the next tick is due.
    ///
    /// Cancel-safe: if the future is dropped before it resolves the tick
    /// stays due, and the next call returns at once.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        time::sleep_until(self.due).await;

        let now = TokioInstant::now();
        let late_by = now.saturating_duration_since(self.due);
        let overrun = late_by > self.period / 10;
        self.ticks += 1;
        self.work_started = Some(Instant::now());

        let Reschedule { next, skipped } = self.reschedule(now, late_by, overrun);
        self.due = next;

        self.metrics.total_ticks += 1;
        self.metrics.total_skipped += skipped;
        if overrun {
            self.metrics.total_overruns += 1;
        }
        tracing::trace!(tick = self.ticks, overrun, "tick fired");

        TickInfo {
            tick: self.ticks,
            dt: self.period,
            overrun,
            ticks_skipped: skipped,
        }
    }

    fn reschedule(&self, now: TokioInstant, late_by: Duration, overrun: bool) -> Reschedule {
        let on_cadence = Reschedule {
            next: self.due + self.period,
            skipped: 0,
        };
        if !overrun {
            return on_cadence;
        }

        let behind = periods_in(late_by, self.period);
        let late_ms = late_by.as_secs_f64() * 1000.0;
        match self.config.policy {
            TickPolicy::Skip => {
                if behind > 0 {
                    tracing::warn!(tick = self.ticks, skipped = behind, late_ms, "room fell behind, skipping ahead");
                }
                Reschedule {
                    next: now + self.period,
                    skipped: behind,
                }
            }
            TickPolicy::CatchUp { max_catchup } => {
                let max_catchup = u64::from(max_catchup);
                if behind > 0 {
                    tracing::warn!(
                        tick = self.ticks,
                        behind,
                        catching_up = behind.min(max_catchup),
                        late_ms,
                        "room fell behind, catching up"
                    );
                }
                if behind <= max_catchup {
                    on_cadence
                } else {
                    Reschedule {
                        next: now + self.period,
                        skipped: behind - max_catchup,
                    }
                }
            }
            TickPolicy::Drop => {
                tracing::warn!(tick = self.ticks, late_ms, "tick late, keeping cadence");
                on_cadence
            }
        }
    }

    /// Marks the end of the current tick's work. Logs when the work ate
    /// into the budget and updates the metrics. Does nothing if no tick
    /// is in progress.
    pub fn record_tick_end(&mut self) {
        let Some(started) = self.work_started.take() else {
            return;
        };
        let worked = started.elapsed();
        let utilization = worked.as_secs_f64() / self.period.as_secs_f64();
        self.metrics.budget_utilization = utilization;

        let worked_ms = worked.as_secs_f64() * 1000.0;
        match BudgetLevel::classify(utilization, &self.config) {
            BudgetLevel::Within => {}
            BudgetLevel::Warn => tracing::warn!(
                tick = self.ticks,
                worked_ms,
                period_ms = self.config.tick_period_ms,
                "tick work near its budget"
            ),
            BudgetLevel::Critical => tracing::warn!(
                tick = self.ticks,
                worked_ms,
                period_ms = self.config.tick_period_ms,
                "tick work over budget"
            ),
        }

        if self.config.metrics_enabled {
            self.metrics.max_tick_time = self.metrics.max_tick_time.max(worked);
            let avg = self.metrics.avg_tick_time.as_secs_f64() * 0.9 + worked.as_secs_f64() * 0.1;
            self.metrics.avg_tick_time = Duration::from_secs_f64(avg);
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn tick_period_ms(&self) -> u64 {
        self.config.tick_period_ms
    }

    pub fn tick_duration(&self) -> Duration {
        self.period
    }
}

fn periods_in(late_by: Duration, period: Duration) -> u64 {
    u64::try_from(late_by.as_nanos() / period.as_nanos().max(1)).unwrap_or(u64::MAX)
}
