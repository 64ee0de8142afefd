//! Fixed-period tick scheduling for Tickwire rooms.
//!
//! Two pieces live here:
//!
//! - [`TickScheduler`]: decides *when* a room ticks. Configurable period,
//!   overrun policy, budget warnings, and first-tick jitter.
//! - [`GameClock`]: the room's authoritative game time, advanced by the
//!   scheduler's fixed `dt` and reset on demand.
//!
//! A room actor polls the scheduler next to its command channel and
//! moves its clock by [`TickInfo::elapsed`] on every tick:
//!
//! ```ignore
//! tokio::select! {
//!     Some(command) = commands.recv() => room.apply(command),
//!     info = scheduler.wait_for_tick() => {
//!         room.on_tick(info.elapsed(), Instant::now(), &mut outbox);
//!         scheduler.record_tick_end();
//!     }
//! }
//! ```

mod clock;
mod config;
mod scheduler;

pub use clock::GameClock;
pub use config::{TickConfig, TickPolicy};
pub use scheduler::{BudgetLevel, TickInfo, TickMetrics, TickScheduler};
