//! Room actor: an isolated Tokio task that owns one [`RoomTickLoop`].
//!
//! The actor selects between its command channel and its tick scheduler.
//! Mid-tick input (gameplay, hashes, joins, leaves) arrives as commands and
//! is applied to the tick loop in arrival order; the scheduler drives the
//! tick boundary. Nothing else touches the room's state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tickwire_protocol::{MessagePool, Pooled, RoomId, UserId};
use tickwire_tick::TickScheduler;
use tokio::sync::mpsc;

use crate::{Member, Outbound, RoomConfig, RoomError, RoomTickLoop};

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    /// A message from a member, received mid-tick.
    Deliver { from: UserId, envelope: Pooled },
    /// Queue a join for the next tick boundary.
    Join(Member),
    /// Queue a leave for the next tick boundary.
    Leave(UserId),
    /// Send the current room info to `to`.
    SendInfo { to: Member },
    /// Start a new time epoch.
    ResetTime,
    Shutdown,
}

/// Counters the actor publishes after every tick, readable without a
/// round trip through the channel.
#[derive(Debug, Default)]
pub struct RoomStats {
    game_time: AtomicU64,
    ticks: AtomicU64,
    desync_errors: AtomicU64,
    relayed: AtomicU64,
}

impl RoomStats {
    fn record(&self, room: &RoomTickLoop, relayed: usize) {
        self.game_time.store(room.game_time(), Ordering::Relaxed);
        self.desync_errors
            .store(room.detector().error_count(), Ordering::Relaxed);
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.relayed.fetch_add(relayed as u64, Ordering::Relaxed);
    }
}

/// Handle to a running room actor.
///
/// Cheap to clone. Every method is a non-blocking send; the actor applies
/// the command before the next tick boundary.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::UnboundedSender<RoomCommand>,
    stats: Arc<RoomStats>,
}

impl std::fmt::Debug for RoomCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deliver { from, envelope } => f
                .debug_struct("Deliver")
                .field("from", from)
                .field("message_type", &envelope.message_type())
                .finish(),
            Self::Join(m) => f.debug_tuple("Join").field(m).finish(),
            Self::Leave(u) => f.debug_tuple("Leave").field(u).finish(),
            Self::SendInfo { to } => f.debug_struct("SendInfo").field("to", to).finish(),
            Self::ResetTime => f.write_str("ResetTime"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(cmd)
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    /// Hands a member's envelope to the room. Gameplay is deferred to the
    /// next tick boundary; state hashes go to the divergence detector.
    pub fn deliver(&self, from: UserId, envelope: Pooled) -> Result<(), RoomError> {
        self.send(RoomCommand::Deliver { from, envelope })
    }

    pub fn join(&self, member: Member) -> Result<(), RoomError> {
        self.send(RoomCommand::Join(member))
    }

    pub fn leave(&self, user: UserId) -> Result<(), RoomError> {
        self.send(RoomCommand::Leave(user))
    }

    /// Asks the room to send its [`RoomInfo`](tickwire_protocol::RoomInfo)
    /// to `to`.
    pub fn send_info(&self, to: Member) -> Result<(), RoomError> {
        self.send(RoomCommand::SendInfo { to })
    }

    pub fn reset_time(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::ResetTime)
    }

    /// Stops the actor. Buffered envelopes are released unsent.
    pub fn shutdown(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::Shutdown)
    }

    /// `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Game time as of the last tick boundary.
    pub fn game_time(&self) -> u64 {
        self.stats.game_time.load(Ordering::Relaxed)
    }

    /// Tick boundaries run so far.
    pub fn ticks(&self) -> u64 {
        self.stats.ticks.load(Ordering::Relaxed)
    }

    pub fn desync_errors(&self) -> u64 {
        self.stats.desync_errors.load(Ordering::Relaxed)
    }

    /// Deferred envelopes flushed so far.
    pub fn relayed(&self) -> u64 {
        self.stats.relayed.load(Ordering::Relaxed)
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    room: RoomTickLoop,
    scheduler: TickScheduler,
    receiver: mpsc::UnboundedReceiver<RoomCommand>,
    outbox: mpsc::UnboundedSender<Outbound>,
    stats: Arc<RoomStats>,
}

impl RoomActor {
    async fn run(mut self) {
        let room_id = self.room.room_id();
        tracing::info!(
            %room_id,
            tick_period_ms = self.scheduler.tick_period_ms(),
            "room actor started"
        );

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(RoomCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                info = self.scheduler.wait_for_tick() => {
                    let now = tokio::time::Instant::now().into_std();
                    let report = self.room.on_tick(info.elapsed(), now, &mut self.outbox);
                    self.stats.record(&self.room, report.relayed);
                    self.scheduler.record_tick_end();
                }
            }
        }

        let discarded = self.room.pending_len();
        tracing::info!(%room_id, discarded, ticks = self.scheduler.tick_count(), "room actor stopped");
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        let room_id = self.room.room_id();
        match cmd {
            RoomCommand::Deliver { from, envelope } => {
                let now = tokio::time::Instant::now().into_std();
                self.room.on_message(from, envelope, now);
            }
            RoomCommand::Join(member) => {
                if let Err(e) = self.room.queue_join(member) {
                    tracing::warn!(%room_id, user_id = %member.user, error = %e, "join refused");
                }
            }
            RoomCommand::Leave(user) => {
                if let Err(e) = self.room.queue_leave(user) {
                    tracing::debug!(%room_id, user_id = %user, error = %e, "leave ignored");
                }
            }
            RoomCommand::SendInfo { to } => {
                if let Err(e) = self.room.send_info(to, &mut self.outbox) {
                    tracing::warn!(%room_id, user_id = %to.user, error = %e, "room info not sent");
                }
            }
            RoomCommand::ResetTime => {
                self.room.reset_time();
                self.stats.game_time.store(0, Ordering::Relaxed);
            }
            RoomCommand::Shutdown => {}
        }
    }
}

/// Spawns a room actor task and returns a handle to it.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn spawn_room(
    room_id: RoomId,
    host: Option<UserId>,
    config: RoomConfig,
    pool: MessagePool,
    outbox: mpsc::UnboundedSender<Outbound>,
) -> RoomHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let stats = Arc::new(RoomStats::default());
    let scheduler = TickScheduler::new(config.tick.clone());

    let actor = RoomActor {
        room: RoomTickLoop::new(room_id, host, config, pool),
        scheduler,
        receiver: rx,
        outbox,
        stats: Arc::clone(&stats),
    };
    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        sender: tx,
        stats,
    }
}
