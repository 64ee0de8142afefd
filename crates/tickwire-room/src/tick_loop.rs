//! The room tick loop: defers gameplay, verifies hashes, and re-sends
//! everything with the room's authoritative time at each tick boundary.
//!
//! This is the synchronous core of a room. It owns every piece of mutable
//! room state and is driven from exactly one place (the room actor), so
//! appends and flushes never interleave.
//!
//! ## Tick boundary, in order
//!
//! 1. Advance the game clock.
//! 2. Verify full hash pairs, then evict stale unfilled ones.
//! 3. Relay each deferred envelope to every member as a `TimedRelay`
//!    stamped with the new game time, then release it.
//! 4. Broadcast `TimeAdvance` (if enabled) and `DesyncDetected` (if step 2
//!    found mismatches).
//! 5. Apply queued leaves, then queued joins.
//!
//! Membership only changes in step 5, so the set of users a tick relays
//! to is fixed for the whole boundary.

use std::time::{Duration, Instant};

use tickwire_protocol::{
    Codec, DesyncPayload, Envelope, JsonCodec, MessagePool, Pooled, RoomId, RoomInfo, StateHash,
    SystemMessage, TimePayload, UserId, UserPayload,
};
use tickwire_tick::GameClock;

use crate::divergence::{DivergenceDetector, HashSubmission};
use crate::{DeferredBuffer, Member, Outbound, RoomConfig, RoomError, RoomOutbox};

/// What a tick boundary did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub game_time: u64,
    /// Deferred envelopes flushed.
    pub relayed: usize,
    /// Relay copies that could not be built or queued.
    pub failed: usize,
    pub pairs_verified: usize,
    pub mismatches: usize,
    pub pairs_evicted: usize,
    pub joined: usize,
    pub left: usize,
}

/// What happened to a message handed to [`RoomTickLoop::on_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    /// Buffered for the next tick boundary.
    Deferred,
    /// Recorded as a state-hash submission.
    HashSubmitted,
    /// Dropped; the envelope was released.
    Dropped,
}

/// One room's clock, roster, deferred buffer, and hash pairs.
#[derive(Debug)]
pub struct RoomTickLoop {
    room_id: RoomId,
    host: Option<UserId>,
    config: RoomConfig,
    pool: MessagePool,
    clock: GameClock,
    /// Applied roster, in join order.
    members: Vec<Member>,
    pending_joins: Vec<Member>,
    pending_leaves: Vec<UserId>,
    deferred: DeferredBuffer,
    detector: DivergenceDetector,
}

impl RoomTickLoop {
    pub fn new(room_id: RoomId, host: Option<UserId>, config: RoomConfig, pool: MessagePool) -> Self {
        let deferred = DeferredBuffer::new(pool.max_content_size());
        Self {
            room_id,
            host,
            config,
            pool,
            clock: GameClock::new(),
            members: Vec::new(),
            pending_joins: Vec::new(),
            pending_leaves: Vec::new(),
            deferred,
            detector: DivergenceDetector::new(),
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn game_time(&self) -> u64 {
        self.clock.now_ms()
    }

    /// The applied roster, in join order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Deferred envelopes waiting for the next boundary.
    pub fn pending_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn detector(&self) -> &DivergenceDetector {
        &self.detector
    }

    fn is_member(&self, user: UserId) -> bool {
        self.members.iter().any(|m| m.user == user)
    }

    // -----------------------------------------------------------------------
    // Mid-tick input
    // -----------------------------------------------------------------------

    /// Accepts an envelope that arrived during the current tick.
    ///
    /// Only applied members are heard; a queued joiner's traffic is dropped
    /// until its join lands. State hashes go straight to the detector.
    /// Everything else is deferred until the next boundary.
    pub fn on_message(&mut self, from: UserId, envelope: Pooled, now: Instant) -> MessageDisposition {
        if !self.is_member(from) {
            tracing::debug!(room_id = %self.room_id, user_id = %from, "message from non-member, ignoring");
            return MessageDisposition::Dropped;
        }
        if envelope.message_type() != u32::from(SystemMessage::StateHash) {
            return match self.deferred.push(from, envelope) {
                Ok(()) => MessageDisposition::Deferred,
                Err(e) => {
                    tracing::warn!(room_id = %self.room_id, user_id = %from, error = %e, "gameplay message dropped");
                    MessageDisposition::Dropped
                }
            };
        }

        match StateHash::decode(envelope.content()) {
            Ok(hash) => {
                self.detector
                    .submit(HashSubmission::new(from, hash), self.members.len(), now);
                MessageDisposition::HashSubmitted
            }
            Err(e) => {
                tracing::warn!(room_id = %self.room_id, user_id = %from, error = %e, "malformed state hash");
                MessageDisposition::Dropped
            }
        }
    }

    /// Queues `member` to join at the next boundary.
    ///
    /// # Errors
    /// - [`RoomError::AlreadyInRoom`] if the user is a member or already
    ///   queued.
    /// - [`RoomError::RoomFull`] if the roster as it will stand after the
    ///   boundary is at the limit. Queued leaves free their seat first.
    pub fn queue_join(&mut self, member: Member) -> Result<(), RoomError> {
        if (self.is_member(member.user) && !self.pending_leaves.contains(&member.user))
            || self.pending_joins.iter().any(|m| m.user == member.user)
        {
            return Err(RoomError::AlreadyInRoom(member.user, self.room_id));
        }
        let staying = self.members.len().saturating_sub(self.pending_leaves.len());
        if staying + self.pending_joins.len() >= self.config.max_users {
            return Err(RoomError::RoomFull(self.room_id));
        }
        self.pending_joins.push(member);
        Ok(())
    }

    /// Queues `user` to leave at the next boundary. A queued join that has
    /// not been applied yet is simply cancelled.
    ///
    /// # Errors
    /// [`RoomError::NotInRoom`] if the user is neither a member nor queued.
    pub fn queue_leave(&mut self, user: UserId) -> Result<(), RoomError> {
        if let Some(pos) = self.pending_joins.iter().position(|m| m.user == user) {
            self.pending_joins.remove(pos);
            return Ok(());
        }
        if !self.is_member(user) {
            return Err(RoomError::NotInRoom(user));
        }
        if !self.pending_leaves.contains(&user) {
            self.pending_leaves.push(user);
        }
        Ok(())
    }

    /// Starts a new epoch: game time back to zero, buffered envelopes
    /// released unsent, pending hash pairs discarded.
    ///
    /// Returns how many envelopes were discarded.
    pub fn reset_time(&mut self) -> usize {
        let discarded = self.deferred.clear();
        self.detector.clear();
        self.clock.reset();
        tracing::info!(room_id = %self.room_id, discarded, "room time reset");
        discarded
    }

    // -----------------------------------------------------------------------
    // Tick boundary
    // -----------------------------------------------------------------------

    /// Runs one tick boundary. See the module docs for the order of steps.
    pub fn on_tick(&mut self, dt: Duration, now: Instant, outbox: &mut impl RoomOutbox) -> TickReport {
        let game_time = self.clock.advance(dt);
        let mut report = TickReport {
            game_time,
            ..TickReport::default()
        };

        let verify = self.detector.verify();
        report.pairs_verified = verify.verified;
        report.mismatches = verify.mismatches;
        report.pairs_evicted = self
            .detector
            .evict_stale(now, self.config.hash_pair_timeout());

        let deferred: Vec<_> = self.deferred.drain().collect();
        for item in deferred {
            report.relayed += 1;
            for member in &self.members {
                if let Err(e) = self.relay(game_time, &item.envelope, *member, outbox) {
                    report.failed += 1;
                    tracing::warn!(
                        room_id = %self.room_id,
                        from = %item.from,
                        to = %member.user,
                        error = %e,
                        "relay failed"
                    );
                }
            }
            // `item.envelope` is released here.
        }

        if self.config.broadcast_time_advance {
            let payload = TimePayload { game_time };
            self.broadcast(SystemMessage::TimeAdvance, bytemuck::bytes_of(&payload), None, outbox);
        }
        if verify.mismatches > 0 {
            let payload = DesyncPayload {
                error_count: u32::try_from(self.detector.error_count()).unwrap_or(u32::MAX),
                mismatches: u32::try_from(verify.mismatches).unwrap_or(u32::MAX),
            };
            self.broadcast(SystemMessage::DesyncDetected, bytemuck::bytes_of(&payload), None, outbox);
        }

        report.left = self.apply_leaves(outbox);
        report.joined = self.apply_joins(outbox);

        tracing::trace!(room_id = %self.room_id, ?report, "tick");
        report
    }

    fn relay(
        &self,
        game_time: u64,
        inner: &Envelope,
        member: Member,
        outbox: &mut impl RoomOutbox,
    ) -> Result<(), RoomError> {
        let mut copy = self.pool.checkout()?;
        copy.write_relay(game_time, inner)?;
        self.deliver(member, copy, outbox)
    }

    fn deliver(&self, member: Member, envelope: Pooled, outbox: &mut impl RoomOutbox) -> Result<(), RoomError> {
        let delivered = outbox.deliver(Outbound {
            to: member.addr,
            user: member.user,
            envelope,
        });
        if delivered {
            Ok(())
        } else {
            Err(RoomError::Unavailable(self.room_id))
        }
    }

    /// Builds a system envelope for one recipient.
    fn system_envelope(&self, message_type: SystemMessage, content: &[u8]) -> Result<Pooled, RoomError> {
        let mut env = self.pool.checkout()?;
        env.set_message_type(message_type);
        env.set_content(content)?;
        Ok(env)
    }

    /// Sends a system message to every member except `skip`.
    fn broadcast(
        &self,
        message_type: SystemMessage,
        content: &[u8],
        skip: Option<UserId>,
        outbox: &mut impl RoomOutbox,
    ) {
        for member in self.members.iter().filter(|m| Some(m.user) != skip) {
            let sent = self
                .system_envelope(message_type, content)
                .and_then(|env| self.deliver(*member, env, outbox));
            if let Err(e) = sent {
                tracing::warn!(
                    room_id = %self.room_id,
                    to = %member.user,
                    %message_type,
                    error = %e,
                    "system message not sent"
                );
            }
        }
    }

    fn apply_leaves(&mut self, outbox: &mut impl RoomOutbox) -> usize {
        let leaves = std::mem::take(&mut self.pending_leaves);
        for user in &leaves {
            self.members.retain(|m| m.user != *user);
            tracing::info!(room_id = %self.room_id, user_id = %user, users = self.members.len(), "user left room");
            let payload = UserPayload { user_id: user.0 };
            self.broadcast(SystemMessage::UserLeftRoom, bytemuck::bytes_of(&payload), None, outbox);
        }
        leaves.len()
    }

    fn apply_joins(&mut self, outbox: &mut impl RoomOutbox) -> usize {
        let joins = std::mem::take(&mut self.pending_joins);
        for member in &joins {
            self.members.push(*member);
            tracing::info!(room_id = %self.room_id, user_id = %member.user, users = self.members.len(), "user joined room");

            let payload = UserPayload {
                user_id: member.user.0,
            };
            self.broadcast(
                SystemMessage::UserJoinedRoom,
                bytemuck::bytes_of(&payload),
                Some(member.user),
                outbox,
            );
            if let Err(e) = self.send_info_as(SystemMessage::RoomJoined, *member, outbox) {
                tracing::warn!(room_id = %self.room_id, user_id = %member.user, error = %e, "join notice not sent");
            }
        }
        joins.len()
    }

    // -----------------------------------------------------------------------
    // Room info
    // -----------------------------------------------------------------------

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id,
            host: self.host,
            users: self.members.iter().map(|m| m.user).collect(),
            game_time: self.clock.now_ms(),
            tick_period_ms: self.config.tick_period_ms(),
            desync_errors: self.detector.error_count(),
        }
    }

    /// Sends [`RoomInfo`] as JSON to `to`.
    ///
    /// # Errors
    /// Pool exhaustion, an info too large for one envelope, or a closed
    /// outbox.
    pub fn send_info(&self, to: Member, outbox: &mut impl RoomOutbox) -> Result<(), RoomError> {
        self.send_info_as(SystemMessage::RoomInfo, to, outbox)
    }

    fn send_info_as(
        &self,
        message_type: SystemMessage,
        to: Member,
        outbox: &mut impl RoomOutbox,
    ) -> Result<(), RoomError> {
        let mut env = self.pool.checkout()?;
        env.set_message_type(message_type);
        JsonCodec.encode_into_envelope(&self.info(), &mut env)?;
        self.deliver(to, env, outbox)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;

    const DT: Duration = Duration::from_millis(50);

    fn member(id: u32) -> Member {
        Member {
            user: UserId(id),
            addr: SocketAddr::from(([127, 0, 0, 1], 4000 + id as u16)),
        }
    }

    fn room(pool: &MessagePool) -> RoomTickLoop {
        let config = RoomConfig {
            broadcast_time_advance: false,
            ..RoomConfig::default()
        };
        RoomTickLoop::new(RoomId(1), Some(UserId(1)), config, pool.clone())
    }

    fn with_members(pool: &MessagePool, ids: &[u32]) -> RoomTickLoop {
        let mut r = room(pool);
        for id in ids {
            r.queue_join(member(*id)).unwrap();
        }
        let mut sink = Vec::new();
        r.on_tick(Duration::ZERO, Instant::now(), &mut sink);
        r
    }

    fn gameplay(pool: &MessagePool, message_type: u32, content: &[u8]) -> Pooled {
        let mut env = pool.checkout().unwrap();
        env.set_message_type(message_type);
        env.set_content(content).unwrap();
        env
    }

    fn hash(pool: &MessagePool, value: u32) -> Pooled {
        gameplay(
            pool,
            SystemMessage::StateHash.into(),
            &StateHash::Raw(value).to_bytes(),
        )
    }

    fn of_type(out: &[Outbound], message_type: SystemMessage) -> Vec<&Outbound> {
        out.iter()
            .filter(|o| o.envelope.message_type() == u32::from(message_type))
            .collect()
    }

    #[test]
    fn test_joins_apply_only_at_tick_boundary() {
        let pool = MessagePool::new(32, 256);
        let mut r = room(&pool);
        r.queue_join(member(1)).unwrap();
        r.queue_join(member(2)).unwrap();
        assert!(r.members().is_empty());

        let mut out = Vec::new();
        let report = r.on_tick(DT, Instant::now(), &mut out);
        assert_eq!(report.joined, 2);
        assert_eq!(r.members(), &[member(1), member(2)]);

        // Each joiner gets RoomJoined; user 1 also hears about user 2.
        assert_eq!(of_type(&out, SystemMessage::RoomJoined).len(), 2);
        let joined = of_type(&out, SystemMessage::UserJoinedRoom);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].user, UserId(1));
        assert_eq!(joined[0].envelope.content(), &2u32.to_le_bytes());
    }

    #[test]
    fn test_gameplay_is_deferred_then_relayed_with_flush_time() {
        let pool = MessagePool::new(32, 256);
        let mut r = with_members(&pool, &[1, 2, 3]);

        let mut out = Vec::new();
        r.on_tick(DT, Instant::now(), &mut out);
        assert_eq!(r.game_time(), 50);

        assert_eq!(
            r.on_message(UserId(2), gameplay(&pool, 7, b"move"), Instant::now()),
            MessageDisposition::Deferred
        );
        assert_eq!(r.pending_len(), 1);

        out.clear();
        let report = r.on_tick(DT, Instant::now(), &mut out);
        assert_eq!(report.relayed, 1);
        assert_eq!(r.pending_len(), 0);

        let relays = of_type(&out, SystemMessage::TimedRelay);
        assert_eq!(relays.len(), 3);
        for relay in relays {
            let mut inner = Envelope::with_capacity(256);
            let stamped = relay.envelope.read_relay(&mut inner).unwrap();
            assert_eq!(stamped, 100);
            assert_eq!(inner.message_type(), 7);
            assert_eq!(inner.content(), b"move");
        }

        // Only the relay copies are still checked out.
        assert_eq!(pool.outstanding(), 3);
        drop(out);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_empty_room_ticks_without_output() {
        let pool = MessagePool::new(4, 64);
        let mut r = room(&pool);
        let mut out = Vec::new();
        let report = r.on_tick(DT, Instant::now(), &mut out);
        assert_eq!(report.game_time, 50);
        assert!(out.is_empty());
    }

    #[test]
    fn test_time_advance_is_broadcast_when_enabled() {
        let pool = MessagePool::new(16, 256);
        let mut r = RoomTickLoop::new(RoomId(1), None, RoomConfig::default(), pool.clone());
        r.queue_join(member(1)).unwrap();
        let mut out = Vec::new();
        r.on_tick(DT, Instant::now(), &mut out);
        out.clear();

        r.on_tick(DT, Instant::now(), &mut out);
        let advances = of_type(&out, SystemMessage::TimeAdvance);
        assert_eq!(advances.len(), 1);
        let payload: TimePayload = bytemuck::pod_read_unaligned(advances[0].envelope.content());
        assert_eq!(payload.game_time, 100);
    }

    #[test]
    fn test_hash_pairing_three_users() {
        let pool = MessagePool::new(32, 256);
        let mut r = with_members(&pool, &[1, 2, 3]);
        let now = Instant::now();

        for user in 1..=3 {
            assert_eq!(
                r.on_message(UserId(user), hash(&pool, 0xAA), now),
                MessageDisposition::HashSubmitted
            );
        }
        let mut out = Vec::new();
        let report = r.on_tick(DT, now, &mut out);
        assert_eq!(report.pairs_verified, 1);
        assert_eq!(report.mismatches, 0);
        assert_eq!(r.detector().error_count(), 0);
        assert!(of_type(&out, SystemMessage::DesyncDetected).is_empty());

        r.on_message(UserId(1), hash(&pool, 0xAA), now);
        r.on_message(UserId(2), hash(&pool, 0xBB), now);
        r.on_message(UserId(3), hash(&pool, 0xAA), now);
        out.clear();
        let report = r.on_tick(DT, now, &mut out);
        assert_eq!(report.mismatches, 1);
        assert_eq!(r.detector().error_count(), 1);
        assert_eq!(r.detector().pending_pairs().len(), 0);

        let notices = of_type(&out, SystemMessage::DesyncDetected);
        assert_eq!(notices.len(), 3);
        let payload: DesyncPayload = bytemuck::pod_read_unaligned(notices[0].envelope.content());
        assert_eq!(payload, DesyncPayload { error_count: 1, mismatches: 1 });
    }

    #[test]
    fn test_hash_from_non_member_is_ignored() {
        let pool = MessagePool::new(8, 64);
        let mut r = with_members(&pool, &[1]);
        assert_eq!(
            r.on_message(UserId(9), hash(&pool, 1), Instant::now()),
            MessageDisposition::Dropped
        );
        assert_eq!(r.detector().pending_pairs().len(), 0);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_malformed_hash_is_dropped() {
        let pool = MessagePool::new(8, 64);
        let mut r = with_members(&pool, &[1]);
        let env = gameplay(&pool, SystemMessage::StateHash.into(), &[7, 7]);
        assert_eq!(r.on_message(UserId(1), env, Instant::now()), MessageDisposition::Dropped);
    }

    #[test]
    fn test_stale_pair_is_evicted_without_error() {
        let pool = MessagePool::new(8, 64);
        let mut r = with_members(&pool, &[1, 2]);
        let start = Instant::now();
        r.on_message(UserId(1), hash(&pool, 5), start);

        let mut out = Vec::new();
        let late = start + r.config.hash_pair_timeout() + Duration::from_millis(1);
        let report = r.on_tick(DT, late, &mut out);
        assert_eq!(report.pairs_evicted, 1);
        assert_eq!(r.detector().error_count(), 0);
    }

    #[test]
    fn test_reset_time_discards_buffer_and_pairs() {
        let pool = MessagePool::new(16, 64);
        let mut r = with_members(&pool, &[1, 2]);
        let mut out = Vec::new();
        r.on_tick(DT, Instant::now(), &mut out);
        drop(out);

        r.on_message(UserId(1), gameplay(&pool, 3, b"x"), Instant::now());
        r.on_message(UserId(2), gameplay(&pool, 3, b"y"), Instant::now());
        r.on_message(UserId(1), hash(&pool, 1), Instant::now());

        assert_eq!(r.reset_time(), 2);
        assert_eq!(r.game_time(), 0);
        assert_eq!(r.pending_len(), 0);
        assert_eq!(r.detector().pending_pairs().len(), 0);
        assert_eq!(pool.outstanding(), 0);

        let mut out = Vec::new();
        let report = r.on_tick(DT, Instant::now(), &mut out);
        assert_eq!(report.relayed, 0);
        assert_eq!(report.game_time, 50);
    }

    #[test]
    fn test_leave_applies_at_boundary_and_notifies_others() {
        let pool = MessagePool::new(16, 256);
        let mut r = with_members(&pool, &[1, 2]);
        r.queue_leave(UserId(2)).unwrap();
        assert_eq!(r.members().len(), 2);

        r.on_message(UserId(1), gameplay(&pool, 4, b"z"), Instant::now());
        let mut out = Vec::new();
        let report = r.on_tick(DT, Instant::now(), &mut out);
        assert_eq!(report.left, 1);
        assert_eq!(r.members(), &[member(1)]);

        // The leaver still received this tick's relay.
        let relays = of_type(&out, SystemMessage::TimedRelay);
        assert!(relays.iter().any(|o| o.user == UserId(2)));
        let left = of_type(&out, SystemMessage::UserLeftRoom);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].user, UserId(1));
    }

    #[test]
    fn test_queue_join_limits() {
        let pool = MessagePool::new(4, 64);
        let config = RoomConfig {
            max_users: 1,
            ..RoomConfig::default()
        };
        let mut r = RoomTickLoop::new(RoomId(2), None, config, pool);
        r.queue_join(member(1)).unwrap();
        assert!(matches!(r.queue_join(member(1)), Err(RoomError::AlreadyInRoom(..))));
        assert!(matches!(r.queue_join(member(2)), Err(RoomError::RoomFull(_))));

        // Leaving before the join applies cancels it.
        r.queue_leave(UserId(1)).unwrap();
        r.queue_join(member(2)).unwrap();
        assert!(matches!(r.queue_leave(UserId(7)), Err(RoomError::NotInRoom(_))));
    }

    #[test]
    fn test_leave_frees_seat_for_join_in_same_tick() {
        let pool = MessagePool::new(16, 256);
        let config = RoomConfig {
            max_users: 2,
            broadcast_time_advance: false,
            ..RoomConfig::default()
        };
        let mut r = RoomTickLoop::new(RoomId(3), Some(UserId(1)), config, pool.clone());
        r.queue_join(member(1)).unwrap();
        r.queue_join(member(2)).unwrap();
        r.on_tick(DT, Instant::now(), &mut Vec::new());

        r.queue_leave(UserId(2)).unwrap();
        r.queue_join(member(3)).unwrap();
        assert!(matches!(r.queue_join(member(4)), Err(RoomError::RoomFull(_))));

        let mut out = Vec::new();
        let report = r.on_tick(DT, Instant::now(), &mut out);
        assert_eq!((report.left, report.joined), (1, 1));
        assert_eq!(r.members(), &[member(1), member(3)]);
        let joined = of_type(&out, SystemMessage::RoomJoined);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].user, UserId(3));
    }

    #[test]
    fn test_gameplay_from_non_member_is_dropped() {
        let pool = MessagePool::new(8, 256);
        let mut r = with_members(&pool, &[1]);
        r.queue_join(member(2)).unwrap();

        // Neither a stranger nor a joiner still waiting on the boundary is relayed.
        for user in [9, 2] {
            assert_eq!(
                r.on_message(UserId(user), gameplay(&pool, 7, b"move"), Instant::now()),
                MessageDisposition::Dropped
            );
        }
        assert_eq!(r.pending_len(), 0);
        assert_eq!(pool.outstanding(), 0);

        let mut out = Vec::new();
        let report = r.on_tick(DT, Instant::now(), &mut out);
        assert_eq!(report.relayed, 0);
        assert!(of_type(&out, SystemMessage::TimedRelay).is_empty());
    }

    #[test]
    fn test_relay_failures_do_not_abort_flush() {
        // Room for the two buffered envelopes plus a single relay copy.
        let pool = MessagePool::new(3, 64);
        let mut r = room(&pool);
        r.queue_join(member(1)).unwrap();
        r.queue_join(member(2)).unwrap();
        r.apply_joins(&mut Vec::new());

        r.on_message(UserId(1), gameplay(&pool, 1, b"a"), Instant::now());
        r.on_message(UserId(2), gameplay(&pool, 2, b"b"), Instant::now());

        let mut out = Vec::new();
        let report = r.on_tick(DT, Instant::now(), &mut out);
        assert_eq!(report.relayed, 2);
        assert!(report.failed > 0);
        assert!(!out.is_empty());
        assert_eq!(r.pending_len(), 0);
    }

    #[test]
    fn test_info_reflects_roster_and_errors() {
        let pool = MessagePool::new(8, 512);
        let r = with_members(&pool, &[1, 2]);
        let info = r.info();
        assert_eq!(info.room_id, RoomId(1));
        assert_eq!(info.host, Some(UserId(1)));
        assert_eq!(info.users, vec![UserId(1), UserId(2)]);
        assert_eq!(info.tick_period_ms, 50);

        let mut out = Vec::new();
        r.send_info(member(2), &mut out).unwrap();
        assert_eq!(out.len(), 1);
        let decoded: RoomInfo = JsonCodec.decode(out[0].envelope.content()).unwrap();
        assert_eq!(decoded, info);
    }
}
