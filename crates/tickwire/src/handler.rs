//! Built-in system message handlers.
//!
//! Everything here runs on the server task through the system
//! [`FunctionInvoker`]. Replies are queued on the outbound channel; room
//! membership changes reach the rooms through their handles and take
//! effect at each room's next tick boundary.

use std::net::SocketAddr;

use tickwire_protocol::{FunctionInvoker, RoomId, RoomPayload, SystemMessage, UserPayload};
use tickwire_room::RoomError;
use tickwire_session::{SessionError, User};

use crate::server::{ServerHandlers, ServerState, member_of};

/// The handlers for every system message a user may send.
///
/// `Handshake` is not among them: it arrives before there is a user, so
/// the server loop handles it directly. Room management is left out when
/// `manage_rooms` is off.
pub(crate) fn system_handlers(max_content_size: usize, manage_rooms: bool) -> ServerHandlers {
    let mut handlers = FunctionInvoker::with_max_content_size(max_content_size);

    // Any datagram refreshes the user; this one has nothing else to do.
    handlers.register(SystemMessage::Heartbeat, |_: &mut ServerState, _: &User| {});
    handlers.register(SystemMessage::Disconnect, disconnect);

    if manage_rooms {
        handlers.register(SystemMessage::HostRoom, host_room);
        handlers.register_with(SystemMessage::JoinRoom, join_room);
        handlers.register(SystemMessage::LeaveRoom, leave_room);
        handlers.register(SystemMessage::GetRoomInfo, room_info);
        handlers.register(SystemMessage::GetRooms, room_list);
        handlers.register(SystemMessage::ResetRoomTime, reset_room_time);
    }
    handlers
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Registers the endpoint as a user and tells it its id.
///
/// The transport has already answered with `HandshakeAck`.
pub(crate) fn handshake(state: &mut ServerState, from: SocketAddr) {
    match state.users.connect(from) {
        Ok(user) => {
            let member = member_of(user);
            let payload = UserPayload { user_id: user.id.0 };
            if let Err(e) = state.send_value(member, SystemMessage::Connected, &payload) {
                tracing::warn!(%from, error = %e, "connect reply not sent");
            }
        }
        Err(SessionError::AlreadyConnected(_)) => {
            if let Some(user) = state.users.get_by_addr(&from) {
                state.notify(member_of(user), SystemMessage::AlreadyConnected);
            }
        }
        Err(e) => tracing::warn!(%from, error = %e, "handshake refused"),
    }
}

fn disconnect(state: &mut ServerState, user: &User) {
    state.remove_user(user.id);
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

fn host_room(state: &mut ServerState, user: &User) {
    match state.rooms.host_room(member_of(user)) {
        Ok(joined) => {
            if let Some(departure) = &joined.departed {
                state.apply_departure(departure, user.id);
            }
            state.enter_room(user.id, joined.room_id);
        }
        Err(e) => tracing::warn!(user_id = %user.id, error = %e, "host room failed"),
    }
}

fn join_room(state: &mut ServerState, user: &User, payload: RoomPayload) {
    let room_id = RoomId(payload.room_id);
    match state.rooms.join_room(member_of(user), room_id) {
        Ok(joined) => {
            if let Some(departure) = &joined.departed {
                state.apply_departure(departure, user.id);
            }
            state.enter_room(user.id, joined.room_id);
        }
        Err(RoomError::AlreadyInRoom(..)) => {
            tracing::debug!(user_id = %user.id, %room_id, "already in room");
        }
        Err(e) => {
            tracing::info!(user_id = %user.id, %room_id, error = %e, "join refused");
            state.notify(member_of(user), SystemMessage::RoomNotFound);
        }
    }
}

fn leave_room(state: &mut ServerState, user: &User) {
    match state.rooms.leave_room(user.id) {
        Ok(departure) => state.apply_departure(&departure, user.id),
        Err(_) => state.notify(member_of(user), SystemMessage::NotInRoom),
    }
}

fn room_info(state: &mut ServerState, user: &User) {
    let member = member_of(user);
    match state.rooms.send_info(member) {
        Ok(()) => {}
        Err(RoomError::NotInRoom(_)) => state.notify(member, SystemMessage::NotInRoom),
        Err(e) => tracing::warn!(user_id = %user.id, error = %e, "room info request failed"),
    }
}

fn room_list(state: &mut ServerState, user: &User) {
    let rooms = state.rooms.list_rooms();
    if let Err(e) = state.send_json(member_of(user), SystemMessage::RoomList, &rooms) {
        tracing::warn!(user_id = %user.id, error = %e, "room list not sent");
    }
}

fn reset_room_time(state: &mut ServerState, user: &User) {
    match state.rooms.reset_time(user.id) {
        Ok(()) => {}
        Err(RoomError::NotInRoom(_)) => state.notify(member_of(user), SystemMessage::NotInRoom),
        Err(e) => tracing::warn!(user_id = %user.id, error = %e, "reset room time refused"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_handlers_follow_config() {
        let all = system_handlers(1024, true);
        assert!(all.contains(SystemMessage::JoinRoom.into()));
        assert_eq!(all.get_function_from_message_type(SystemMessage::JoinRoom.into()).unwrap().expected_size(), Some(4));
        assert_eq!(all.len(), 8);

        let fixed = system_handlers(1024, false);
        assert!(fixed.contains(SystemMessage::Disconnect.into()));
        assert!(!fixed.contains(SystemMessage::HostRoom.into()));
        assert_eq!(fixed.len(), 2);
    }
}
