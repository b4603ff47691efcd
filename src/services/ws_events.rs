//! Fan-out helpers pushing server events onto client socket writers.

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::ws::ServerEvent,
    state::{SharedState, tournament::Ring},
};

/// Serialize an event and queue it on a socket writer channel.
///
/// Serialization failure is a bug in the payload type; it is logged and the
/// event is dropped. A closed writer means the reader side is tearing the
/// connection down, so the send result is ignored.
pub fn send_on(tx: &mpsc::UnboundedSender<Message>, event: &ServerEvent) {
    match serde_json::to_string(event) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => {
            warn!(error = %err, "failed to serialize server event");
        }
    }
}

/// Send an event to a user's live connection, if one exists.
pub fn send_to_user(state: &SharedState, user_id: Uuid, event: &ServerEvent) {
    let Some(connection) = state.connections().get(&user_id) else {
        return;
    };
    let tx = connection.tx.clone();
    drop(connection);
    send_on(&tx, event);
}

/// Send an event to the ring controller, if connected.
pub fn notify_controller(state: &SharedState, ring: &Ring, event: &ServerEvent) {
    if let Some(controller_id) = ring.controller_id {
        send_to_user(state, controller_id, event);
    }
}

/// Send an event to every judge seated in the ring.
pub fn notify_judges(state: &SharedState, ring: &Ring, event: &ServerEvent) {
    for judge_id in &ring.judge_ids {
        send_to_user(state, *judge_id, event);
    }
}

/// Send an event to every member of the ring, controller included.
pub fn notify_ring(state: &SharedState, ring: &Ring, event: &ServerEvent) {
    notify_controller(state, ring, event);
    notify_judges(state, ring, event);
}
