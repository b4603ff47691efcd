//! Connection and identity lifecycle: identification handshake, session
//! restoration after reconnect, conflict detection and exit handling.

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        projection,
        validation::validate_judge_name,
        ws::{IdentificationPayload, RoleClaim, ServerEvent},
    },
    error::ServiceError,
    services::{ring_service, ws_events},
    state::{
        ClientConnection, SharedState,
        tournament::{Controller, Judge, Role, Tournament, User},
    },
};

/// How an incoming connection's claimed identity was resolved.
#[derive(Debug)]
pub enum Resolution {
    /// No usable identity; run the identification handshake.
    AwaitIdentification,
    /// Known identity with no live connection; session restored silently.
    Restored {
        /// Identity now backing the connection.
        user_id: Uuid,
    },
    /// Identity already backed by a live connection; reject the newcomer.
    Conflict,
}

fn claimed_role(claim: RoleClaim) -> Role {
    match claim {
        RoleClaim::Controller => Role::Controller,
        RoleClaim::Judge => Role::Judge,
    }
}

fn role_claim(role: Role) -> RoleClaim {
    match role {
        Role::Controller => RoleClaim::Controller,
        Role::Judge => RoleClaim::Judge,
    }
}

/// Resolve a connection's claimed identity.
///
/// A claimed id whose user already has a live connection is a conflict and
/// the existing connection stays untouched. A known id with a matching role
/// restores the session in place: the connection is registered, the current
/// state is replayed and ring peers learn the member is back. A claimed id
/// with a mismatched role discards the old identity and falls through to the
/// handshake.
pub async fn resolve(
    state: &SharedState,
    claim: RoleClaim,
    claimed_id: Option<Uuid>,
    tx: &mpsc::UnboundedSender<Message>,
) -> Resolution {
    let _gate = state.command_gate().lock().await;

    let Some(id) = claimed_id else {
        return Resolution::AwaitIdentification;
    };

    if state.connections().contains_key(&id) {
        warn!(user_id = %id, "second connection for a live session rejected");
        return Resolution::Conflict;
    }

    let mut tournament = state.tournament().write().await;
    let known_role = tournament.user(id).map(|user| user.role());
    match known_role {
        Some(role) if role == claimed_role(claim) => {
            if let Some(user) = tournament.user_mut(id) {
                user.set_connected(true);
            }
            state.connections().insert(
                id,
                ClientConnection {
                    user_id: id,
                    tx: tx.clone(),
                },
            );
            info!(user_id = %id, role = ?claim, "session restored");
            replay(&tournament, id, tx);
            notify_presence(state, &tournament, id, true);
            Resolution::Restored { user_id: id }
        }
        Some(_) => {
            // Same physical device coming back under a different role; the
            // old identity is abandoned.
            info!(user_id = %id, role = ?claim, "role switch discards previous identity");
            ring_service::evict_user(state, &mut tournament, id).await;
            Resolution::AwaitIdentification
        }
        None => Resolution::AwaitIdentification,
    }
}

/// Run one identification attempt for a connection in the handshake phase.
///
/// Controllers present the shared secret, judges a display name. The user is
/// persisted before it becomes visible in the arena, so a storage failure
/// leaves no trace and the caller simply re-prompts.
pub async fn identify(
    state: &SharedState,
    payload: &IdentificationPayload,
    tx: &mpsc::UnboundedSender<Message>,
) -> Result<Uuid, ServiceError> {
    let _gate = state.command_gate().lock().await;

    let user = match payload.identity {
        RoleClaim::Controller => {
            // Constant response regardless of how close the guess was.
            if payload.value != state.config().controller_secret() {
                return Err(ServiceError::Unauthorized(
                    "invalid controller credential".into(),
                ));
            }
            User::Controller(Controller {
                id: Uuid::new_v4(),
                connected: true,
            })
        }
        RoleClaim::Judge => {
            validate_judge_name(&payload.value)
                .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
            User::Judge(Judge {
                id: Uuid::new_v4(),
                connected: true,
                name: payload.value.trim().to_owned(),
                authorised: false,
                undo_stack: Vec::new(),
            })
        }
    };

    let store = state.require_store().await?;
    let mut tournament = state.tournament().write().await;
    store.save_user(user.to_entity(tournament.id)).await?;

    let user_id = user.id();
    tournament.users.insert(user_id, user);
    state.connections().insert(
        user_id,
        ClientConnection {
            user_id,
            tx: tx.clone(),
        },
    );

    info!(user_id = %user_id, role = ?payload.identity, "user identified");
    ws_events::send_on(
        tx,
        &ServerEvent::Identified {
            id: user_id,
            role: payload.identity,
        },
    );
    ws_events::send_on(
        tx,
        &ServerEvent::RingStates {
            rings: projection::ring_states(&tournament),
        },
    );
    Ok(user_id)
}

/// Replay the state a freshly restored connection needs to resume its role.
fn replay(tournament: &Tournament, user_id: Uuid, tx: &mpsc::UnboundedSender<Message>) {
    let Some(user) = tournament.user(user_id) else {
        return;
    };

    ws_events::send_on(
        tx,
        &ServerEvent::Identified {
            id: user_id,
            role: role_claim(user.role()),
        },
    );
    ws_events::send_on(
        tx,
        &ServerEvent::RingStates {
            rings: projection::ring_states(tournament),
        },
    );

    let Some(ring) = tournament.ring_of(user_id).and_then(|i| tournament.ring(i)) else {
        return;
    };

    match user {
        User::Controller(_) => ws_events::send_on(
            tx,
            &ServerEvent::RingOpened {
                ring: projection::controller_ring_view(tournament, ring),
            },
        ),
        User::Judge(judge) if judge.authorised => ws_events::send_on(
            tx,
            &ServerEvent::RingJoined {
                ring: projection::judge_ring_view(ring, user_id, true),
            },
        ),
        User::Judge(_) => ws_events::send_on(tx, &ServerEvent::AuthorisationPending),
    }
}

/// Tell a user's ring peers that its connection state flipped.
pub fn notify_presence(
    state: &SharedState,
    tournament: &Tournament,
    user_id: Uuid,
    connected: bool,
) {
    let Some(ring) = tournament.ring_of(user_id).and_then(|i| tournament.ring(i)) else {
        return;
    };
    let Some(user) = tournament.user(user_id) else {
        return;
    };

    match user.role() {
        Role::Controller => ws_events::notify_judges(
            state,
            ring,
            &ServerEvent::JpConnectionStateChanged { connected },
        ),
        Role::Judge => ws_events::notify_controller(
            state,
            ring,
            &ServerEvent::CjConnectionStateChanged {
                id: user_id,
                connected,
            },
        ),
    }
}

/// Handle a connection going away.
///
/// A plain disconnect keeps the identity alive for reconnection and only
/// flips the presence flag. An explicit exit discards the identity: a
/// controller's ring is closed, a judge is unseated and forgotten.
pub async fn disconnected(state: &SharedState, user_id: Uuid, exit: bool) {
    let _gate = state.command_gate().lock().await;
    state.connections().remove(&user_id);

    let mut tournament = state.tournament().write().await;
    if tournament.user(user_id).is_none() {
        return;
    }

    if exit {
        info!(user_id = %user_id, "user exited");
        ring_service::evict_user(state, &mut tournament, user_id).await;
    } else {
        info!(user_id = %user_id, "connection lost; identity kept for reconnect");
        if let Some(user) = tournament.user_mut(user_id) {
            user.set_connected(false);
        }
        notify_presence(state, &tournament, user_id, false);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::tournament_store::testing::NullTournamentStore, state::AppState,
    };

    async fn state_with_store() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state.install_store(Arc::new(NullTournamentStore)).await;
        state
    }

    async fn identified_judge(state: &SharedState, tx: &mpsc::UnboundedSender<Message>) -> Uuid {
        let payload = IdentificationPayload {
            identity: RoleClaim::Judge,
            value: "north corner".into(),
        };
        identify(state, &payload, tx).await.unwrap()
    }

    #[tokio::test]
    async fn second_connection_for_a_live_session_is_rejected() {
        let state = state_with_store().await;
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let id = identified_judge(&state, &tx1).await;

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let resolution = resolve(&state, RoleClaim::Judge, Some(id), &tx2).await;

        assert!(matches!(resolution, Resolution::Conflict));
        // The established connection keeps the identity.
        assert!(state.connections().contains_key(&id));
    }

    #[tokio::test]
    async fn reconnect_with_matching_role_restores_the_session() {
        let state = state_with_store().await;
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let id = identified_judge(&state, &tx1).await;
        disconnected(&state, id, false).await;

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let resolution = resolve(&state, RoleClaim::Judge, Some(id), &tx2).await;

        assert!(matches!(resolution, Resolution::Restored { user_id } if user_id == id));
        let tournament = state.tournament().read().await;
        assert_eq!(tournament.users.len(), 1);
        assert!(tournament.user(id).is_some_and(User::connected));
    }

    #[tokio::test]
    async fn role_switch_discards_the_previous_identity() {
        let state = state_with_store().await;
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let id = identified_judge(&state, &tx1).await;
        disconnected(&state, id, false).await;

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let resolution = resolve(&state, RoleClaim::Controller, Some(id), &tx2).await;

        assert!(matches!(resolution, Resolution::AwaitIdentification));
        let tournament = state.tournament().read().await;
        assert!(tournament.user(id).is_none());
    }
}
