//! Per-connection WebSocket lifecycle: identity resolution, the
//! identification handshake and command dispatch.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use futures::stream::SplitStream;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientCommand, RoleClaim, ServerEvent},
    error::ServiceError,
    services::{match_service, ring_service, session_service, ws_events},
    state::{SharedState, match_machine::MatchEvent},
};

/// Close-frame reason clients send to discard their identity on the way out.
const EXIT_REASON: &str = "exit";

/// Handle the full lifecycle of one client WebSocket connection.
pub async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    role: RoleClaim,
    claimed_id: Option<Uuid>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let user_id = match session_service::resolve(&state, role, claimed_id, &outbound_tx).await {
        session_service::Resolution::Conflict => {
            ws_events::send_on(
                &outbound_tx,
                &ServerEvent::SessionConflict {
                    message: "another live connection already owns this identity".into(),
                },
            );
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        session_service::Resolution::Restored { user_id } => user_id,
        session_service::Resolution::AwaitIdentification => {
            match identification_loop(&state, &mut receiver, &outbound_tx).await {
                Some(user_id) => user_id,
                None => {
                    finalize(writer_task, outbound_tx).await;
                    return;
                }
            }
        }
    };

    let mut exit = false;
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(command) => {
                    let name = command.name();
                    if let Err(err) = dispatch(&state, user_id, command).await {
                        warn!(user_id = %user_id, command = name, error = %err, "command failed");
                        let event = if err.is_storage_outage() {
                            ServerEvent::OperationFailed {
                                command: name.to_owned(),
                            }
                        } else {
                            ServerEvent::CommandRejected {
                                command: name.to_owned(),
                                message: err.to_string(),
                            }
                        };
                        ws_events::send_on(&outbound_tx, &event);
                    }
                }
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "malformed command payload");
                    ws_events::send_on(
                        &outbound_tx,
                        &ServerEvent::CommandRejected {
                            command: "unknown".into(),
                            message: "malformed command payload".into(),
                        },
                    );
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                exit = frame.is_some_and(|f| f.reason.as_str() == EXIT_REASON);
                info!(user_id = %user_id, exit, "client closed the connection");
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "websocket error");
                break;
            }
        }
    }

    session_service::disconnected(&state, user_id, exit).await;
    finalize(writer_task, outbound_tx).await;
}

/// Run the identification handshake until it succeeds or the peer goes away.
///
/// Invalid attempts re-prompt indefinitely; the connection is never dropped
/// for a bad credential.
async fn identification_loop(
    state: &SharedState,
    receiver: &mut SplitStream<WebSocket>,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) -> Option<Uuid> {
    ws_events::send_on(
        outbound_tx,
        &ServerEvent::RequestIdentification {
            message: "identify to continue".into(),
        },
    );

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(ClientCommand::Identification(payload)) => {
                    match session_service::identify(state, &payload, outbound_tx).await {
                        Ok(user_id) => return Some(user_id),
                        Err(err) => {
                            warn!(error = %err, "identification attempt rejected");
                            if err.is_storage_outage() {
                                ws_events::send_on(
                                    outbound_tx,
                                    &ServerEvent::OperationFailed {
                                        command: "identification".into(),
                                    },
                                );
                            }
                            ws_events::send_on(
                                outbound_tx,
                                &ServerEvent::RequestIdentification {
                                    message: "identification failed; try again".into(),
                                },
                            );
                        }
                    }
                }
                Ok(command) => {
                    ws_events::send_on(
                        outbound_tx,
                        &ServerEvent::CommandRejected {
                            command: command.name().to_owned(),
                            message: "identify first".into(),
                        },
                    );
                }
                Err(err) => {
                    warn!(error = %err, "malformed identification payload");
                    ws_events::send_on(
                        outbound_tx,
                        &ServerEvent::RequestIdentification {
                            message: "identification failed; try again".into(),
                        },
                    );
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(_)) => return None,
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(error = %err, "websocket error during identification");
                return None;
            }
        }
    }
    None
}

/// Route one identified command to the service that owns it.
async fn dispatch(
    state: &SharedState,
    user_id: Uuid,
    command: ClientCommand,
) -> Result<(), ServiceError> {
    match command {
        ClientCommand::Identification(_) => {
            Err(ServiceError::InvalidState("already identified".into()))
        }
        ClientCommand::SelectRing { index } => {
            ring_service::select_ring(state, user_id, index).await
        }
        ClientCommand::AddSlot => ring_service::add_slot(state, user_id).await,
        ClientCommand::RemoveSlot => ring_service::remove_slot(state, user_id).await,
        ClientCommand::AuthoriseCj { id } => {
            ring_service::authorise_judge(state, user_id, id).await
        }
        ClientCommand::RejectCj { id } => {
            ring_service::remove_judge(state, user_id, id, "not accepted for this ring").await
        }
        ClientCommand::RemoveCj { id } => {
            ring_service::remove_judge(state, user_id, id, "removed by the ring controller").await
        }
        ClientCommand::SetConfigItem { name, value } => {
            ring_service::set_config_item(state, user_id, &name, value).await
        }
        ClientCommand::CreateMatch => ring_service::create_match(state, user_id).await,
        ClientCommand::ContinueMatch => {
            match_service::fire(state, user_id, MatchEvent::Break).await
        }
        ClientCommand::EndMatch => match_service::fire(state, user_id, MatchEvent::End).await,
        ClientCommand::StartMatchState => {
            match_service::fire(state, user_id, MatchEvent::StartState).await
        }
        ClientCommand::EndMatchState => {
            match_service::fire(state, user_id, MatchEvent::EndState).await
        }
        ClientCommand::ToggleInjury => {
            match_service::fire(state, user_id, MatchEvent::ToggleInjury).await
        }
        ClientCommand::IncrementPenalty { kind, competitor } => {
            match_service::adjust_penalty(state, user_id, kind, competitor, true).await
        }
        ClientCommand::DecrementPenalty { kind, competitor } => {
            match_service::adjust_penalty(state, user_id, kind, competitor, false).await
        }
        ClientCommand::SaveTimerValue { name, value } => {
            match_service::save_timer_value(state, user_id, name, value).await
        }
        ClientCommand::Score { competitor, points } => {
            match_service::score(state, user_id, competitor, points).await
        }
        ClientCommand::Undo => match_service::undo(state, user_id).await,
        ClientCommand::CancelJoin => ring_service::cancel_join(state, user_id).await,
        ClientCommand::Unknown => Err(ServiceError::InvalidInput("unknown command".into())),
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
