//! Ring coordination: opening and joining rings, judge roster management,
//! slot capacity, per-ring configuration and match creation.
//!
//! Every public operation follows the same discipline: stage changes on
//! clones, persist them, then commit into the arena and notify. A storage
//! failure therefore never leaves half-applied state behind.

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        projection,
        ws::{ConfigValue, ServerEvent},
    },
    error::ServiceError,
    services::ws_events,
    state::{
        SharedState,
        match_machine::Match,
        tournament::{Ring, Role, Tournament, User, match_data_diff, match_entity},
    },
};

pub(crate) fn controller_ring_index(
    tournament: &Tournament,
    user_id: Uuid,
) -> Result<usize, ServiceError> {
    tournament
        .rings
        .iter()
        .position(|ring| ring.controller_id == Some(user_id))
        .ok_or_else(|| ServiceError::Unauthorized("not a ring controller".into()))
}

pub(crate) fn judge_ring_index(
    tournament: &Tournament,
    user_id: Uuid,
) -> Result<usize, ServiceError> {
    tournament
        .rings
        .iter()
        .position(|ring| ring.has_judge(user_id))
        .ok_or_else(|| ServiceError::InvalidState("not seated in a ring".into()))
}

fn roster_event(tournament: &Tournament, ring: &Ring) -> ServerEvent {
    ServerEvent::SlotsUpdated {
        slot_count: ring.slot_count,
        judges: projection::judge_roster(tournament, ring),
    }
}

/// Assign a user to the ring at `index`.
///
/// Controllers open a closed ring; judges take a free slot in an open one.
/// A judge joining while a match runs gets a scoreboard straight away.
pub async fn select_ring(
    state: &SharedState,
    user_id: Uuid,
    index: usize,
) -> Result<(), ServiceError> {
    let _gate = state.command_gate().lock().await;
    let store = state.require_store().await?;
    let mut tournament = state.tournament().write().await;

    let role = tournament
        .user(user_id)
        .ok_or_else(|| ServiceError::NotFound("unknown user".into()))?
        .role();
    if tournament.ring_of(user_id).is_some() {
        return Err(ServiceError::InvalidState(
            "already assigned to a ring".into(),
        ));
    }
    let tournament_id = tournament.id;
    if index >= tournament.rings.len() {
        return Err(ServiceError::NotFound(format!("no ring at index {index}")));
    }

    match role {
        Role::Controller => {
            let ring = &tournament.rings[index];
            if ring.is_open() {
                return Err(ServiceError::InvalidState("ring is already open".into()));
            }

            let mut staged = ring.clone();
            staged.controller_id = Some(user_id);
            store.save_ring(staged.to_entity(tournament_id)).await?;

            tournament.rings[index].controller_id = Some(user_id);
            info!(user_id = %user_id, ring = index, "ring opened");

            let ring = &tournament.rings[index];
            ws_events::send_to_user(
                state,
                user_id,
                &ServerEvent::RingOpened {
                    ring: projection::controller_ring_view(&tournament, ring),
                },
            );
        }
        Role::Judge => {
            let ring = &tournament.rings[index];
            if !ring.is_open() {
                return Err(ServiceError::InvalidState("ring is not open".into()));
            }
            if ring.judge_ids.len() >= ring.slot_count {
                return Err(ServiceError::InvalidState("ring is full".into()));
            }

            let mut staged = ring.clone();
            staged.judge_ids.push(user_id);
            let staged_match = stage_scoreboard(ring, user_id);
            if let Some((before, after)) = &staged_match {
                store
                    .update_match_data(after.id, match_data_diff(before, after))
                    .await?;
            }
            store.save_ring(staged.to_entity(tournament_id)).await?;

            let ring = &mut tournament.rings[index];
            ring.judge_ids.push(user_id);
            if let Some((_, after)) = staged_match {
                ring.current_match = Some(after);
            }
            info!(user_id = %user_id, ring = index, "judge joined ring");

            let ring = &tournament.rings[index];
            ws_events::send_to_user(state, user_id, &ServerEvent::AuthorisationPending);
            ws_events::notify_controller(state, ring, &roster_event(&tournament, ring));
        }
    }

    Ok(())
}

/// Clone the ring's in-progress match with a scoreboard for `judge_id`,
/// returning (committed, staged) when there is anything to patch.
fn stage_scoreboard(ring: &Ring, judge_id: Uuid) -> Option<(Match, Match)> {
    let before = ring.match_in_progress()?;
    let mut after = before.clone();
    after.add_scoreboard(judge_id);
    Some((before.clone(), after))
}

/// Approve a judge's presence in the controller's ring.
pub async fn authorise_judge(
    state: &SharedState,
    controller_id: Uuid,
    judge_id: Uuid,
) -> Result<(), ServiceError> {
    let _gate = state.command_gate().lock().await;
    let store = state.require_store().await?;
    let mut tournament = state.tournament().write().await;

    let index = controller_ring_index(&tournament, controller_id)?;
    let tournament_id = tournament.id;
    if !tournament.rings[index].has_judge(judge_id) {
        return Err(ServiceError::NotFound("judge is not in this ring".into()));
    }

    let mut staged_user = tournament
        .user(judge_id)
        .ok_or_else(|| ServiceError::NotFound("unknown judge".into()))?
        .clone();
    staged_user
        .judge_mut()
        .ok_or_else(|| ServiceError::InvalidInput("user is not a judge".into()))?
        .authorised = true;

    let staged_match = stage_scoreboard(&tournament.rings[index], judge_id);
    if let Some((before, after)) = &staged_match {
        store
            .update_match_data(after.id, match_data_diff(before, after))
            .await?;
    }
    store.save_user(staged_user.to_entity(tournament_id)).await?;

    if let Some(judge) = tournament.user_mut(judge_id).and_then(User::judge_mut) {
        judge.authorised = true;
    }
    if let Some((_, after)) = staged_match {
        tournament.rings[index].current_match = Some(after);
    }
    info!(controller_id = %controller_id, judge_id = %judge_id, "judge authorised");

    let ring = &tournament.rings[index];
    ws_events::send_to_user(
        state,
        judge_id,
        &ServerEvent::RingJoined {
            ring: projection::judge_ring_view(ring, judge_id, true),
        },
    );
    ws_events::notify_controller(state, ring, &roster_event(&tournament, ring));
    Ok(())
}

/// Remove a judge from the controller's ring.
///
/// The judge is told `rejected` when it was never authorised and `ringLeft`
/// otherwise; either way it keeps its identity and gets the ring list back.
pub async fn remove_judge(
    state: &SharedState,
    controller_id: Uuid,
    judge_id: Uuid,
    reason: &str,
) -> Result<(), ServiceError> {
    let _gate = state.command_gate().lock().await;
    let store = state.require_store().await?;
    let mut tournament = state.tournament().write().await;

    let index = controller_ring_index(&tournament, controller_id)?;
    let tournament_id = tournament.id;
    if !tournament.rings[index].has_judge(judge_id) {
        return Err(ServiceError::NotFound("judge is not in this ring".into()));
    }

    let was_authorised = tournament
        .user(judge_id)
        .and_then(User::judge)
        .is_some_and(|judge| judge.authorised);

    let mut staged_ring = tournament.rings[index].clone();
    staged_ring.judge_ids.retain(|id| *id != judge_id);
    let mut staged_user = tournament
        .user(judge_id)
        .ok_or_else(|| ServiceError::NotFound("unknown judge".into()))?
        .clone();
    if let Some(judge) = staged_user.judge_mut() {
        judge.authorised = false;
    }

    store.save_ring(staged_ring.to_entity(tournament_id)).await?;
    store.save_user(staged_user.to_entity(tournament_id)).await?;

    tournament.rings[index].judge_ids.retain(|id| *id != judge_id);
    if let Some(judge) = tournament.user_mut(judge_id).and_then(User::judge_mut) {
        judge.authorised = false;
        judge.undo_stack.clear();
    }
    info!(controller_id = %controller_id, judge_id = %judge_id, reason, "judge removed from ring");

    let farewell = if was_authorised {
        ServerEvent::RingLeft {
            message: reason.to_owned(),
        }
    } else {
        ServerEvent::Rejected {
            message: reason.to_owned(),
        }
    };
    ws_events::send_to_user(state, judge_id, &farewell);
    ws_events::send_to_user(
        state,
        judge_id,
        &ServerEvent::RingStates {
            rings: projection::ring_states(&tournament),
        },
    );
    let ring = &tournament.rings[index];
    ws_events::notify_controller(state, ring, &roster_event(&tournament, ring));
    Ok(())
}

/// A judge withdraws from its ring before (or after) authorisation.
pub async fn cancel_join(state: &SharedState, judge_id: Uuid) -> Result<(), ServiceError> {
    let _gate = state.command_gate().lock().await;
    let store = state.require_store().await?;
    let mut tournament = state.tournament().write().await;

    let index = judge_ring_index(&tournament, judge_id)?;
    let tournament_id = tournament.id;

    let mut staged_ring = tournament.rings[index].clone();
    staged_ring.judge_ids.retain(|id| *id != judge_id);
    let mut staged_user = tournament
        .user(judge_id)
        .ok_or_else(|| ServiceError::NotFound("unknown judge".into()))?
        .clone();
    if let Some(judge) = staged_user.judge_mut() {
        judge.authorised = false;
    }

    store.save_ring(staged_ring.to_entity(tournament_id)).await?;
    store.save_user(staged_user.to_entity(tournament_id)).await?;

    tournament.rings[index].judge_ids.retain(|id| *id != judge_id);
    if let Some(judge) = tournament.user_mut(judge_id).and_then(User::judge_mut) {
        judge.authorised = false;
        judge.undo_stack.clear();
    }
    info!(judge_id = %judge_id, ring = index, "judge withdrew from ring");

    ws_events::send_to_user(
        state,
        judge_id,
        &ServerEvent::RingStates {
            rings: projection::ring_states(&tournament),
        },
    );
    let ring = &tournament.rings[index];
    ws_events::notify_controller(state, ring, &roster_event(&tournament, ring));
    Ok(())
}

/// Grow the ring's judge capacity by one.
pub async fn add_slot(state: &SharedState, controller_id: Uuid) -> Result<(), ServiceError> {
    adjust_slots(state, controller_id, true).await
}

/// Shrink the ring's judge capacity by one.
pub async fn remove_slot(state: &SharedState, controller_id: Uuid) -> Result<(), ServiceError> {
    adjust_slots(state, controller_id, false).await
}

async fn adjust_slots(
    state: &SharedState,
    controller_id: Uuid,
    grow: bool,
) -> Result<(), ServiceError> {
    let _gate = state.command_gate().lock().await;
    let store = state.require_store().await?;
    let mut tournament = state.tournament().write().await;

    let index = controller_ring_index(&tournament, controller_id)?;
    let tournament_id = tournament.id;
    let ring = &tournament.rings[index];

    let next = if grow {
        ring.slot_count + 1
    } else {
        if ring.slot_count == 1 {
            return Err(ServiceError::InvalidState(
                "cannot remove the last slot".into(),
            ));
        }
        if ring.judge_ids.len() == ring.slot_count {
            return Err(ServiceError::InvalidState("every slot is occupied".into()));
        }
        ring.slot_count - 1
    };

    let mut staged = ring.clone();
    staged.slot_count = next;
    store.save_ring(staged.to_entity(tournament_id)).await?;

    tournament.rings[index].slot_count = next;
    let ring = &tournament.rings[index];
    ws_events::notify_controller(state, ring, &roster_event(&tournament, ring));
    Ok(())
}

/// Apply a validated change to one of the ring's configuration items.
///
/// Time items move in single steps and must stay positive; the format flag
/// takes a boolean.
pub async fn set_config_item(
    state: &SharedState,
    controller_id: Uuid,
    name: &str,
    value: ConfigValue,
) -> Result<(), ServiceError> {
    let _gate = state.command_gate().lock().await;
    let store = state.require_store().await?;
    let mut tournament = state.tournament().write().await;

    let index = controller_ring_index(&tournament, controller_id)?;
    let tournament_id = tournament.id;
    let ring = &tournament.rings[index];

    let mut staged = ring.match_config.clone();
    match name {
        "roundTime" => staged.round_time = step_time(staged.round_time, value)?,
        "breakTime" => staged.break_time = step_time(staged.break_time, value)?,
        "injuryTime" => staged.injury_time = step_time(staged.injury_time, value)?,
        "twoRounds" => match value {
            ConfigValue::Flag(flag) => staged.two_rounds = flag,
            ConfigValue::Step(_) => {
                return Err(ServiceError::InvalidInput(
                    "twoRounds expects a boolean".into(),
                ));
            }
        },
        other => {
            return Err(ServiceError::InvalidInput(format!(
                "unknown config item `{other}`"
            )));
        }
    }

    let mut staged_ring = ring.clone();
    staged_ring.match_config = staged.clone();
    store.save_ring(staged_ring.to_entity(tournament_id)).await?;

    tournament.rings[index].match_config = staged;
    let ring = &tournament.rings[index];
    ws_events::notify_controller(
        state,
        ring,
        &ServerEvent::ConfigUpdated {
            config: (&ring.match_config).into(),
        },
    );
    Ok(())
}

fn step_time(current: u32, value: ConfigValue) -> Result<u32, ServiceError> {
    let step = match value {
        ConfigValue::Step(step) if step == 1 || step == -1 => step,
        ConfigValue::Step(_) => {
            return Err(ServiceError::InvalidInput(
                "time items move one step at a time".into(),
            ));
        }
        ConfigValue::Flag(_) => {
            return Err(ServiceError::InvalidInput(
                "time items expect a step value".into(),
            ));
        }
    };

    let next = i64::from(current) + step;
    if next <= 0 {
        return Err(ServiceError::InvalidInput(
            "time values must stay positive".into(),
        ));
    }
    Ok(next as u32)
}

/// Create a match in the controller's ring from its current configuration.
pub async fn create_match(state: &SharedState, controller_id: Uuid) -> Result<(), ServiceError> {
    let _gate = state.command_gate().lock().await;
    let store = state.require_store().await?;
    let mut tournament = state.tournament().write().await;

    let index = controller_ring_index(&tournament, controller_id)?;
    let ring = &tournament.rings[index];
    if ring.match_in_progress().is_some() {
        return Err(ServiceError::InvalidState(
            "a match is already in progress".into(),
        ));
    }

    let mut contest = Match::new(ring.match_config.clone());
    for judge_id in &ring.judge_ids {
        contest.add_scoreboard(*judge_id);
    }
    store.save_match(match_entity(&contest, ring.id)).await?;

    let judge_ids = ring.judge_ids.clone();
    tournament.rings[index].current_match = Some(contest);
    for judge_id in &judge_ids {
        if let Some(judge) = tournament.user_mut(*judge_id).and_then(User::judge_mut) {
            judge.undo_stack.clear();
        }
    }
    info!(controller_id = %controller_id, ring = index, "match created");

    let ring = &tournament.rings[index];
    if let Some(contest) = ring.current_match.as_ref() {
        ws_events::notify_controller(
            state,
            ring,
            &ServerEvent::MatchCreated {
                contest: projection::MatchView::Controller(projection::controller_match_view(
                    contest,
                )),
            },
        );
        for judge_id in &ring.judge_ids {
            ws_events::send_to_user(
                state,
                *judge_id,
                &ServerEvent::MatchCreated {
                    contest: projection::MatchView::Judge(projection::judge_match_view(
                        contest, *judge_id,
                    )),
                },
            );
        }
    }
    Ok(())
}

/// Discard a user's identity, unwinding any ring membership first.
///
/// Called with the command gate already held, after an explicit exit or a
/// role switch. Persistence is best effort; there is nobody left to report
/// a failure to.
pub async fn evict_user(state: &SharedState, tournament: &mut Tournament, user_id: Uuid) {
    let store = state.store().await;
    let tournament_id = tournament.id;

    if let Some(index) = tournament.ring_of(user_id) {
        let is_controller = tournament.rings[index].controller_id == Some(user_id);

        if is_controller {
            // Controller exit closes the ring and unseats its judges.
            let judge_ids = {
                let ring = &mut tournament.rings[index];
                ring.controller_id = None;
                ring.current_match = None;
                std::mem::take(&mut ring.judge_ids)
            };
            for judge_id in &judge_ids {
                if let Some(judge) = tournament.user_mut(*judge_id).and_then(User::judge_mut) {
                    judge.authorised = false;
                    judge.undo_stack.clear();
                }
            }
            info!(user_id = %user_id, ring = index, "ring closed");

            if let Some(store) = &store {
                if let Err(err) = store
                    .save_ring(tournament.rings[index].to_entity(tournament_id))
                    .await
                {
                    warn!(error = %err, ring = index, "failed to persist closed ring");
                }
                for judge_id in &judge_ids {
                    if let Some(user) = tournament.user(*judge_id) {
                        if let Err(err) = store.save_user(user.to_entity(tournament_id)).await {
                            warn!(error = %err, judge_id = %judge_id, "failed to persist unseated judge");
                        }
                    }
                }
            }

            // Judges hear about the closure only after the saves ran.
            for judge_id in &judge_ids {
                ws_events::send_to_user(
                    state,
                    *judge_id,
                    &ServerEvent::RingLeft {
                        message: "ring closed".into(),
                    },
                );
                ws_events::send_to_user(
                    state,
                    *judge_id,
                    &ServerEvent::RingStates {
                        rings: projection::ring_states(tournament),
                    },
                );
            }
        } else {
            tournament.rings[index].judge_ids.retain(|id| *id != user_id);
            if let Some(store) = &store {
                if let Err(err) = store
                    .save_ring(tournament.rings[index].to_entity(tournament_id))
                    .await
                {
                    warn!(error = %err, ring = index, "failed to persist ring after judge exit");
                }
            }
            let ring = &tournament.rings[index];
            ws_events::notify_controller(state, ring, &roster_event(tournament, ring));
        }
    }

    tournament.users.shift_remove(&user_id);
    if let Some(store) = &store {
        if let Err(err) = store.delete_user(user_id).await {
            warn!(error = %err, user_id = %user_id, "failed to delete exited user");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::tournament_store::testing::NullTournamentStore,
        state::{AppState, ClientConnection},
        state::tournament::{Controller, Judge},
    };

    async fn state_with_controller() -> (SharedState, Uuid) {
        let state = AppState::new(AppConfig::default());
        state.install_store(Arc::new(NullTournamentStore)).await;
        let controller_id = Uuid::new_v4();
        {
            let mut tournament = state.tournament().write().await;
            tournament.users.insert(
                controller_id,
                User::Controller(Controller {
                    id: controller_id,
                    connected: true,
                }),
            );
            tournament.rings[0].controller_id = Some(controller_id);
        }
        (state, controller_id)
    }

    #[tokio::test]
    async fn add_slot_grows_capacity() {
        let (state, controller_id) = state_with_controller().await;
        let before = state.tournament().read().await.rings[0].slot_count;

        add_slot(&state, controller_id).await.unwrap();

        let tournament = state.tournament().read().await;
        assert_eq!(tournament.rings[0].slot_count, before + 1);
    }

    #[tokio::test]
    async fn last_slot_cannot_be_removed() {
        let (state, controller_id) = state_with_controller().await;
        {
            let mut tournament = state.tournament().write().await;
            tournament.rings[0].slot_count = 1;
        }

        let err = remove_slot(&state, controller_id).await.unwrap_err();

        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(state.tournament().read().await.rings[0].slot_count, 1);
    }

    #[tokio::test]
    async fn occupied_slots_cannot_be_removed() {
        let (state, controller_id) = state_with_controller().await;
        {
            let mut tournament = state.tournament().write().await;
            tournament.rings[0].slot_count = 2;
            tournament.rings[0].judge_ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        }

        let err = remove_slot(&state, controller_id).await.unwrap_err();

        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(state.tournament().read().await.rings[0].slot_count, 2);
    }

    #[tokio::test]
    async fn controller_eviction_closes_the_ring() {
        let (state, controller_id) = state_with_controller().await;
        let judge_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.connections().insert(
            judge_id,
            ClientConnection {
                user_id: judge_id,
                tx,
            },
        );
        {
            let mut tournament = state.tournament().write().await;
            tournament.users.insert(
                judge_id,
                User::Judge(Judge {
                    id: judge_id,
                    connected: true,
                    name: "east corner".into(),
                    authorised: true,
                    undo_stack: Vec::new(),
                }),
            );
            tournament.rings[0].judge_ids.push(judge_id);

            evict_user(&state, &mut tournament, controller_id).await;

            assert_eq!(tournament.rings[0].controller_id, None);
            assert!(tournament.rings[0].judge_ids.is_empty());
            assert!(tournament.user(controller_id).is_none());
            assert!(
                tournament
                    .user(judge_id)
                    .and_then(User::judge)
                    .is_some_and(|judge| !judge.authorised)
            );
        }

        let frame = rx.try_recv().expect("judge should hear the closure");
        match frame {
            Message::Text(text) => assert!(text.as_str().contains("ringLeft")),
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
