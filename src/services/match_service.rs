//! Match command handling: lifecycle transitions, scoring, penalties,
//! timer snapshots and the deferred auto-advance cascade.
//!
//! Commands stage their mutation on a clone of the match, persist the
//! resulting field diff, then commit and notify. Cascading transitions
//! (after `round-ended` and `break-ended`) run on a separate tick so the
//! triggering notification is fully delivered first.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::tournament_store::TournamentStore,
    dto::{
        projection,
        ws::{ServerEvent, TimerKind},
    },
    error::ServiceError,
    services::{ring_service, ws_events},
    state::{
        SharedState,
        match_machine::{Match, MatchEvent, MatchState, Transition},
        scoring::{Competitor, PenaltyKind, ScoreEvent},
        tournament::{Tournament, User, match_data_diff},
    },
};

/// Apply a controller-issued lifecycle event to the ring's current match.
pub async fn fire(
    state: &SharedState,
    controller_id: Uuid,
    event: MatchEvent,
) -> Result<(), ServiceError> {
    let _gate = state.command_gate().lock().await;
    let store = state.require_store().await?;
    let mut tournament = state.tournament().write().await;
    let index = ring_service::controller_ring_index(&tournament, controller_id)?;
    advance(state, &store, &mut tournament, index, event).await
}

/// Stage, persist, commit and broadcast one transition. Gate must be held.
async fn advance(
    state: &SharedState,
    store: &Arc<dyn TournamentStore>,
    tournament: &mut Tournament,
    index: usize,
    event: MatchEvent,
) -> Result<(), ServiceError> {
    let before = tournament.rings[index]
        .match_in_progress()
        .ok_or_else(|| ServiceError::InvalidState("no match in progress".into()))?
        .clone();

    let mut after = before.clone();
    let transition = after.apply(event)?;
    store
        .update_match_data(after.id, match_data_diff(&before, &after))
        .await?;

    let event_payload = state_event(&transition, &after);
    let schedule_cascade = matches!(
        after.state,
        MatchState::RoundEnded | MatchState::BreakEnded
    );
    let match_id = after.id;
    tournament.rings[index].current_match = Some(after);

    // A fresh round wipes every judge's local undo history.
    if transition.to == MatchState::RoundStarted && transition.from == MatchState::RoundIdle {
        let judge_ids = tournament.rings[index].judge_ids.clone();
        for judge_id in judge_ids {
            if let Some(judge) = tournament.user_mut(judge_id).and_then(User::judge_mut) {
                judge.undo_stack.clear();
            }
        }
    }

    info!(ring = index, event = event.key(), to = transition.to.key(), "match transition");
    let ring = &tournament.rings[index];
    ws_events::notify_ring(state, ring, &event_payload);

    if schedule_cascade {
        schedule_followup(state.clone(), index, match_id);
    }
    Ok(())
}

/// Run the automatic event that follows `round-ended` or `break-ended`.
///
/// Spawned so it acquires the gate on its own tick, after the triggering
/// command has fully completed. The match is re-checked under the gate: if
/// a competing command moved it on, the cascade is dropped.
fn schedule_followup(state: SharedState, index: usize, match_id: Uuid) {
    tokio::spawn(async move {
        let _gate = state.command_gate().lock().await;
        let Some(store) = state.store().await else {
            warn!(ring = index, "storage unavailable; auto-advance skipped");
            return;
        };
        let mut tournament = state.tournament().write().await;

        let Some(before) = tournament
            .rings
            .get(index)
            .and_then(|ring| ring.current_match.as_ref())
            .filter(|contest| contest.id == match_id)
            .cloned()
        else {
            return;
        };

        let mut after = before.clone();
        let event = match after.state {
            MatchState::RoundEnded => after.auto_advance(),
            MatchState::BreakEnded => Some(MatchEvent::NextRound),
            _ => None,
        };
        let Some(event) = event else {
            return;
        };

        let transition = match after.apply(event) {
            Ok(transition) => transition,
            Err(err) => {
                warn!(ring = index, error = %err, "auto-advance produced an invalid transition");
                return;
            }
        };

        if let Err(err) = store
            .update_match_data(after.id, match_data_diff(&before, &after))
            .await
        {
            warn!(ring = index, error = %err, "failed to persist auto-advance");
            let ring = &tournament.rings[index];
            ws_events::notify_controller(
                &state,
                ring,
                &ServerEvent::OperationFailed {
                    command: event.key().to_owned(),
                },
            );
            return;
        }

        let event_payload = state_event(&transition, &after);
        tournament.rings[index].current_match = Some(after);
        info!(ring = index, event = event.key(), to = transition.to.key(), "match auto-advanced");

        let ring = &tournament.rings[index];
        ws_events::notify_ring(&state, ring, &event_payload);
    });
}

fn state_event(transition: &Transition, contest: &Match) -> ServerEvent {
    ServerEvent::MatchStateChanged {
        transition: transition.event.key().to_owned(),
        from: Some(transition.from.key().to_owned()),
        to: transition.to.key().to_owned(),
        round: contest.round.key().to_owned(),
        period: contest.period.key().to_owned(),
        timers: contest.timers.into(),
        winner: contest.winner.map(|decision| decision.key().to_owned()),
    }
}

/// Adjust one penalty cell of the current period.
pub async fn adjust_penalty(
    state: &SharedState,
    controller_id: Uuid,
    kind: PenaltyKind,
    competitor: Competitor,
    increment: bool,
) -> Result<(), ServiceError> {
    let _gate = state.command_gate().lock().await;
    let store = state.require_store().await?;
    let mut tournament = state.tournament().write().await;

    let index = ring_service::controller_ring_index(&tournament, controller_id)?;
    let before = tournament.rings[index]
        .match_in_progress()
        .ok_or_else(|| ServiceError::InvalidState("no match in progress".into()))?
        .clone();
    if !before.penalties_open() {
        return Err(ServiceError::InvalidState(
            "penalties can only change during a round or injury".into(),
        ));
    }

    let mut after = before.clone();
    after
        .current_penalties_mut()
        .adjust(kind, competitor, increment)?;
    store
        .update_match_data(after.id, match_data_diff(&before, &after))
        .await?;

    let period = after.period;
    let penalties = after.current_penalties_mut().clone();
    tournament.rings[index].current_match = Some(after);

    let ring = &tournament.rings[index];
    ws_events::notify_controller(
        state,
        ring,
        &ServerEvent::PenaltiesUpdated {
            period: period.key().to_owned(),
            warnings: penalties.warnings,
            fouls: penalties.fouls,
            maluses: penalties.maluses(),
        },
    );
    Ok(())
}

/// Record a client-side clock value so a restart resumes close to reality.
pub async fn save_timer_value(
    state: &SharedState,
    controller_id: Uuid,
    timer: TimerKind,
    value: u32,
) -> Result<(), ServiceError> {
    let _gate = state.command_gate().lock().await;
    let store = state.require_store().await?;
    let mut tournament = state.tournament().write().await;

    let index = ring_service::controller_ring_index(&tournament, controller_id)?;
    let before = tournament.rings[index]
        .match_in_progress()
        .ok_or_else(|| ServiceError::InvalidState("no match in progress".into()))?
        .clone();

    let mut after = before.clone();
    match timer {
        TimerKind::Round => after.timers.round = value,
        TimerKind::Injury => after.timers.injury = value,
    }
    store
        .update_match_data(after.id, match_data_diff(&before, &after))
        .await?;
    tournament.rings[index].current_match = Some(after);
    Ok(())
}

/// Apply a judge's score to its own current-period sheet.
pub async fn score(
    state: &SharedState,
    judge_id: Uuid,
    competitor: Competitor,
    points: i32,
) -> Result<(), ServiceError> {
    let _gate = state.command_gate().lock().await;
    let store = state.require_store().await?;
    let mut tournament = state.tournament().write().await;

    let index = scoring_ring(&tournament, judge_id)?;
    if points <= 0 {
        return Err(ServiceError::InvalidInput("points must be positive".into()));
    }

    let before = tournament.rings[index]
        .match_in_progress()
        .ok_or_else(|| ServiceError::InvalidState("no match in progress".into()))?
        .clone();
    if !before.scoring_open() {
        return Err(ServiceError::InvalidState(
            "scoring is only open while a round runs".into(),
        ));
    }

    let mut after = before.clone();
    after.add_scoreboard(judge_id);
    let total = {
        let sheet = after
            .current_sheet_mut(judge_id)
            .ok_or_else(|| ServiceError::NotFound("no sheet for this judge".into()))?;
        sheet.mark(competitor, points);
        sheet.raw[competitor.index()]
    };
    store
        .update_match_data(after.id, match_data_diff(&before, &after))
        .await?;

    let period = after.period;
    let scoreboards = projection::judge_sheets(&after);
    tournament.rings[index].current_match = Some(after);
    if let Some(judge) = tournament.user_mut(judge_id).and_then(User::judge_mut) {
        judge.undo_stack.push(ScoreEvent { competitor, points });
    }

    ws_events::send_to_user(
        state,
        judge_id,
        &ServerEvent::Scored {
            competitor,
            points,
            total,
        },
    );
    let ring = &tournament.rings[index];
    ws_events::notify_controller(
        state,
        ring,
        &ServerEvent::MatchScoresUpdated {
            period: period.key().to_owned(),
            scoreboards,
        },
    );
    Ok(())
}

/// Revert the judge's most recent score.
pub async fn undo(state: &SharedState, judge_id: Uuid) -> Result<(), ServiceError> {
    let _gate = state.command_gate().lock().await;
    let store = state.require_store().await?;
    let mut tournament = state.tournament().write().await;

    let index = scoring_ring(&tournament, judge_id)?;
    let last = tournament
        .user(judge_id)
        .and_then(User::judge)
        .and_then(|judge| judge.undo_stack.last())
        .copied()
        .ok_or_else(|| ServiceError::InvalidState("nothing to undo".into()))?;

    let before = tournament.rings[index]
        .match_in_progress()
        .ok_or_else(|| ServiceError::InvalidState("no match in progress".into()))?
        .clone();
    if !before.scoring_open() {
        return Err(ServiceError::InvalidState(
            "scoring is only open while a round runs".into(),
        ));
    }

    let mut after = before.clone();
    let total = {
        let sheet = after
            .current_sheet_mut(judge_id)
            .ok_or_else(|| ServiceError::NotFound("no sheet for this judge".into()))?;
        sheet.mark(last.competitor, -last.points);
        sheet.raw[last.competitor.index()]
    };
    store
        .update_match_data(after.id, match_data_diff(&before, &after))
        .await?;

    let period = after.period;
    let scoreboards = projection::judge_sheets(&after);
    tournament.rings[index].current_match = Some(after);
    if let Some(judge) = tournament.user_mut(judge_id).and_then(User::judge_mut) {
        judge.undo_stack.pop();
    }

    ws_events::send_to_user(
        state,
        judge_id,
        &ServerEvent::Undid {
            competitor: last.competitor,
            points: last.points,
            total,
        },
    );
    let ring = &tournament.rings[index];
    ws_events::notify_controller(
        state,
        ring,
        &ServerEvent::MatchScoresUpdated {
            period: period.key().to_owned(),
            scoreboards,
        },
    );
    Ok(())
}

/// Ring index for a judge allowed to touch scores: seated and authorised.
fn scoring_ring(tournament: &Tournament, judge_id: Uuid) -> Result<usize, ServiceError> {
    let index = ring_service::judge_ring_index(tournament, judge_id)?;
    let authorised = tournament
        .user(judge_id)
        .and_then(User::judge)
        .is_some_and(|judge| judge.authorised);
    if !authorised {
        return Err(ServiceError::Unauthorized("judge is not authorised".into()));
    }
    Ok(index)
}
