//! Role-scoped projections of the entity graph.
//!
//! Judges never receive another judge's raw scores mid-round; only the
//! controller sees full scoreboards and aggregated penalties. Everything in
//! this module is a pure mapping from runtime state to wire payloads.

use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::match_machine::{Match, MatchConfig, Timers};
use crate::state::scoring::{Penalties, ScoringSheet};
use crate::state::tournament::{Ring, Tournament};

/// One line of the ring overview sent to unassigned clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RingStateView {
    pub index: usize,
    pub open: bool,
    pub judge_count: usize,
    pub slot_count: usize,
}

/// Overview of every ring, in index order.
pub fn ring_states(tournament: &Tournament) -> Vec<RingStateView> {
    tournament
        .rings
        .iter()
        .map(|ring| RingStateView {
            index: ring.index,
            open: ring.is_open(),
            judge_count: ring.judge_ids.len(),
            slot_count: ring.slot_count,
        })
        .collect()
}

/// One judge as seen by the ring controller.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JudgeView {
    pub id: Uuid,
    pub name: String,
    pub authorised: bool,
    pub connected: bool,
}

/// Roster of a ring's judges in join order, resolved through the arena.
pub fn judge_roster(tournament: &Tournament, ring: &Ring) -> Vec<JudgeView> {
    ring.judge_ids
        .iter()
        .filter_map(|id| tournament.user(*id))
        .filter_map(|user| {
            let judge = user.judge()?;
            Some(JudgeView {
                id: judge.id,
                name: judge.name.clone(),
                authorised: judge.authorised,
                connected: judge.connected,
            })
        })
        .collect()
}

/// Match configuration as shown to the controller.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchConfigView {
    pub round_time: u32,
    pub break_time: u32,
    pub injury_time: u32,
    pub two_rounds: bool,
}

impl From<&MatchConfig> for MatchConfigView {
    fn from(value: &MatchConfig) -> Self {
        Self {
            round_time: value.round_time,
            break_time: value.break_time,
            injury_time: value.injury_time,
            two_rounds: value.two_rounds,
        }
    }
}

/// Clock snapshot values.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct TimersView {
    pub round: u32,
    pub injury: u32,
}

impl From<Timers> for TimersView {
    fn from(value: Timers) -> Self {
        Self {
            round: value.round,
            injury: value.injury,
        }
    }
}

/// One scoring sheet, finalized or not.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SheetView {
    pub raw: [i32; 2],
    pub totals: Option<[i32; 2]>,
    pub winner: Option<String>,
}

impl From<&ScoringSheet> for SheetView {
    fn from(value: &ScoringSheet) -> Self {
        Self {
            raw: value.raw,
            totals: value.totals,
            winner: value.winner.map(|competitor| competitor.key().to_owned()),
        }
    }
}

/// Penalty tallies with the maluses they currently imply.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PenaltiesView {
    pub warnings: [u32; 2],
    pub fouls: [u32; 2],
    pub maluses: [i32; 2],
}

impl From<&Penalties> for PenaltiesView {
    fn from(value: &Penalties) -> Self {
        Self {
            warnings: value.warnings,
            fouls: value.fouls,
            maluses: value.maluses(),
        }
    }
}

/// One judge's full set of sheets, keyed by period, controller-only.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JudgeSheetsView {
    pub id: Uuid,
    pub sheets: BTreeMap<String, SheetView>,
}

/// Full match projection for the ring controller.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControllerMatchView {
    pub id: Uuid,
    pub state: String,
    pub round: String,
    pub period: String,
    pub periods: Vec<String>,
    pub timers: TimersView,
    pub winner: Option<String>,
    pub scoreboards: Vec<JudgeSheetsView>,
    pub penalties: BTreeMap<String, PenaltiesView>,
}

/// Every judge's sheets, controller-only.
pub fn judge_sheets(contest: &Match) -> Vec<JudgeSheetsView> {
    contest
        .scoreboards
        .iter()
        .map(|(judge_id, board)| JudgeSheetsView {
            id: *judge_id,
            sheets: board
                .sheets
                .iter()
                .map(|(period, sheet)| (period.key().to_owned(), sheet.into()))
                .collect(),
        })
        .collect()
}

/// Build the controller's match projection.
pub fn controller_match_view(contest: &Match) -> ControllerMatchView {
    ControllerMatchView {
        id: contest.id,
        state: contest.state.key().to_owned(),
        round: contest.round.key().to_owned(),
        period: contest.period.key().to_owned(),
        periods: contest.periods.iter().map(|p| p.key().to_owned()).collect(),
        timers: contest.timers.into(),
        winner: contest.winner.map(|decision| decision.key().to_owned()),
        scoreboards: judge_sheets(contest),
        penalties: contest
            .penalties
            .iter()
            .map(|(period, penalties)| (period.key().to_owned(), penalties.into()))
            .collect(),
    }
}

/// Match projection for a judge: shared round state plus only that judge's
/// own current-period sheet.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JudgeMatchView {
    pub id: Uuid,
    pub state: String,
    pub round: String,
    pub period: String,
    pub timers: TimersView,
    pub sheet: Option<SheetView>,
}

/// Build a judge's match projection.
pub fn judge_match_view(contest: &Match, judge_id: Uuid) -> JudgeMatchView {
    let period = contest.period;
    JudgeMatchView {
        id: contest.id,
        state: contest.state.key().to_owned(),
        round: contest.round.key().to_owned(),
        period: period.key().to_owned(),
        timers: contest.timers.into(),
        sheet: contest
            .scoreboards
            .get(&judge_id)
            .and_then(|board| board.sheets.get(&period))
            .map(Into::into),
    }
}

/// Match projection scoped to whichever role receives it.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum MatchView {
    Controller(ControllerMatchView),
    Judge(JudgeMatchView),
}

/// Full ring projection for the ring controller.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControllerRingView {
    pub index: usize,
    pub slot_count: usize,
    pub judges: Vec<JudgeView>,
    pub config: MatchConfigView,
    #[serde(rename = "match")]
    pub current_match: Option<ControllerMatchView>,
}

/// Build the controller's ring projection.
pub fn controller_ring_view(tournament: &Tournament, ring: &Ring) -> ControllerRingView {
    ControllerRingView {
        index: ring.index,
        slot_count: ring.slot_count,
        judges: judge_roster(tournament, ring),
        config: (&ring.match_config).into(),
        current_match: ring.current_match.as_ref().map(controller_match_view),
    }
}

/// Ring projection for a judge.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JudgeRingView {
    pub index: usize,
    pub authorised: bool,
    #[serde(rename = "match")]
    pub current_match: Option<JudgeMatchView>,
}

/// Build a judge's ring projection.
pub fn judge_ring_view(ring: &Ring, judge_id: Uuid, authorised: bool) -> JudgeRingView {
    JudgeRingView {
        index: ring.index,
        authorised,
        current_match: ring
            .current_match
            .as_ref()
            .map(|contest| judge_match_view(contest, judge_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::match_machine::{MatchEvent, Match as Contest};
    use crate::state::scoring::Competitor;

    fn contest_with_judges(a: Uuid, b: Uuid) -> Contest {
        let mut contest = Contest::new(MatchConfig::default());
        contest.add_scoreboard(a);
        contest.add_scoreboard(b);
        contest
    }

    #[test]
    fn judge_view_hides_peer_sheets() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut contest = contest_with_judges(a, b);
        contest.apply(MatchEvent::StartState).unwrap();
        contest.current_sheet_mut(a).unwrap().mark(Competitor::Hong, 2);
        contest.current_sheet_mut(b).unwrap().mark(Competitor::Chong, 3);

        let view = judge_match_view(&contest, a);
        assert_eq!(view.sheet.as_ref().unwrap().raw, [2, 0]);

        let serialized = serde_json::to_value(&view).unwrap();
        assert!(!serialized.to_string().contains(&b.to_string()));
    }

    #[test]
    fn controller_view_carries_every_scoreboard() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let contest = contest_with_judges(a, b);

        let view = controller_match_view(&contest);
        assert_eq!(view.scoreboards.len(), 2);
        assert_eq!(view.state, "round-idle");
        assert!(view.penalties.contains_key("main-rounds"));
    }
}
