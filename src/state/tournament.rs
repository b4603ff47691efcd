//! Runtime entity graph: tournament, rings and users.
//!
//! The tournament is the arena — it owns every [`Ring`] and indexes every
//! [`User`] by id. Rings reference users by id only; resolution goes through
//! the arena at the point of use, so there are no reference cycles.

use std::time::SystemTime;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::dao::models::{
    IdentityEntity, MatchConfigEntity, MatchDataEntity, MatchDataPatch, MatchEntity,
    PenaltiesEntity, RingEntity, SheetEntity, TournamentEntity, UserEntity,
};
use crate::state::match_machine::{Match, MatchConfig};
use crate::state::scoring::{Penalties, ScoreEvent, ScoringSheet};

/// Role a user holds for the lifetime of its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Ring controller (jury president in source nomenclature).
    Controller,
    /// Scoring judge (corner judge in source nomenclature).
    Judge,
}

/// A ring controller.
#[derive(Debug, Clone)]
pub struct Controller {
    /// Stable identifier, reissued to the client for reconnection.
    pub id: Uuid,
    /// Whether a live connection currently backs this identity.
    pub connected: bool,
}

/// A scoring judge.
#[derive(Debug, Clone)]
pub struct Judge {
    /// Stable identifier, reissued to the client for reconnection.
    pub id: Uuid,
    /// Whether a live connection currently backs this identity.
    pub connected: bool,
    /// Display name provided at identification.
    pub name: String,
    /// Whether the ring controller has approved this judge.
    pub authorised: bool,
    /// Scores applied this round, most recent last; cleared at round start.
    pub undo_stack: Vec<ScoreEvent>,
}

/// A participant identity, polymorphic over its role.
#[derive(Debug, Clone)]
pub enum User {
    /// Controller variant.
    Controller(Controller),
    /// Judge variant.
    Judge(Judge),
}

impl User {
    /// Stable identifier of the user.
    pub fn id(&self) -> Uuid {
        match self {
            User::Controller(controller) => controller.id,
            User::Judge(judge) => judge.id,
        }
    }

    /// Role of this user.
    pub fn role(&self) -> Role {
        match self {
            User::Controller(_) => Role::Controller,
            User::Judge(_) => Role::Judge,
        }
    }

    /// Whether a live connection currently backs this identity.
    pub fn connected(&self) -> bool {
        match self {
            User::Controller(controller) => controller.connected,
            User::Judge(judge) => judge.connected,
        }
    }

    /// Flip the connection-present flag.
    pub fn set_connected(&mut self, connected: bool) {
        match self {
            User::Controller(controller) => controller.connected = connected,
            User::Judge(judge) => judge.connected = connected,
        }
    }

    /// Judge-specific data, if this user is a judge.
    pub fn judge(&self) -> Option<&Judge> {
        match self {
            User::Judge(judge) => Some(judge),
            User::Controller(_) => None,
        }
    }

    /// Mutable judge-specific data, if this user is a judge.
    pub fn judge_mut(&mut self) -> Option<&mut Judge> {
        match self {
            User::Judge(judge) => Some(judge),
            User::Controller(_) => None,
        }
    }

    /// Persisted representation of this user.
    pub fn to_entity(&self, tournament_id: Uuid) -> UserEntity {
        match self {
            User::Controller(controller) => UserEntity {
                id: controller.id,
                tournament_id,
                identity: IdentityEntity::Controller,
                name: None,
                authorised: None,
            },
            User::Judge(judge) => UserEntity {
                id: judge.id,
                tournament_id,
                identity: IdentityEntity::Judge,
                name: Some(judge.name.clone()),
                authorised: Some(judge.authorised),
            },
        }
    }

    /// Rebuild a user from its persisted representation; restored users
    /// start disconnected with an empty undo stack.
    pub fn from_entity(entity: &UserEntity) -> Self {
        match entity.identity {
            IdentityEntity::Controller => User::Controller(Controller {
                id: entity.id,
                connected: false,
            }),
            IdentityEntity::Judge => User::Judge(Judge {
                id: entity.id,
                connected: false,
                name: entity.name.clone().unwrap_or_default(),
                authorised: entity.authorised.unwrap_or(false),
                undo_stack: Vec::new(),
            }),
        }
    }
}

/// One competition area with its judge roster and (at most one) live match.
#[derive(Debug, Clone)]
pub struct Ring {
    /// Stable identifier.
    pub id: Uuid,
    /// Zero-based ring number.
    pub index: usize,
    /// Judge capacity.
    pub slot_count: usize,
    /// Default configuration applied to new matches.
    pub match_config: MatchConfig,
    /// Controller currently assigned, present iff the ring is open.
    pub controller_id: Option<Uuid>,
    /// Judges currently seated, in join order.
    pub judge_ids: Vec<Uuid>,
    /// Match currently owned by this ring, if any.
    pub current_match: Option<Match>,
}

impl Ring {
    /// Whether a controller currently supervises the ring.
    pub fn is_open(&self) -> bool {
        self.controller_id.is_some()
    }

    /// Whether the given judge is seated in this ring.
    pub fn has_judge(&self, judge_id: Uuid) -> bool {
        self.judge_ids.contains(&judge_id)
    }

    /// Match in progress, if one exists and has not ended.
    pub fn match_in_progress(&self) -> Option<&Match> {
        self.current_match.as_ref().filter(|m| m.in_progress())
    }

    /// Persisted representation of this ring.
    pub fn to_entity(&self, tournament_id: Uuid) -> RingEntity {
        RingEntity {
            id: self.id,
            tournament_id,
            index: self.index,
            jp_id: self.controller_id,
            cj_ids: self.judge_ids.clone(),
            slot_count: self.slot_count,
            match_config: self.match_config.clone().into(),
        }
    }

    /// Rebuild a ring from its persisted representation; any in-flight match
    /// is not restored.
    pub fn from_entity(entity: &RingEntity) -> Self {
        Self {
            id: entity.id,
            index: entity.index,
            slot_count: entity.slot_count,
            match_config: entity.match_config.clone().into(),
            controller_id: entity.jp_id,
            judge_ids: entity.cj_ids.clone(),
            current_match: None,
        }
    }
}

/// Root aggregate: one tournament per competition day.
#[derive(Debug, Clone)]
pub struct Tournament {
    /// Stable identifier.
    pub id: Uuid,
    /// Moment the tournament was started.
    pub start_date: SystemTime,
    /// Rings in index order.
    pub rings: Vec<Ring>,
    /// Users indexed by id, insertion order preserved.
    pub users: IndexMap<Uuid, User>,
}

impl Tournament {
    /// Fresh tournament with rings laid out from the application config.
    pub fn bootstrap(config: &AppConfig) -> Self {
        let rings = (0..config.ring_count())
            .map(|index| Ring {
                id: Uuid::new_v4(),
                index,
                slot_count: config.default_slot_count(),
                match_config: config.default_match_config().clone(),
                controller_id: None,
                judge_ids: Vec::new(),
                current_match: None,
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            start_date: SystemTime::now(),
            rings,
            users: IndexMap::new(),
        }
    }

    /// Persisted representation of the tournament root.
    pub fn to_entity(&self) -> TournamentEntity {
        TournamentEntity {
            id: self.id,
            start_date: self.start_date,
        }
    }

    /// Ring by zero-based index.
    pub fn ring(&self, index: usize) -> Option<&Ring> {
        self.rings.get(index)
    }

    /// Mutable ring by zero-based index.
    pub fn ring_mut(&mut self, index: usize) -> Option<&mut Ring> {
        self.rings.get_mut(index)
    }

    /// Index of the ring the user belongs to, either as controller or judge.
    pub fn ring_of(&self, user_id: Uuid) -> Option<usize> {
        self.rings
            .iter()
            .position(|ring| ring.controller_id == Some(user_id) || ring.has_judge(user_id))
    }

    /// User by id.
    pub fn user(&self, id: Uuid) -> Option<&User> {
        self.users.get(&id)
    }

    /// Mutable user by id.
    pub fn user_mut(&mut self, id: Uuid) -> Option<&mut User> {
        self.users.get_mut(&id)
    }
}

impl From<MatchConfig> for MatchConfigEntity {
    fn from(value: MatchConfig) -> Self {
        Self {
            round_time: value.round_time,
            break_time: value.break_time,
            injury_time: value.injury_time,
            two_rounds: value.two_rounds,
        }
    }
}

impl From<MatchConfigEntity> for MatchConfig {
    fn from(value: MatchConfigEntity) -> Self {
        Self {
            round_time: value.round_time,
            break_time: value.break_time,
            injury_time: value.injury_time,
            two_rounds: value.two_rounds,
        }
    }
}

fn sheet_entity(sheet: &ScoringSheet) -> SheetEntity {
    SheetEntity {
        raw: sheet.raw,
        totals: sheet.totals,
        winner: sheet.winner.map(|competitor| competitor.key().to_owned()),
    }
}

fn penalties_entity(penalties: &Penalties) -> PenaltiesEntity {
    PenaltiesEntity {
        warnings: penalties.warnings,
        fouls: penalties.fouls,
    }
}

/// Persisted representation of a match's mutable data.
pub fn match_data_entity(contest: &Match) -> MatchDataEntity {
    MatchDataEntity {
        state: contest.state.key().to_owned(),
        round: contest.round.key().to_owned(),
        period: contest.period.key().to_owned(),
        periods: contest.periods.iter().map(|p| p.key().to_owned()).collect(),
        scoreboards: contest
            .scoreboards
            .iter()
            .map(|(judge_id, board)| {
                (
                    judge_id.to_string(),
                    board
                        .sheets
                        .iter()
                        .map(|(period, sheet)| (period.key().to_owned(), sheet_entity(sheet)))
                        .collect(),
                )
            })
            .collect(),
        penalties: contest
            .penalties
            .iter()
            .map(|(period, penalties)| (period.key().to_owned(), penalties_entity(penalties)))
            .collect(),
        maluses: contest
            .maluses
            .iter()
            .map(|(period, maluses)| (period.key().to_owned(), *maluses))
            .collect(),
        winner: contest.winner.map(|decision| decision.key().to_owned()),
        timers: crate::dao::models::TimersEntity {
            round: contest.timers.round,
            injury: contest.timers.injury,
        },
    }
}

/// Persisted representation of a whole match document.
pub fn match_entity(contest: &Match, ring_id: Uuid) -> MatchEntity {
    MatchEntity {
        id: contest.id,
        ring_id,
        config: contest.config.clone().into(),
        data: match_data_entity(contest),
    }
}

/// Dotted-path patch covering exactly the fields that changed between two
/// snapshots of the same match.
pub fn match_data_diff(before: &Match, after: &Match) -> MatchDataPatch {
    let mut patch = MatchDataPatch::default();

    if before.state != after.state {
        patch.state = Some(after.state.key().to_owned());
    }
    if before.round != after.round {
        patch.round = Some(after.round.key().to_owned());
    }
    if before.period != after.period {
        patch.period = Some(after.period.key().to_owned());
    }
    if before.periods != after.periods {
        patch.periods = Some(after.periods.iter().map(|p| p.key().to_owned()).collect());
    }
    if before.winner != after.winner {
        patch.winner = after.winner.map(|decision| decision.key().to_owned());
    }
    if before.timers != after.timers {
        patch.timers = Some(crate::dao::models::TimersEntity {
            round: after.timers.round,
            injury: after.timers.injury,
        });
    }

    for (judge_id, board) in &after.scoreboards {
        for (period, sheet) in &board.sheets {
            let unchanged = before
                .scoreboards
                .get(judge_id)
                .and_then(|b| b.sheets.get(period))
                .is_some_and(|existing| existing == sheet);
            if !unchanged {
                patch
                    .sheets
                    .push((*judge_id, period.key().to_owned(), sheet_entity(sheet)));
            }
        }
    }

    for (period, penalties) in &after.penalties {
        let unchanged = before
            .penalties
            .get(period)
            .is_some_and(|existing| existing == penalties);
        if !unchanged {
            patch
                .penalties
                .push((period.key().to_owned(), penalties_entity(penalties)));
        }
    }

    for (period, maluses) in &after.maluses {
        let unchanged = before
            .maluses
            .get(period)
            .is_some_and(|existing| existing == maluses);
        if !unchanged {
            patch.maluses.push((period.key().to_owned(), *maluses));
        }
    }

    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::match_machine::MatchEvent;
    use crate::state::scoring::Competitor;

    fn sample_match() -> Match {
        Match::new(MatchConfig {
            round_time: 120,
            break_time: 60,
            injury_time: 120,
            two_rounds: true,
        })
    }

    #[test]
    fn diff_of_identical_snapshots_is_empty() {
        let contest = sample_match();
        assert!(match_data_diff(&contest, &contest.clone()).is_empty());
    }

    #[test]
    fn diff_picks_up_state_and_timer_changes() {
        let before = sample_match();
        let mut after = before.clone();
        after.apply(MatchEvent::StartState).unwrap();
        after.timers.round = 90;

        let patch = match_data_diff(&before, &after);
        assert_eq!(patch.state.as_deref(), Some("round-started"));
        assert_eq!(patch.timers.map(|t| t.round), Some(90));
        assert!(patch.sheets.is_empty());
    }

    #[test]
    fn diff_isolates_the_changed_sheet() {
        let mut before = sample_match();
        let judge_a = Uuid::new_v4();
        let judge_b = Uuid::new_v4();
        before.add_scoreboard(judge_a);
        before.add_scoreboard(judge_b);

        let mut after = before.clone();
        after
            .current_sheet_mut(judge_a)
            .unwrap()
            .mark(Competitor::Hong, 2);

        let patch = match_data_diff(&before, &after);
        assert_eq!(patch.sheets.len(), 1);
        assert_eq!(patch.sheets[0].0, judge_a);
        assert_eq!(patch.sheets[0].2.raw, [2, 0]);
    }

    #[test]
    fn restored_ring_drops_in_flight_match() {
        let tournament_id = Uuid::new_v4();
        let ring = Ring {
            id: Uuid::new_v4(),
            index: 0,
            slot_count: 3,
            match_config: sample_match().config,
            controller_id: Some(Uuid::new_v4()),
            judge_ids: vec![Uuid::new_v4()],
            current_match: Some(sample_match()),
        };

        let restored = Ring::from_entity(&ring.to_entity(tournament_id));
        assert_eq!(restored.controller_id, ring.controller_id);
        assert_eq!(restored.judge_ids, ring.judge_ids);
        assert!(restored.current_match.is_none());
    }

    #[test]
    fn user_round_trips_through_its_entity() {
        let tournament_id = Uuid::new_v4();
        let judge = User::Judge(Judge {
            id: Uuid::new_v4(),
            connected: true,
            name: "north corner".into(),
            authorised: true,
            undo_stack: vec![ScoreEvent {
                competitor: Competitor::Hong,
                points: 2,
            }],
        });

        let restored = User::from_entity(&judge.to_entity(tournament_id));
        let restored_judge = restored.judge().unwrap();
        assert_eq!(restored_judge.id, judge.id());
        assert_eq!(restored_judge.name, "north corner");
        assert!(restored_judge.authorised);
        // Transient connection state never survives a restore.
        assert!(!restored.connected());
        assert!(restored_judge.undo_stack.is_empty());
    }
}
