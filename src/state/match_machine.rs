//! Match lifecycle state machine.
//!
//! Transitions are validated against an explicit table in
//! [`Match::apply`]; entry side effects (timer resets, round/period
//! advancement, sheet allocation) happen in the same call so callers always
//! observe a consistent snapshot. Cascading transitions (auto-advance after
//! `round-ended` and `break-ended`) are planned here but fired by the
//! coordinator on a deferred tick.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::state::scoring::{self, Competitor, Decision, Penalties, ScoringSheet};

/// Timing and format values snapshotted from the ring configuration when a
/// match is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Length of a main round, in seconds.
    pub round_time: u32,
    /// Length of a break between rounds, in seconds.
    pub break_time: u32,
    /// Injury clock allowance, in seconds.
    pub injury_time: u32,
    /// Whether the match plays two main rounds before any tie-break.
    pub two_rounds: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            round_time: 120,
            break_time: 60,
            injury_time: 120,
            two_rounds: true,
        }
    }
}

/// Lifecycle states of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchState {
    /// Waiting for the controller to start the round.
    RoundIdle,
    /// Round clock running; scoring is open.
    RoundStarted,
    /// Round over; auto-advance decides what comes next.
    RoundEnded,
    /// Waiting for the controller to start the break.
    BreakIdle,
    /// Break clock running.
    BreakStarted,
    /// Break over; the next round is queued.
    BreakEnded,
    /// Injury timeout; the round clock is paused.
    Injury,
    /// Waiting for a human decision: continue to a tie-break or end in a draw.
    Results,
    /// Terminal state; the match is immutable from here on.
    MatchEnded,
}

impl MatchState {
    /// Stable string key used in persisted documents.
    pub fn key(self) -> &'static str {
        match self {
            MatchState::RoundIdle => "round-idle",
            MatchState::RoundStarted => "round-started",
            MatchState::RoundEnded => "round-ended",
            MatchState::BreakIdle => "break-idle",
            MatchState::BreakStarted => "break-started",
            MatchState::BreakEnded => "break-ended",
            MatchState::Injury => "injury",
            MatchState::Results => "results",
            MatchState::MatchEnded => "match-ended",
        }
    }
}

/// Events that can be applied to the match state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchEvent {
    /// Start the pending round or break.
    StartState,
    /// End the running round or break.
    EndState,
    /// Enter or leave the injury timeout.
    ToggleInjury,
    /// Queue the next round after a break (auto-fired).
    NextRound,
    /// Move to a break (auto-fired after round 1, or from results).
    Break,
    /// Ask the controller to decide on a tied period (auto-fired).
    Results,
    /// End the match.
    End,
}

impl MatchEvent {
    /// Stable string key used in notifications.
    pub fn key(self) -> &'static str {
        match self {
            MatchEvent::StartState => "start-state",
            MatchEvent::EndState => "end-state",
            MatchEvent::ToggleInjury => "toggle-injury",
            MatchEvent::NextRound => "next-round",
            MatchEvent::Break => "break",
            MatchEvent::Results => "results",
            MatchEvent::End => "end",
        }
    }
}

/// Rounds a match progresses through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Round {
    /// First main round.
    Round1,
    /// Second main round (skipped when configured for one round).
    Round2,
    /// First tie-break round.
    TieBreaker,
    /// Sudden-death round; first point wins, clock starts at zero.
    GoldenPoint,
}

impl Round {
    /// Stable string key used in persisted documents.
    pub fn key(self) -> &'static str {
        match self {
            Round::Round1 => "round-1",
            Round::Round2 => "round-2",
            Round::TieBreaker => "tie-breaker",
            Round::GoldenPoint => "golden-point",
        }
    }
}

/// Scoring phases; each gets its own sheets and penalty tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Period {
    /// The main rounds (one or two, per configuration).
    MainRounds,
    /// The tie-break round.
    TieBreaker,
    /// The golden-point round.
    GoldenPoint,
}

impl Period {
    /// Stable string key used for persisted per-period maps.
    pub fn key(self) -> &'static str {
        match self {
            Period::MainRounds => "main-rounds",
            Period::TieBreaker => "tie-breaker",
            Period::GoldenPoint => "golden-point",
        }
    }

}

/// Error returned when attempting an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// State the machine was in when the event was received.
    pub from: MatchState,
    /// Event that cannot be applied from that state.
    pub event: MatchEvent,
}

/// A transition that was applied successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Event that triggered the transition.
    pub event: MatchEvent,
    /// State before the transition.
    pub from: MatchState,
    /// State after the transition.
    pub to: MatchState,
}

/// Snapshot values of the match clocks, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timers {
    /// Round (or break) clock.
    pub round: u32,
    /// Injury clock.
    pub injury: u32,
}

/// One judge's full set of per-period scoring sheets for a match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scoreboard {
    /// Sheets keyed by the period they score.
    pub sheets: BTreeMap<Period, ScoringSheet>,
}

impl Scoreboard {
    /// Scoreboard with an empty sheet for the given period.
    pub fn for_period(period: Period) -> Self {
        let mut sheets = BTreeMap::new();
        sheets.insert(period, ScoringSheet::new());
        Self { sheets }
    }
}

/// One scoring contest within a ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Stable identifier of the match.
    pub id: Uuid,
    /// Configuration snapshotted at creation time.
    pub config: MatchConfig,
    /// Current lifecycle state.
    pub state: MatchState,
    /// Current round.
    pub round: Round,
    /// Current scoring period.
    pub period: Period,
    /// Periods entered so far, in order.
    pub periods: Vec<Period>,
    /// Per-judge scoreboards, keyed by judge id, insertion order preserved.
    pub scoreboards: IndexMap<Uuid, Scoreboard>,
    /// Per-period penalty tallies.
    pub penalties: BTreeMap<Period, Penalties>,
    /// Per-period maluses, recorded when a period is finalized.
    pub maluses: BTreeMap<Period, [i32; 2]>,
    /// Declared outcome, set when the match ends.
    pub winner: Option<Decision>,
    /// Clock snapshots.
    pub timers: Timers,
}

impl Match {
    /// Create a match in `round-idle` with clocks reset from the config.
    pub fn new(config: MatchConfig) -> Self {
        let timers = Timers {
            round: config.round_time,
            injury: config.injury_time,
        };
        let mut penalties = BTreeMap::new();
        penalties.insert(Period::MainRounds, Penalties::new());

        Self {
            id: Uuid::new_v4(),
            config,
            state: MatchState::RoundIdle,
            round: Round::Round1,
            period: Period::MainRounds,
            periods: vec![Period::MainRounds],
            scoreboards: IndexMap::new(),
            penalties,
            maluses: BTreeMap::new(),
            winner: None,
            timers,
        }
    }

    /// Whether the match has not yet reached its terminal state.
    pub fn in_progress(&self) -> bool {
        self.state != MatchState::MatchEnded
    }

    /// Whether score/undo commands are currently accepted.
    pub fn scoring_open(&self) -> bool {
        self.state == MatchState::RoundStarted
    }

    /// Whether penalty adjustments are currently accepted.
    pub fn penalties_open(&self) -> bool {
        matches!(self.state, MatchState::RoundStarted | MatchState::Injury)
    }

    /// Lazily allocate a scoreboard for a judge, with a sheet for the
    /// current period.
    pub fn add_scoreboard(&mut self, judge_id: Uuid) {
        self.scoreboards
            .entry(judge_id)
            .or_insert_with(|| Scoreboard::for_period(self.period));
    }

    /// Mutable access to a judge's sheet for the current period.
    pub fn current_sheet_mut(&mut self, judge_id: Uuid) -> Option<&mut ScoringSheet> {
        let period = self.period;
        self.scoreboards
            .get_mut(&judge_id)?
            .sheets
            .get_mut(&period)
    }

    /// Penalty tally for the current period.
    pub fn current_penalties_mut(&mut self) -> &mut Penalties {
        self.penalties.entry(self.period).or_default()
    }

    /// Validate and apply a transition, running entry side effects.
    pub fn apply(&mut self, event: MatchEvent) -> Result<Transition, InvalidTransition> {
        use MatchEvent as E;
        use MatchState as S;

        let from = self.state;
        let to = match (from, event) {
            (S::RoundIdle, E::StartState) => S::RoundStarted,
            (S::BreakIdle, E::StartState) => S::BreakStarted,
            (S::RoundStarted, E::EndState) => S::RoundEnded,
            (S::BreakStarted, E::EndState) => S::BreakEnded,
            (S::RoundStarted, E::ToggleInjury) => S::Injury,
            (S::Injury, E::ToggleInjury) => S::RoundStarted,
            (S::BreakEnded, E::NextRound) => S::RoundIdle,
            (S::RoundEnded | S::Results, E::Break) => S::BreakIdle,
            (S::RoundEnded, E::Results) => S::Results,
            (S::RoundEnded | S::Results, E::End) => S::MatchEnded,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        self.state = to;
        self.enter(to, event);
        Ok(Transition { event, from, to })
    }

    /// Entry side effects for the state just entered.
    fn enter(&mut self, to: MatchState, event: MatchEvent) {
        match to {
            MatchState::RoundIdle => {
                if event == MatchEvent::NextRound {
                    self.advance_round();
                }
                self.timers.round = if self.round == Round::GoldenPoint {
                    0
                } else {
                    self.config.round_time
                };
            }
            MatchState::BreakIdle => {
                self.timers.round = self.config.break_time;
            }
            MatchState::Injury => {
                self.timers.injury = self.config.injury_time;
            }
            MatchState::MatchEnded => {
                // An end fired before the deferred cascade still settles the
                // elapsed period; finalize is idempotent, so the results path
                // keeps its earlier draw.
                if self.winner.is_none() {
                    self.winner = Some(self.finalize_period());
                }
            }
            _ => {}
        }
    }

    fn advance_round(&mut self) {
        self.round = match self.round {
            Round::Round1 if self.config.two_rounds => Round::Round2,
            Round::Round1 | Round::Round2 => Round::TieBreaker,
            Round::TieBreaker | Round::GoldenPoint => Round::GoldenPoint,
        };

        let period = match self.round {
            Round::Round1 | Round::Round2 => Period::MainRounds,
            Round::TieBreaker => Period::TieBreaker,
            Round::GoldenPoint => Period::GoldenPoint,
        };
        if period != self.period {
            self.enter_period(period);
        }
    }

    /// Advance into a new period: fresh sheets for every judge and a fresh
    /// penalty tally.
    fn enter_period(&mut self, period: Period) {
        self.period = period;
        self.periods.push(period);
        self.penalties.insert(period, Penalties::new());
        for board in self.scoreboards.values_mut() {
            board.sheets.entry(period).or_insert_with(ScoringSheet::new);
        }
    }

    /// Finalize every judge's sheet for the current period and derive the
    /// period outcome.
    pub fn finalize_period(&mut self) -> Decision {
        let period = self.period;
        let maluses = self
            .penalties
            .get(&period)
            .map(Penalties::maluses)
            .unwrap_or([0, 0]);
        self.maluses.insert(period, maluses);

        let votes: Vec<Option<Competitor>> = self
            .scoreboards
            .values_mut()
            .filter_map(|board| board.sheets.get_mut(&period))
            .map(|sheet| sheet.finalize(maluses))
            .collect();

        Decision::from_vote(scoring::overall_winner(&votes))
    }

    /// Decide which event should follow `round-ended`.
    ///
    /// Called by the coordinator on a deferred tick so the `round-ended`
    /// notification finishes before any cascade. Finalizes the elapsed
    /// period when the outcome matters, and records the winner when the
    /// decision ends the match.
    pub fn auto_advance(&mut self) -> Option<MatchEvent> {
        if self.state != MatchState::RoundEnded {
            return None;
        }

        if self.round == Round::Round1 && self.config.two_rounds {
            return Some(MatchEvent::Break);
        }

        let decision = self.finalize_period();
        if decision != Decision::Draw || self.round == Round::GoldenPoint {
            self.winner = Some(decision);
            Some(MatchEvent::End)
        } else {
            Some(MatchEvent::Results)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(two_rounds: bool) -> MatchConfig {
        MatchConfig {
            round_time: 120,
            break_time: 60,
            injury_time: 120,
            two_rounds,
        }
    }

    fn judge() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn new_match_is_round_idle_with_reset_clocks() {
        let m = Match::new(config(true));
        assert_eq!(m.state, MatchState::RoundIdle);
        assert_eq!(m.round, Round::Round1);
        assert_eq!(m.period, Period::MainRounds);
        assert_eq!(m.timers.round, 120);
        assert_eq!(m.timers.injury, 120);
    }

    #[test]
    fn invalid_transition_is_rejected_without_mutation() {
        let mut m = Match::new(config(true));
        let err = m.apply(MatchEvent::EndState).unwrap_err();
        assert_eq!(err.from, MatchState::RoundIdle);
        assert_eq!(err.event, MatchEvent::EndState);
        assert_eq!(m.state, MatchState::RoundIdle);
    }

    #[test]
    fn injury_toggles_back_and_resets_injury_clock() {
        let mut m = Match::new(config(true));
        m.apply(MatchEvent::StartState).unwrap();
        m.timers.injury = 7;

        m.apply(MatchEvent::ToggleInjury).unwrap();
        assert_eq!(m.state, MatchState::Injury);
        assert_eq!(m.timers.injury, 120);

        m.apply(MatchEvent::ToggleInjury).unwrap();
        assert_eq!(m.state, MatchState::RoundStarted);
    }

    #[test]
    fn round_one_of_two_round_match_auto_advances_to_break() {
        let mut m = Match::new(config(true));
        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();

        assert_eq!(m.auto_advance(), Some(MatchEvent::Break));
        m.apply(MatchEvent::Break).unwrap();
        assert_eq!(m.state, MatchState::BreakIdle);
        assert_eq!(m.timers.round, 60);
    }

    #[test]
    fn break_then_next_round_resets_the_round_clock() {
        let mut m = Match::new(config(true));
        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();
        m.apply(MatchEvent::Break).unwrap();
        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();
        m.apply(MatchEvent::NextRound).unwrap();

        assert_eq!(m.state, MatchState::RoundIdle);
        assert_eq!(m.round, Round::Round2);
        assert_eq!(m.period, Period::MainRounds);
        assert_eq!(m.timers.round, 120);
    }

    #[test]
    fn decided_round_auto_advances_to_end() {
        let mut m = Match::new(config(false));
        let j = judge();
        m.add_scoreboard(j);
        m.apply(MatchEvent::StartState).unwrap();
        m.current_sheet_mut(j).unwrap().mark(Competitor::Hong, 3);
        m.apply(MatchEvent::EndState).unwrap();

        assert_eq!(m.auto_advance(), Some(MatchEvent::End));
        m.apply(MatchEvent::End).unwrap();
        assert_eq!(m.winner, Some(Decision::Hong));
        assert!(!m.in_progress());
    }

    #[test]
    fn tied_round_auto_advances_to_results() {
        let mut m = Match::new(config(false));
        m.add_scoreboard(judge());
        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();

        assert_eq!(m.auto_advance(), Some(MatchEvent::Results));
        m.apply(MatchEvent::Results).unwrap();
        assert_eq!(m.state, MatchState::Results);
        assert_eq!(m.winner, None);
    }

    #[test]
    fn golden_point_never_goes_to_results() {
        let mut m = Match::new(config(false));
        m.add_scoreboard(judge());

        // Round 1 tied, continue through tie-breaker to golden point.
        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();
        m.apply(MatchEvent::Results).unwrap();
        m.apply(MatchEvent::Break).unwrap();
        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();
        m.apply(MatchEvent::NextRound).unwrap();
        assert_eq!(m.round, Round::TieBreaker);
        assert_eq!(m.period, Period::TieBreaker);

        // Tie-breaker tied as well.
        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();
        assert_eq!(m.auto_advance(), Some(MatchEvent::Results));
        m.apply(MatchEvent::Results).unwrap();
        m.apply(MatchEvent::Break).unwrap();
        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();
        m.apply(MatchEvent::NextRound).unwrap();
        assert_eq!(m.round, Round::GoldenPoint);
        assert_eq!(m.timers.round, 0);

        // Golden point ends the match even on a tie.
        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();
        assert_eq!(m.auto_advance(), Some(MatchEvent::End));
        m.apply(MatchEvent::End).unwrap();
        assert_eq!(m.winner, Some(Decision::Draw));
    }

    #[test]
    fn manual_end_finalizes_the_elapsed_period() {
        let mut m = Match::new(config(false));
        let j = judge();
        m.add_scoreboard(j);
        m.apply(MatchEvent::StartState).unwrap();
        m.current_sheet_mut(j).unwrap().mark(Competitor::Hong, 5);
        m.apply(MatchEvent::EndState).unwrap();

        // The controller ends the match before the deferred cascade runs.
        m.apply(MatchEvent::End).unwrap();
        assert_eq!(m.winner, Some(Decision::Hong));
        let sheet = &m.scoreboards.get(&j).unwrap().sheets[&Period::MainRounds];
        assert!(sheet.is_final());
        assert_eq!(sheet.totals, Some([5, 0]));
    }

    #[test]
    fn ending_from_results_stays_a_draw() {
        let mut m = Match::new(config(false));
        m.add_scoreboard(judge());
        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();
        assert_eq!(m.auto_advance(), Some(MatchEvent::Results));
        m.apply(MatchEvent::Results).unwrap();

        m.apply(MatchEvent::End).unwrap();
        assert_eq!(m.winner, Some(Decision::Draw));
    }

    #[test]
    fn entering_a_new_period_allocates_sheets_and_penalties() {
        let mut m = Match::new(config(false));
        let j = judge();
        m.add_scoreboard(j);
        m.current_penalties_mut()
            .adjust(crate::state::scoring::PenaltyKind::Warning, Competitor::Hong, true)
            .unwrap();

        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();
        m.apply(MatchEvent::Results).unwrap();
        m.apply(MatchEvent::Break).unwrap();
        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();
        m.apply(MatchEvent::NextRound).unwrap();

        assert_eq!(m.periods, vec![Period::MainRounds, Period::TieBreaker]);
        let board = m.scoreboards.get(&j).unwrap();
        assert!(board.sheets.contains_key(&Period::TieBreaker));
        assert_eq!(
            m.penalties.get(&Period::TieBreaker),
            Some(&Penalties::new())
        );
        // The previous period's tally is untouched.
        assert_eq!(
            m.penalties.get(&Period::MainRounds).unwrap().warnings,
            [1, 0]
        );
    }

    #[test]
    fn one_round_match_skips_round_two() {
        let mut m = Match::new(config(false));
        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();
        m.apply(MatchEvent::Results).unwrap();
        m.apply(MatchEvent::Break).unwrap();
        m.apply(MatchEvent::StartState).unwrap();
        m.apply(MatchEvent::EndState).unwrap();
        m.apply(MatchEvent::NextRound).unwrap();
        assert_eq!(m.round, Round::TieBreaker);
    }

    #[test]
    fn lazily_added_scoreboard_gets_current_period_sheet() {
        let mut m = Match::new(config(true));
        let j = judge();
        m.add_scoreboard(j);
        assert!(
            m.scoreboards
                .get(&j)
                .unwrap()
                .sheets
                .contains_key(&Period::MainRounds)
        );
    }
}
