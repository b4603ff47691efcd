//! Pure scoring computations: sheets, penalties, maluses and winner rules.
//!
//! Nothing in this module performs I/O; the match state machine calls into it
//! and the service layer persists and broadcasts the results.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// One of the two fighters in a match, identified by corner color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Competitor {
    /// The red corner.
    Hong,
    /// The blue corner.
    Chong,
}

impl Competitor {
    /// Both competitors, in tally-array order.
    pub const BOTH: [Competitor; 2] = [Competitor::Hong, Competitor::Chong];

    /// Position of this competitor in per-competitor tally arrays.
    pub fn index(self) -> usize {
        match self {
            Competitor::Hong => 0,
            Competitor::Chong => 1,
        }
    }
}

/// Outcome of a period or of the whole match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// The red corner won.
    Hong,
    /// The blue corner won.
    Chong,
    /// Neither competitor prevailed.
    Draw,
}

impl Decision {
    /// Build a decision from an optional winning competitor (`None` is a draw).
    pub fn from_vote(vote: Option<Competitor>) -> Self {
        match vote {
            Some(Competitor::Hong) => Decision::Hong,
            Some(Competitor::Chong) => Decision::Chong,
            None => Decision::Draw,
        }
    }

    /// Stable string key used in persisted documents.
    pub fn key(self) -> &'static str {
        match self {
            Decision::Hong => "hong",
            Decision::Chong => "chong",
            Decision::Draw => "draw",
        }
    }
}

impl Competitor {
    /// Stable string key used in persisted documents.
    pub fn key(self) -> &'static str {
        match self {
            Competitor::Hong => "hong",
            Competitor::Chong => "chong",
        }
    }
}

/// Penalty categories tracked per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyKind {
    /// Minor infraction; three warnings cost one point.
    Warning,
    /// Major infraction; each foul costs one point.
    Foul,
}

/// Error returned when a penalty decrement would drive a cell negative.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?} count for {competitor:?} is already zero")]
pub struct PenaltyUnderflow {
    /// Penalty category of the rejected adjustment.
    pub kind: PenaltyKind,
    /// Competitor whose cell was targeted.
    pub competitor: Competitor,
}

/// Per-period penalty tallies for both competitors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Penalties {
    /// Warning counts indexed by [`Competitor::index`].
    pub warnings: [u32; 2],
    /// Foul counts indexed by [`Competitor::index`].
    pub fouls: [u32; 2],
}

impl Penalties {
    /// Fresh tally with every cell at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a signed single-step adjustment to one penalty cell.
    ///
    /// Decrementing a zero cell is rejected without mutating anything.
    /// Returns the new cell value.
    pub fn adjust(
        &mut self,
        kind: PenaltyKind,
        competitor: Competitor,
        increment: bool,
    ) -> Result<u32, PenaltyUnderflow> {
        let cell = match kind {
            PenaltyKind::Warning => &mut self.warnings[competitor.index()],
            PenaltyKind::Foul => &mut self.fouls[competitor.index()],
        };

        if increment {
            *cell += 1;
        } else if *cell == 0 {
            return Err(PenaltyUnderflow { kind, competitor });
        } else {
            *cell -= 1;
        }

        Ok(*cell)
    }

    /// Score deductions implied by the current tallies.
    ///
    /// Warnings accrue in multiples of three before costing a point; fouls
    /// cost one point each.
    pub fn maluses(&self) -> [i32; 2] {
        let mut maluses = [0i32; 2];
        for competitor in Competitor::BOTH {
            let i = competitor.index();
            maluses[i] = -((self.warnings[i] / 3) as i32 + self.fouls[i] as i32);
        }
        maluses
    }
}

/// A score as applied by one judge, kept on the judge's undo stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEvent {
    /// Competitor the points were awarded to.
    pub competitor: Competitor,
    /// Points awarded (always positive on the stack; undo negates them).
    pub points: i32,
}

/// One judge's score sheet for a single period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringSheet {
    /// Raw points marked so far, indexed by [`Competitor::index`].
    pub raw: [i32; 2],
    /// Totals (raw + malus), populated exactly once when the period ends.
    pub totals: Option<[i32; 2]>,
    /// Period winner according to this judge; meaningful once finalized.
    pub winner: Option<Competitor>,
}

impl ScoringSheet {
    /// Empty sheet at the start of a period.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signed delta to one competitor's raw tally.
    pub fn mark(&mut self, competitor: Competitor, points: i32) {
        self.raw[competitor.index()] += points;
    }

    /// Whether totals have already been computed for this sheet.
    pub fn is_final(&self) -> bool {
        self.totals.is_some()
    }

    /// Compute totals and the period winner for this sheet.
    ///
    /// Idempotent: a sheet that is already final keeps its first result.
    pub fn finalize(&mut self, maluses: [i32; 2]) -> Option<Competitor> {
        if self.is_final() {
            return self.winner;
        }

        let totals = [self.raw[0] + maluses[0], self.raw[1] + maluses[1]];
        self.winner = if totals[0] > totals[1] {
            Some(Competitor::Hong)
        } else if totals[1] > totals[0] {
            Some(Competitor::Chong)
        } else {
            None
        };
        self.totals = Some(totals);
        self.winner
    }
}

/// Combine per-judge period verdicts into an overall decision.
///
/// Each judge contributes +1 for hong, -1 for chong, 0 for a tie. With more
/// than two judges, a strict majority of ties forces an overall draw
/// regardless of how the remaining judges split.
pub fn overall_winner(votes: &[Option<Competitor>]) -> Option<Competitor> {
    let judges = votes.len();
    let ties = votes.iter().filter(|vote| vote.is_none()).count();
    if judges > 2 && ties > judges / 2 {
        return None;
    }

    let net: i32 = votes
        .iter()
        .map(|vote| match vote {
            Some(Competitor::Hong) => 1,
            Some(Competitor::Chong) => -1,
            None => 0,
        })
        .sum();

    match net {
        n if n > 0 => Some(Competitor::Hong),
        n if n < 0 => Some(Competitor::Chong),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penalty_decrement_at_zero_is_rejected() {
        let mut penalties = Penalties::new();
        let err = penalties
            .adjust(PenaltyKind::Foul, Competitor::Hong, false)
            .unwrap_err();
        assert_eq!(
            err,
            PenaltyUnderflow {
                kind: PenaltyKind::Foul,
                competitor: Competitor::Hong
            }
        );
        assert_eq!(penalties, Penalties::new());
    }

    #[test]
    fn penalty_cells_never_go_negative() {
        let mut penalties = Penalties::new();
        penalties
            .adjust(PenaltyKind::Warning, Competitor::Chong, true)
            .unwrap();
        penalties
            .adjust(PenaltyKind::Warning, Competitor::Chong, false)
            .unwrap();
        assert!(
            penalties
                .adjust(PenaltyKind::Warning, Competitor::Chong, false)
                .is_err()
        );
        assert_eq!(penalties.warnings[Competitor::Chong.index()], 0);
    }

    #[test]
    fn maluses_floor_warnings_by_three() {
        let penalties = Penalties {
            warnings: [3, 5],
            fouls: [0, 0],
        };
        assert_eq!(penalties.maluses(), [-1, -1]);

        let penalties = Penalties {
            warnings: [3, 5],
            fouls: [1, 0],
        };
        assert_eq!(penalties.maluses(), [-2, -1]);
    }

    #[test]
    fn sheet_totals_include_maluses() {
        let mut sheet = ScoringSheet::new();
        sheet.mark(Competitor::Hong, 4);
        sheet.mark(Competitor::Chong, 5);

        let winner = sheet.finalize([0, -2]);
        assert_eq!(sheet.totals, Some([4, 3]));
        assert_eq!(winner, Some(Competitor::Hong));
    }

    #[test]
    fn sheet_finalize_is_idempotent() {
        let mut sheet = ScoringSheet::new();
        sheet.mark(Competitor::Hong, 2);
        let first = sheet.finalize([0, 0]);
        sheet.mark(Competitor::Chong, 10);
        assert_eq!(sheet.finalize([-5, -5]), first);
        assert_eq!(sheet.totals, Some([2, 0]));
    }

    #[test]
    fn mark_then_negate_restores_raw_total() {
        let mut sheet = ScoringSheet::new();
        sheet.mark(Competitor::Chong, 3);
        sheet.mark(Competitor::Chong, -3);
        assert_eq!(sheet.raw, [0, 0]);
    }

    #[test]
    fn overall_winner_counts_votes() {
        use Competitor::{Chong, Hong};

        assert_eq!(
            overall_winner(&[Some(Hong), Some(Hong), Some(Chong)]),
            Some(Hong)
        );
        assert_eq!(overall_winner(&[Some(Hong), Some(Chong), None]), None);
    }

    #[test]
    fn majority_of_ties_forces_a_draw() {
        use Competitor::{Chong, Hong};

        // Five judges, three ties: draw even though the remaining two split 2-0.
        assert_eq!(
            overall_winner(&[None, None, None, Some(Hong), Some(Hong)]),
            None
        );
        // Two judges are exempt from the majority-draw rule.
        assert_eq!(overall_winner(&[None, Some(Chong)]), Some(Chong));
    }
}
