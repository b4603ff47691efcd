//! Storage-facing entity documents.
//!
//! Entities mirror the runtime model but stay independent of it; conversions
//! live next to the runtime types in [`crate::state::tournament`]. Enum-like
//! fields are persisted as their stable string keys (`"round-idle"`,
//! `"hong"`, `"main-rounds"`) so documents stay readable and per-period maps
//! can use them as keys.

use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role persisted for a user document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityEntity {
    /// Supervises a ring (source nomenclature: jury president).
    Controller,
    /// Scores matches in a ring (source nomenclature: corner judge).
    Judge,
}

/// Root aggregate document, one per competition day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentEntity {
    /// Stable identifier.
    pub id: Uuid,
    /// Moment the tournament was started.
    pub start_date: SystemTime,
}

/// Durable identity of a connected (or previously connected) participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntity {
    /// Stable identifier, reissued to the client for reconnection.
    pub id: Uuid,
    /// Tournament this user belongs to.
    pub tournament_id: Uuid,
    /// Role of the user.
    pub identity: IdentityEntity,
    /// Display name (judges only).
    pub name: Option<String>,
    /// Whether the ring controller approved this judge (judges only).
    pub authorised: Option<bool>,
}

/// Match configuration values snapshotted per ring and per match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfigEntity {
    /// Round length in seconds.
    pub round_time: u32,
    /// Break length in seconds.
    pub break_time: u32,
    /// Injury allowance in seconds.
    pub injury_time: u32,
    /// Whether two main rounds are played.
    pub two_rounds: bool,
}

/// One competition area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingEntity {
    /// Stable identifier.
    pub id: Uuid,
    /// Tournament this ring belongs to.
    pub tournament_id: Uuid,
    /// Zero-based ring number.
    pub index: usize,
    /// Controller currently assigned, if the ring is open.
    pub jp_id: Option<Uuid>,
    /// Judges currently seated, in join order.
    pub cj_ids: Vec<Uuid>,
    /// Judge capacity.
    pub slot_count: usize,
    /// Default configuration applied to new matches.
    pub match_config: MatchConfigEntity,
}

/// Clock snapshot values, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimersEntity {
    /// Round (or break) clock.
    pub round: u32,
    /// Injury clock.
    pub injury: u32,
}

/// Penalty tallies for one period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltiesEntity {
    /// Warnings per competitor.
    pub warnings: [u32; 2],
    /// Fouls per competitor.
    pub fouls: [u32; 2],
}

/// One judge's sheet for one period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetEntity {
    /// Raw points per competitor.
    pub raw: [i32; 2],
    /// Totals (raw + malus), present once the period is finalized.
    pub totals: Option<[i32; 2]>,
    /// Period winner per this judge ("hong"/"chong"), absent on a tie or
    /// before finalization.
    pub winner: Option<String>,
}

/// Mutable portion of a match document, patched with dotted paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchDataEntity {
    /// Lifecycle state key (e.g. `"round-started"`).
    pub state: String,
    /// Current round key (e.g. `"round-1"`).
    pub round: String,
    /// Current period key (e.g. `"main-rounds"`).
    pub period: String,
    /// Period keys entered so far, in order.
    pub periods: Vec<String>,
    /// Sheets keyed by judge id, then period key.
    pub scoreboards: HashMap<String, BTreeMap<String, SheetEntity>>,
    /// Penalty tallies keyed by period key.
    pub penalties: BTreeMap<String, PenaltiesEntity>,
    /// Maluses keyed by period key.
    pub maluses: BTreeMap<String, [i32; 2]>,
    /// Declared outcome ("hong"/"chong"/"draw"), absent while in progress.
    pub winner: Option<String>,
    /// Clock snapshots.
    pub timers: TimersEntity,
}

/// One scoring contest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEntity {
    /// Stable identifier.
    pub id: Uuid,
    /// Ring the match is fought in.
    pub ring_id: Uuid,
    /// Configuration snapshotted at creation.
    pub config: MatchConfigEntity,
    /// Mutable match data.
    pub data: MatchDataEntity,
}

/// Partial update of a match document's `data` sub-tree.
///
/// Every populated field becomes a dotted-path `$set` entry so concurrent
/// concerns (state, one judge's sheet, one period's penalties) merge instead
/// of replacing the whole document.
#[derive(Debug, Clone, Default)]
pub struct MatchDataPatch {
    /// New lifecycle state key.
    pub state: Option<String>,
    /// New round key.
    pub round: Option<String>,
    /// New period key.
    pub period: Option<String>,
    /// New entered-periods list.
    pub periods: Option<Vec<String>>,
    /// Newly declared outcome.
    pub winner: Option<String>,
    /// New clock snapshots.
    pub timers: Option<TimersEntity>,
    /// Changed sheets: (judge id, period key, sheet).
    pub sheets: Vec<(Uuid, String, SheetEntity)>,
    /// Changed penalty tallies: (period key, tally).
    pub penalties: Vec<(String, PenaltiesEntity)>,
    /// Changed maluses: (period key, values).
    pub maluses: Vec<(String, [i32; 2])>,
}

impl MatchDataPatch {
    /// Whether the patch carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.round.is_none()
            && self.period.is_none()
            && self.periods.is_none()
            && self.winner.is_none()
            && self.timers.is_none()
            && self.sheets.is_empty()
            && self.penalties.is_empty()
            && self.maluses.is_empty()
    }
}
