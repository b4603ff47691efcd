//! WebSocket protocol messages: client commands and server notifications.
//!
//! Both directions use an `{"event": ..., "data": ...}` envelope; command and
//! event names are camelCase.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::projection::{
    ControllerRingView, JudgeRingView, JudgeSheetsView, JudgeView, MatchConfigView, MatchView,
    RingStateView, TimersView,
};
use crate::state::scoring::{Competitor, PenaltyKind};

/// Role a connection claims at identification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleClaim {
    Controller,
    Judge,
}

/// Identification handshake payload.
///
/// For controllers `value` carries the shared secret; for judges it carries
/// the display name.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct IdentificationPayload {
    pub identity: RoleClaim,
    pub value: String,
}

/// Value carried by a `setConfigItem` command.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
#[serde(untagged)]
pub enum ConfigValue {
    Flag(bool),
    Step(i64),
}

/// Clocks a controller can report values for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TimerKind {
    Round,
    Injury,
}

/// Messages accepted from client WebSocket connections.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientCommand {
    Identification(IdentificationPayload),
    SelectRing { index: usize },
    AddSlot,
    RemoveSlot,
    #[serde(rename = "authoriseCJ")]
    AuthoriseCj { id: Uuid },
    #[serde(rename = "rejectCJ")]
    RejectCj { id: Uuid },
    #[serde(rename = "removeCJ")]
    RemoveCj { id: Uuid },
    SetConfigItem { name: String, value: ConfigValue },
    CreateMatch,
    ContinueMatch,
    EndMatch,
    StartMatchState,
    EndMatchState,
    ToggleInjury,
    IncrementPenalty {
        #[serde(rename = "type")]
        kind: PenaltyKind,
        competitor: Competitor,
    },
    DecrementPenalty {
        #[serde(rename = "type")]
        kind: PenaltyKind,
        competitor: Competitor,
    },
    SaveTimerValue { name: TimerKind, value: u32 },
    Score { competitor: Competitor, points: i32 },
    Undo,
    CancelJoin,
    #[serde(other)]
    Unknown,
}

impl ClientCommand {
    /// Wire name of the command, echoed back in rejections.
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::Identification(_) => "identification",
            ClientCommand::SelectRing { .. } => "selectRing",
            ClientCommand::AddSlot => "addSlot",
            ClientCommand::RemoveSlot => "removeSlot",
            ClientCommand::AuthoriseCj { .. } => "authoriseCJ",
            ClientCommand::RejectCj { .. } => "rejectCJ",
            ClientCommand::RemoveCj { .. } => "removeCJ",
            ClientCommand::SetConfigItem { .. } => "setConfigItem",
            ClientCommand::CreateMatch => "createMatch",
            ClientCommand::ContinueMatch => "continueMatch",
            ClientCommand::EndMatch => "endMatch",
            ClientCommand::StartMatchState => "startMatchState",
            ClientCommand::EndMatchState => "endMatchState",
            ClientCommand::ToggleInjury => "toggleInjury",
            ClientCommand::IncrementPenalty { .. } => "incrementPenalty",
            ClientCommand::DecrementPenalty { .. } => "decrementPenalty",
            ClientCommand::SaveTimerValue { .. } => "saveTimerValue",
            ClientCommand::Score { .. } => "score",
            ClientCommand::Undo => "undo",
            ClientCommand::CancelJoin => "cancelJoin",
            ClientCommand::Unknown => "unknown",
        }
    }
}

/// Notifications pushed to client WebSocket connections.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    RequestIdentification { message: String },
    Identified { id: Uuid, role: RoleClaim },
    SessionConflict { message: String },
    RingStates { rings: Vec<RingStateView> },
    RingOpened { ring: ControllerRingView },
    RingJoined { ring: JudgeRingView },
    RingLeft { message: String },
    Rejected { message: String },
    AuthorisationPending,
    SlotsUpdated {
        #[serde(rename = "slotCount")]
        slot_count: usize,
        judges: Vec<JudgeView>,
    },
    ConfigUpdated { config: MatchConfigView },
    MatchCreated {
        #[serde(rename = "match")]
        contest: MatchView,
    },
    MatchStateChanged {
        transition: String,
        from: Option<String>,
        to: String,
        round: String,
        period: String,
        timers: TimersView,
        winner: Option<String>,
    },
    MatchScoresUpdated {
        period: String,
        scoreboards: Vec<JudgeSheetsView>,
    },
    PenaltiesUpdated {
        period: String,
        warnings: [u32; 2],
        fouls: [u32; 2],
        maluses: [i32; 2],
    },
    Scored {
        competitor: Competitor,
        points: i32,
        total: i32,
    },
    Undid {
        competitor: Competitor,
        points: i32,
        total: i32,
    },
    JpConnectionStateChanged { connected: bool },
    CjConnectionStateChanged { id: Uuid, connected: bool },
    CommandRejected { command: String, message: String },
    OperationFailed { command: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_parse_from_the_event_data_envelope() {
        let cmd: ClientCommand = serde_json::from_value(json!({
            "event": "identification",
            "data": {"identity": "judge", "value": "north corner"}
        }))
        .unwrap();
        assert!(matches!(
            cmd,
            ClientCommand::Identification(IdentificationPayload {
                identity: RoleClaim::Judge,
                ..
            })
        ));

        let cmd: ClientCommand = serde_json::from_value(json!({
            "event": "score",
            "data": {"competitor": "hong", "points": 2}
        }))
        .unwrap();
        assert!(matches!(
            cmd,
            ClientCommand::Score {
                competitor: Competitor::Hong,
                points: 2
            }
        ));

        let cmd: ClientCommand =
            serde_json::from_value(json!({"event": "createMatch"})).unwrap();
        assert!(matches!(cmd, ClientCommand::CreateMatch));
    }

    #[test]
    fn penalty_commands_use_the_type_field() {
        let cmd: ClientCommand = serde_json::from_value(json!({
            "event": "incrementPenalty",
            "data": {"type": "warning", "competitor": "chong"}
        }))
        .unwrap();
        assert!(matches!(
            cmd,
            ClientCommand::IncrementPenalty {
                kind: PenaltyKind::Warning,
                competitor: Competitor::Chong
            }
        ));
    }

    #[test]
    fn config_values_accept_booleans_and_steps() {
        let cmd: ClientCommand = serde_json::from_value(json!({
            "event": "setConfigItem",
            "data": {"name": "twoRounds", "value": false}
        }))
        .unwrap();
        assert!(matches!(
            cmd,
            ClientCommand::SetConfigItem {
                value: ConfigValue::Flag(false),
                ..
            }
        ));

        let cmd: ClientCommand = serde_json::from_value(json!({
            "event": "setConfigItem",
            "data": {"name": "roundTime", "value": -1}
        }))
        .unwrap();
        assert!(matches!(
            cmd,
            ClientCommand::SetConfigItem {
                value: ConfigValue::Step(-1),
                ..
            }
        ));
    }

    #[test]
    fn unrecognised_commands_fall_back_to_unknown() {
        let cmd: ClientCommand =
            serde_json::from_value(json!({"event": "launchMissiles"})).unwrap();
        assert!(matches!(cmd, ClientCommand::Unknown));
        assert_eq!(cmd.name(), "unknown");
    }

    #[test]
    fn events_serialize_with_camel_case_tags() {
        let event = ServerEvent::JpConnectionStateChanged { connected: true };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "jpConnectionStateChanged");
        assert_eq!(value["data"]["connected"], true);

        let event = ServerEvent::AuthorisationPending;
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "authorisationPending");
    }
}
