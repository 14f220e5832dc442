//! 下发给传输层的事件（带 type 标签的 JSON）

use serde::Serialize;

use crate::context::RelationshipStage;
use crate::llm::ProfileKind;
use crate::session::Mode;

use super::error::OrchestratorError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingEvent {
    /// 危机轮次，总是排在最前
    SafetyAlert { escalate: bool },
    StateUpdate {
        mode: Mode,
        step: u8,
        content_id: Option<String>,
        trust_level: u8,
        stage: RelationshipStage,
        safety_active: bool,
    },
    ContentDelivered { content_id: String, step: u8 },
    Reply { text: String, profile: ProfileKind },
    Error { code: String, reason: String },
}

impl OutgoingEvent {
    pub fn error(err: &OrchestratorError) -> Self {
        OutgoingEvent::Error {
            code: err.code().to_string(),
            reason: err.reason().to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutgoingEvent::SafetyAlert { .. } => "safety_alert",
            OutgoingEvent::StateUpdate { .. } => "state_update",
            OutgoingEvent::ContentDelivered { .. } => "content_delivered",
            OutgoingEvent::Reply { .. } => "reply",
            OutgoingEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_tagged() {
        let json = serde_json::to_value(OutgoingEvent::ContentDelivered {
            content_id: "online_01".into(),
            step: 2,
        })
        .unwrap();
        assert_eq!(json["type"], "content_delivered");
        assert_eq!(json["step"], 2);

        let err = OutgoingEvent::error(&OrchestratorError::Cancelled);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "turn_cancelled");
        assert_eq!(err.kind(), "error");
    }
}
