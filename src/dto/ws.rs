use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::events::ServerEvent;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First frame of every connection: resolve the code, register the
    /// participant, and subscribe to the session's event feed.
    Subscribe {
        /// Join code as typed by the user.
        code: String,
        /// User behind the connection.
        user_id: Uuid,
        /// Name shown on scoreboards.
        display_name: String,
    },
    /// Record an answer for the active question.
    SubmitAnswer {
        /// Question being answered.
        question_id: Uuid,
        /// Selected answer ids.
        selected_answer_ids: Vec<Uuid>,
    },
    /// Anything this version does not understand.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a client frame from its JSON text representation.
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Envelope wrapping every frame pushed to a WebSocket client.
pub struct WsFrame {
    /// Event name, e.g. `timer:update`.
    pub event: String,
    /// Event payload.
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

impl From<ServerEvent> for WsFrame {
    fn from(event: ServerEvent) -> Self {
        Self {
            event: event.name,
            data: event.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_parses() {
        let text = r#"{"type":"subscribe","code":"ABC234","user_id":"7f2c1c7e-3b1f-4c62-9f6a-2d1f9f1f0001","display_name":"Ada"}"#;
        match ClientMessage::from_json_str(text).unwrap() {
            ClientMessage::Subscribe { code, display_name, .. } => {
                assert_eq!(code, "ABC234");
                assert_eq!(display_name, "Ada");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_maps_to_unknown_variant() {
        let text = r#"{"type":"dance"}"#;
        assert!(matches!(
            ClientMessage::from_json_str(text).unwrap(),
            ClientMessage::Unknown
        ));
    }
}
