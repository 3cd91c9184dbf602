use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::{
    quiz::QuestionSnapshot,
    session::{ParticipantSummary, ScoreEntry},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across the session broadcast channels.
///
/// The payload is kept as a JSON value because the two transports frame it
/// differently: SSE splits event name and data, the WebSocket wraps both in
/// one envelope.
pub struct ServerEvent {
    /// Event name, e.g. `timer:update`.
    pub name: String,
    /// Serialized payload.
    pub data: serde_json::Value,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the event data.
    pub fn json<T>(name: &str, payload: &T) -> serde_json::Result<Self>
    where
        T: Serialize,
    {
        Ok(Self {
            name: name.to_string(),
            data: serde_json::to_value(payload)?,
        })
    }
}

/// Broadcast once per second while a question is counting down.
#[derive(Debug, Serialize, ToSchema)]
pub struct TimerUpdateEvent {
    /// Seconds remaining, derived from the absolute deadline.
    pub time_left: u64,
    /// Index of the question being counted down.
    pub index: usize,
}

/// Broadcast exactly once when a question's countdown reaches zero.
#[derive(Debug, Serialize, ToSchema)]
pub struct TimerExpiredEvent {
    /// Index of the expired question.
    pub index: usize,
}

/// Broadcast when the inter-question pause begins.
#[derive(Debug, Serialize, ToSchema)]
pub struct PauseStartEvent {
    /// Length of the pause window, in seconds.
    pub duration_seconds: u64,
}

/// Broadcast whenever scores change visibility (question expiry, finish).
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoresUpdateEvent {
    /// One row per participant, in join order.
    pub scores: Vec<ScoreEntry>,
    /// Number of questions in the quiz.
    pub total_questions: usize,
}

/// Broadcast when a new question becomes active.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionAdvancedEvent {
    /// Index of the now-active question.
    pub index: usize,
    /// Absolute deadline of the now-active question.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub ends_at: OffsetDateTime,
    /// The question itself, correctness stripped.
    pub question: QuestionSnapshot,
}

/// Broadcast when a participant joins the roster.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantJoinedEvent {
    /// The new roster entry.
    pub participant: ParticipantSummary,
}

/// Broadcast when a participant's last connection drops.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantDisconnectedEvent {
    /// User whose connection dropped.
    pub user_id: Uuid,
}

/// Targeted confirmation sent only to the submitting participant. Never
/// broadcast: it reveals correctness while the question is still open.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerConfirmedEvent {
    /// Question the confirmation refers to.
    pub question_id: Uuid,
    /// Whether the recorded selection was correct.
    pub is_correct: bool,
}

/// Targeted on rejoin: restores the client's in-flight selection for the
/// still-active question.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerRestoreEvent {
    /// Active question the selection belongs to.
    pub question_id: Uuid,
    /// Ids the participant had selected last.
    pub selected_answer_ids: Vec<Uuid>,
}

/// Session-scoped error notification for failures on the broadcast side.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionErrorEvent {
    /// Human-readable description of the failure.
    pub message: String,
}
