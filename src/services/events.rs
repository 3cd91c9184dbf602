//! Outbound notification builders. Every state change flows through one of
//! these helpers so the event names and payload shapes stay in one place.

use serde::Serialize;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        events::{
            ParticipantDisconnectedEvent, ParticipantJoinedEvent, PauseStartEvent,
            QuestionAdvancedEvent, ScoresUpdateEvent, ServerEvent, SessionErrorEvent,
            TimerExpiredEvent, TimerUpdateEvent,
        },
        quiz::QuestionSnapshot,
        session::{ParticipantSummary, QuestionStatsResponse, ScoreEntry, SessionSnapshot},
    },
    services::websocket_service::send_frame,
    state::SharedState,
};

/// Full state snapshot, sent after any lifecycle change.
pub const EVENT_SESSION_STATE: &str = "session:state";
/// The quiz left the lobby and is underway.
pub const EVENT_SESSION_STARTED: &str = "session:started";
/// A new question became active.
pub const EVENT_QUESTION_ADVANCED: &str = "question:advanced";
/// One-second countdown tick of the active question.
pub const EVENT_TIMER_UPDATE: &str = "timer:update";
/// The active question's countdown reached zero.
pub const EVENT_TIMER_EXPIRED: &str = "timer:expired";
/// The inter-question pause began.
pub const EVENT_PAUSE_START: &str = "pause:start";
/// Scoreboard refresh.
pub const EVENT_SCORES_UPDATE: &str = "scores:update";
/// Host-facing live view of who answered the active question.
pub const EVENT_QUESTION_STATS: &str = "question:stats";
/// A participant joined (or rejoined) the roster.
pub const EVENT_PARTICIPANT_JOINED: &str = "participant:joined";
/// A participant's last connection dropped.
pub const EVENT_PARTICIPANT_DISCONNECTED: &str = "participant:disconnected";
/// Session-scoped failure on the broadcast side.
pub const EVENT_ERROR: &str = "error";
/// Targeted: correctness confirmation for the submitting participant only.
pub const EVENT_ANSWER_CONFIRMED: &str = "answer:confirmed";
/// Targeted on rejoin: restores an in-flight selection.
pub const EVENT_ANSWER_RESTORE: &str = "answer:restore";

fn publish(state: &SharedState, session_id: Uuid, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(event, payload) {
        Ok(event) => state.hub().publish(session_id, event),
        Err(err) => warn!(event, error = %err, "failed to serialize broadcast payload"),
    }
}

/// Broadcast the full session snapshot.
pub fn broadcast_session_state(state: &SharedState, snapshot: &SessionSnapshot) {
    publish(state, snapshot.id, EVENT_SESSION_STATE, snapshot);
}

/// Broadcast that the session left the lobby.
pub fn broadcast_session_started(state: &SharedState, snapshot: &SessionSnapshot) {
    publish(state, snapshot.id, EVENT_SESSION_STARTED, snapshot);
}

/// Broadcast the newly active question with its absolute deadline.
pub fn broadcast_question_advanced(
    state: &SharedState,
    session_id: Uuid,
    index: usize,
    ends_at: OffsetDateTime,
    question: QuestionSnapshot,
) {
    let payload = QuestionAdvancedEvent {
        index,
        ends_at,
        question,
    };
    publish(state, session_id, EVENT_QUESTION_ADVANCED, &payload);
}

/// Broadcast one countdown tick.
pub fn broadcast_timer_update(state: &SharedState, session_id: Uuid, index: usize, time_left: u64) {
    let payload = TimerUpdateEvent { time_left, index };
    publish(state, session_id, EVENT_TIMER_UPDATE, &payload);
}

/// Broadcast that the active question expired.
pub fn broadcast_timer_expired(state: &SharedState, session_id: Uuid, index: usize) {
    let payload = TimerExpiredEvent { index };
    publish(state, session_id, EVENT_TIMER_EXPIRED, &payload);
}

/// Broadcast the beginning of the inter-question pause.
pub fn broadcast_pause_start(state: &SharedState, session_id: Uuid, duration_seconds: u64) {
    let payload = PauseStartEvent { duration_seconds };
    publish(state, session_id, EVENT_PAUSE_START, &payload);
}

/// Broadcast a scoreboard refresh.
pub fn broadcast_scores_update(
    state: &SharedState,
    session_id: Uuid,
    scores: Vec<ScoreEntry>,
    total_questions: usize,
) {
    let payload = ScoresUpdateEvent {
        scores,
        total_questions,
    };
    publish(state, session_id, EVENT_SCORES_UPDATE, &payload);
}

/// Broadcast the host-facing submission stats of the active question.
pub fn broadcast_question_stats(
    state: &SharedState,
    session_id: Uuid,
    stats: &QuestionStatsResponse,
) {
    publish(state, session_id, EVENT_QUESTION_STATS, stats);
}

/// Broadcast a roster addition.
pub fn broadcast_participant_joined(
    state: &SharedState,
    session_id: Uuid,
    participant: ParticipantSummary,
) {
    let payload = ParticipantJoinedEvent { participant };
    publish(state, session_id, EVENT_PARTICIPANT_JOINED, &payload);
}

/// Broadcast that a participant lost their last connection.
pub fn broadcast_participant_disconnected(state: &SharedState, session_id: Uuid, user_id: Uuid) {
    let payload = ParticipantDisconnectedEvent { user_id };
    publish(state, session_id, EVENT_PARTICIPANT_DISCONNECTED, &payload);
}

/// Broadcast a session-scoped error instead of crashing the session.
pub fn broadcast_session_error(state: &SharedState, session_id: Uuid, message: &str) {
    let payload = SessionErrorEvent {
        message: message.to_string(),
    };
    publish(state, session_id, EVENT_ERROR, &payload);
}

/// Push an event to every connection one user holds on a session, and to
/// nobody else. Used for confirmations that must never reach other clients.
pub fn send_targeted(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    event: &str,
    payload: &impl Serialize,
) {
    for tx in state.user_connections(session_id, user_id) {
        send_frame(&tx, event, payload);
    }
}
