use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dto::{quiz::QuestionSnapshot, validation::validate_join_code};

/// Body of `POST /api/sessions`: a host bootstraps a run of their quiz.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    /// Quiz to run.
    pub quiz_id: Uuid,
    /// Caller; must be the quiz author.
    pub user_id: Uuid,
}

/// Body of `POST /api/sessions/join`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRequest {
    /// Joining user.
    pub user_id: Uuid,
    /// Join code as typed by the user; matched case-insensitively.
    #[validate(custom(function = validate_join_code))]
    pub code: String,
    /// Name shown on scoreboards.
    #[validate(length(min = 1, max = 64))]
    pub display_name: String,
}

/// Response to a join command.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinResponse {
    /// Session the code resolved to.
    pub session_id: Uuid,
    /// Quiz being run in that session.
    pub quiz_id: Uuid,
}

/// Body shared by the start and finish host commands.
#[derive(Debug, Deserialize, ToSchema)]
pub struct HostActionRequest {
    /// Caller; must be the quiz author.
    pub user_id: Uuid,
}

/// Body of `POST /api/sessions/{id}/advance`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AdvanceRequest {
    /// Caller; must be the quiz author.
    pub user_id: Uuid,
    /// Explicit target question index; defaults to the next question.
    pub next_question_index: Option<usize>,
    /// Explicit countdown length for the target question.
    #[validate(range(min = 1, max = 3600))]
    pub time_limit_seconds: Option<u64>,
}

/// Response to an advance command.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdvanceResponse {
    /// Index of the now-active question.
    pub current_question_index: usize,
    /// Absolute deadline of the now-active question.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub current_question_ends_at: OffsetDateTime,
}

/// Body of `POST /api/sessions/{id}/answers`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitAnswerRequest {
    /// Submitting participant.
    pub user_id: Uuid,
    /// Question being answered; must be the active one.
    pub question_id: Uuid,
    /// Selected answer ids; resubmitting overwrites the previous selection.
    #[validate(length(min = 1, message = "at least one answer must be selected"))]
    pub selected_answer_ids: Vec<Uuid>,
}

/// Acknowledgement returned (and sent as a targeted event) after a submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitAnswerResponse {
    /// Question the acknowledgement refers to.
    pub question_id: Uuid,
    /// Whether the recorded selection matches the correct answer set.
    pub is_correct: bool,
}

/// Roster entry as exposed to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantSummary {
    /// User behind the membership.
    pub user_id: Uuid,
    /// Name shown on scoreboards.
    pub display_name: String,
    /// Whether the user currently holds a live connection.
    pub connected: bool,
}

/// One scoreboard row.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScoreEntry {
    /// Participant the score belongs to.
    pub user_id: Uuid,
    /// Name shown on scoreboards.
    pub display_name: String,
    /// Number of correctly answered questions.
    pub score: usize,
}

/// Full session state used for the initial sync of a newly-connected client.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub id: Uuid,
    /// Quiz being run.
    pub quiz_id: Uuid,
    /// Quiz title.
    pub quiz_title: String,
    /// Join code of the session.
    pub code: String,
    /// Lifecycle state (`CREATED`, `STARTED` or `FINISHED`).
    pub phase: String,
    /// Index of the current question, if the session ever started.
    pub current_question_index: Option<usize>,
    /// Absolute deadline of the active question; absent during the
    /// inter-question pause and outside the started phase.
    #[serde(with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub current_question_ends_at: Option<OffsetDateTime>,
    /// Seconds left on the active question, derived from the deadline at
    /// snapshot time. Clients keep counting from the deadline themselves.
    pub time_left_seconds: Option<u64>,
    /// The current question, correctness stripped.
    pub question: Option<QuestionSnapshot>,
    /// Roster in join order.
    pub participants: Vec<ParticipantSummary>,
    /// Live scores, excluding the question still being played.
    pub scores: Vec<ScoreEntry>,
    /// Number of questions in the quiz.
    pub total_questions: usize,
    /// Creation timestamp of the session.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
}

/// Per-question review of one participant's final answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionAnswerReview {
    /// Question the review refers to.
    pub question_id: Uuid,
    /// Ids the participant had selected last.
    pub selected_answer_ids: Vec<Uuid>,
    /// Whether that selection was correct.
    pub is_correct: bool,
}

/// Final standing of one participant.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantResult {
    /// Roster entry.
    pub participant: ParticipantSummary,
    /// Number of correctly answered questions.
    pub score: usize,
    /// Latest answer per question, for review screens.
    pub per_question_answers: Vec<QuestionAnswerReview>,
}

/// Response of `GET /api/sessions/{id}/results`, recomputed from the ledger
/// on every call.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResultsResponse {
    /// Title of the quiz that was run.
    pub quiz_title: String,
    /// Number of questions in the quiz.
    pub total_questions: usize,
    /// Standings in join order.
    pub results: Vec<ParticipantResult>,
}

/// One participant's latest submission on the active question.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmissionView {
    /// Submitting participant.
    pub user_id: Uuid,
    /// Name shown on the host dashboard.
    pub display_name: String,
    /// Ids currently selected.
    pub selected_answer_ids: Vec<Uuid>,
    /// When the latest submission landed.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub submitted_at: OffsetDateTime,
}

/// Host-facing live view of who has answered the active question.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionStatsResponse {
    /// Question the stats refer to.
    pub question_id: Uuid,
    /// Size of the roster.
    pub total_participants: usize,
    /// Latest submission per participant that answered.
    pub submissions: Vec<SubmissionView>,
}
