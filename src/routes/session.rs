use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        quiz::QuizListItem,
        session::{
            AdvanceRequest, AdvanceResponse, CreateSessionRequest, HostActionRequest, JoinRequest,
            JoinResponse, QuestionStatsResponse, ResultsResponse, SessionSnapshot,
            SubmitAnswerRequest, SubmitAnswerResponse,
        },
    },
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Routes carrying the session command and query surface.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/quizzes", get(list_quizzes))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/join", post(join_session))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/start", post(start_session))
        .route("/api/sessions/{id}/advance", post(advance_session))
        .route("/api/sessions/{id}/finish", post(finish_session))
        .route("/api/sessions/{id}/answers", post(submit_answer))
        .route("/api/sessions/{id}/results", get(get_results))
        .route("/api/sessions/{id}/stats", get(get_stats))
}

#[utoipa::path(
    get,
    path = "/api/quizzes",
    tag = "quizzes",
    responses((status = 200, description = "Available quizzes", body = [QuizListItem]))
)]
/// List the quizzes available for hosting a session.
pub async fn list_quizzes(
    State(state): State<SharedState>,
) -> Result<Json<Vec<QuizListItem>>, AppError> {
    let quizzes = state
        .list_quizzes()
        .await
        .map_err(AppError::from)?
        .into_iter()
        .map(|(id, title)| QuizListItem { id, title })
        .collect();
    Ok(Json(quizzes))
}

#[utoipa::path(
    post,
    path = "/api/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = SessionSnapshot),
        (status = 403, description = "Caller is not the quiz author"),
        (status = 404, description = "Quiz not found"),
    )
)]
/// Bootstrap a run of a quiz and hand out its join code.
pub async fn create_session(
    State(state): State<SharedState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    payload.validate()?;
    let snapshot =
        session_service::create_session(&state, payload.quiz_id, payload.user_id).await?;
    Ok(Json(snapshot))
}

#[utoipa::path(
    post,
    path = "/api/sessions/join",
    tag = "sessions",
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Joined (idempotent)", body = JoinResponse),
        (status = 404, description = "Unknown join code"),
    )
)]
/// Resolve a join code and register the participant.
pub async fn join_session(
    State(state): State<SharedState>,
    Json(payload): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    payload.validate()?;
    let joined = session_service::join(
        &state,
        payload.user_id,
        &payload.code,
        payload.display_name,
        false,
    )
    .await?;
    Ok(Json(joined))
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Full session snapshot", body = SessionSnapshot),
        (status = 404, description = "Session not found"),
    )
)]
/// Full current state, used for the initial sync of a client.
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::get_state(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/start",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = HostActionRequest,
    responses(
        (status = 200, description = "Session started", body = SessionSnapshot),
        (status = 403, description = "Caller is not the quiz author"),
        (status = 409, description = "Session already started or finished"),
    )
)]
/// Leave the lobby and activate the first question.
pub async fn start_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<HostActionRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(
        session_service::start_quiz(&state, id, payload.user_id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/advance",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = AdvanceRequest,
    responses(
        (status = 200, description = "Question advanced", body = AdvanceResponse),
        (status = 403, description = "Caller is not the quiz author"),
    )
)]
/// Activate another question, superseding any pending auto-advance.
pub async fn advance_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceRequest>,
) -> Result<Json<AdvanceResponse>, AppError> {
    payload.validate()?;
    let response = session_service::advance_question(
        &state,
        id,
        payload.user_id,
        payload.next_question_index,
        payload.time_limit_seconds,
    )
    .await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/finish",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = HostActionRequest,
    responses(
        (status = 200, description = "Session finished", body = SessionSnapshot),
        (status = 403, description = "Caller is not the quiz author"),
    )
)]
/// Terminate the session; only reads are accepted afterwards.
pub async fn finish_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<HostActionRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(
        session_service::finish_session(&state, id, payload.user_id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/sessions/{id}/answers",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = SubmitAnswerResponse),
        (status = 404, description = "Participant or question not found"),
        (status = 409, description = "Question is not open for answers"),
    )
)]
/// Record an answer for the active question; resubmission overwrites.
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, AppError> {
    payload.validate()?;
    let response = session_service::submit_answer(
        &state,
        id,
        payload.user_id,
        payload.question_id,
        payload.selected_answer_ids,
    )
    .await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}/results",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Final standings", body = ResultsResponse),
        (status = 409, description = "Session is not finished"),
    )
)]
/// Final standings, recomputed from the ledger on every call.
pub async fn get_results(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResultsResponse>, AppError> {
    Ok(Json(session_service::get_results(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}/stats",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Live stats of the active question", body = QuestionStatsResponse),
        (status = 409, description = "No question is active"),
    )
)]
/// Host-facing live view of who answered the active question.
pub async fn get_stats(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuestionStatsResponse>, AppError> {
    Ok(Json(
        session_service::current_question_stats(&state, id).await?,
    ))
}
