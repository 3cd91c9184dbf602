use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quizline Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::list_quizzes,
        crate::routes::session::create_session,
        crate::routes::session::join_session,
        crate::routes::session::start_session,
        crate::routes::session::advance_session,
        crate::routes::session::finish_session,
        crate::routes::session::submit_answer,
        crate::routes::session::get_session,
        crate::routes::session::get_results,
        crate::routes::session::get_stats,
        crate::routes::sse::session_events,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::quiz::QuizListItem,
            crate::dto::quiz::QuestionSnapshot,
            crate::dto::quiz::AnswerSnapshot,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::JoinRequest,
            crate::dto::session::JoinResponse,
            crate::dto::session::HostActionRequest,
            crate::dto::session::AdvanceRequest,
            crate::dto::session::AdvanceResponse,
            crate::dto::session::SubmitAnswerRequest,
            crate::dto::session::SubmitAnswerResponse,
            crate::dto::session::SessionSnapshot,
            crate::dto::session::ResultsResponse,
            crate::dto::session::QuestionStatsResponse,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::WsFrame,
            crate::dao::models::QuestionKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "quizzes", description = "Read-only quiz catalog"),
        (name = "sessions", description = "Live session commands and queries"),
        (name = "events", description = "Realtime session event streams"),
    )
)]
pub struct ApiDoc;
