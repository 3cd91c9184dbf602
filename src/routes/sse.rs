use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/api/sessions/{id}/events",
    tag = "events",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Observer event stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Session not found"),
    )
)]
/// Stream one session's realtime events to a read-only observer, e.g. a
/// projector view or the host dashboard.
pub async fn session_events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    // Reject unknown sessions up front instead of serving a silent stream.
    state.sessions().snapshot(id).await?;
    let receiver = sse_service::subscribe(&state, id);
    info!(session_id = %id, "new observer SSE connection");
    Ok(sse_service::to_sse_stream(receiver))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/api/sessions/{id}/events", get(session_events))
}
