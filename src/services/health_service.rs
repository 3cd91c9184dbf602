use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the process health and the number of sessions held.
pub fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse::ok(state.sessions().session_count())
}
