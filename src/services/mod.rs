/// OpenAPI documentation generation.
pub mod documentation;
/// Outbound notification builders and event name constants.
pub mod events;
/// Health check service.
pub mod health_service;
/// Pure scoring functions over the submission ledger.
pub mod scoring;
/// Session orchestration: command handlers and query projections.
pub mod session_service;
/// Server-Sent Events observer streams.
pub mod sse_service;
/// Per-session countdown and pause scheduling.
pub mod timer_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
