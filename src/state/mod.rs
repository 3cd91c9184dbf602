//! Shared application state: session store, submission ledger, broadcast hub,
//! timer registry, and the live client connection table.

pub mod hub;
pub mod ledger;
pub mod session;
pub mod timers;

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{catalog::QuizCatalog, models::QuizEntity},
    error::ServiceError,
};

pub use self::hub::SessionHub;
pub use self::ledger::{AnswerSubmission, SubmissionLedger};
pub use self::session::{Participant, Session, SessionPhase, SessionStore};
pub use self::timers::{TimerKind, TimerRegistry};

/// Cheaply cloneable handle to the central application state.
pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push frames to one connected WebSocket client.
pub struct ClientConnection {
    /// Session the client subscribed to.
    pub session_id: Uuid,
    /// User behind the connection.
    pub user_id: Uuid,
    /// Writer channel of the connection.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state owning every session-scoped registry.
pub struct AppState {
    config: AppConfig,
    catalog: Arc<dyn QuizCatalog>,
    sessions: SessionStore,
    ledger: SubmissionLedger,
    hub: SessionHub,
    timers: TimerRegistry,
    clients: DashMap<Uuid, ClientConnection>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig, catalog: Arc<dyn QuizCatalog>) -> SharedState {
        Arc::new(Self {
            config,
            catalog,
            sessions: SessionStore::new(),
            ledger: SubmissionLedger::new(),
            hub: SessionHub::new(),
            timers: TimerRegistry::new(),
            clients: DashMap::new(),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Authoritative session records.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Append-only answer history.
    pub fn ledger(&self) -> &SubmissionLedger {
        &self.ledger
    }

    /// Publish/subscribe hub for session events.
    pub fn hub(&self) -> &SessionHub {
        &self.hub
    }

    /// Registry of armed countdown/pause timers.
    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Registry of live WebSocket connections keyed by connection id.
    pub fn clients(&self) -> &DashMap<Uuid, ClientConnection> {
        &self.clients
    }

    /// Fetch a quiz from the catalog, failing with `NotFound` when absent.
    pub async fn require_quiz(&self, quiz_id: Uuid) -> Result<QuizEntity, ServiceError> {
        self.catalog
            .find_quiz(quiz_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("quiz `{quiz_id}` not found")))
    }

    /// List the quizzes available in the catalog.
    pub async fn list_quizzes(&self) -> Result<Vec<(Uuid, String)>, ServiceError> {
        Ok(self.catalog.list_quizzes().await?)
    }

    /// Number of live connections subscribed to a session.
    pub fn connection_count(&self, session_id: Uuid) -> usize {
        self.clients
            .iter()
            .filter(|entry| entry.value().session_id == session_id)
            .count()
    }

    /// Whether a user still holds at least one live connection to a session.
    pub fn user_connected(&self, session_id: Uuid, user_id: Uuid) -> bool {
        self.clients.iter().any(|entry| {
            entry.value().session_id == session_id && entry.value().user_id == user_id
        })
    }

    /// Writer channels of every connection a user holds on a session.
    pub fn user_connections(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Vec<mpsc::UnboundedSender<Message>> {
        self.clients
            .iter()
            .filter(|entry| {
                entry.value().session_id == session_id && entry.value().user_id == user_id
            })
            .map(|entry| entry.value().tx.clone())
            .collect()
    }
}
