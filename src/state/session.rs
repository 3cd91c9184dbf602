use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use indexmap::IndexMap;
use rand::Rng;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ServiceError;

/// Fixed length of the human-enterable join code.
pub const JOIN_CODE_LENGTH: usize = 6;

/// Uppercase alphanumeric alphabet with the ambiguous glyphs (0/O, 1/I)
/// removed, since the code is typed by hand.
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Attempts before giving up on finding an unused join code.
const JOIN_CODE_ATTEMPTS: usize = 8;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Lobby: participants may join, nothing is running yet.
    Created,
    /// The quiz is underway; a question is active or an inter-question pause runs.
    Started,
    /// Terminal: only read operations are accepted.
    Finished,
}

impl SessionPhase {
    /// Wire representation of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Created => "CREATED",
            SessionPhase::Started => "STARTED",
            SessionPhase::Finished => "FINISHED",
        }
    }
}

/// A user's membership record within a session. Never removed once created.
#[derive(Debug, Clone)]
pub struct Participant {
    /// User this membership belongs to.
    pub user_id: Uuid,
    /// Name shown on scoreboards.
    pub display_name: String,
    /// Whether the user currently holds at least one live connection.
    pub connected: bool,
    /// When the user first joined the session.
    pub joined_at: OffsetDateTime,
}

/// Authoritative record of one live run of a quiz.
///
/// `current_question_index` is set from the moment the session starts and is
/// kept after finishing; `current_question_ends_at` is set only while a
/// question is actively counting down (cleared during the inter-question
/// pause). The deadline is an absolute timestamp so any observer can derive
/// the remaining time without replaying history.
#[derive(Debug, Clone)]
pub struct Session {
    /// Primary key of the session.
    pub id: Uuid,
    /// Quiz being run.
    pub quiz_id: Uuid,
    /// Six-character join code, stored uppercase.
    pub code: String,
    /// Lifecycle state.
    pub phase: SessionPhase,
    /// Index of the question currently shown, if the session ever started.
    pub current_question_index: Option<usize>,
    /// Absolute deadline of the active question, if one is counting down.
    pub current_question_ends_at: Option<OffsetDateTime>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Roster keyed by user id, in join order.
    pub participants: IndexMap<Uuid, Participant>,
}

impl Session {
    fn new(quiz_id: Uuid, code: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            quiz_id,
            code,
            phase: SessionPhase::Created,
            current_question_index: None,
            current_question_ends_at: None,
            created_at: OffsetDateTime::now_utc(),
            participants: IndexMap::new(),
        }
    }

    /// Guard a transition on the expected current phase.
    pub fn ensure_phase(&self, expected: SessionPhase) -> Result<(), ServiceError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(ServiceError::Conflict(format!(
                "session is {}, expected {}",
                self.phase.as_str(),
                expected.as_str()
            )))
        }
    }

    /// Whether a question is currently counting down (not paused, not idle).
    pub fn question_active(&self) -> bool {
        self.phase == SessionPhase::Started && self.current_question_ends_at.is_some()
    }
}

/// Single source of truth for session records.
///
/// Every mutation goes through [`SessionStore::transition`], which holds the
/// session's exclusive write lock for the duration of the closure. That lock
/// is the single-owner-per-session discipline: no two mutations of the same
/// session interleave, while distinct sessions proceed fully concurrently.
pub struct SessionStore {
    sessions: DashMap<Uuid, Arc<RwLock<Session>>>,
    codes: DashMap<String, Uuid>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            codes: DashMap::new(),
        }
    }

    /// Create a session for the given quiz, allocating an unused join code.
    pub fn create(&self, quiz_id: Uuid) -> Result<Session, ServiceError> {
        for _ in 0..JOIN_CODE_ATTEMPTS {
            let code = generate_join_code();
            let session = Session::new(quiz_id, code.clone());
            let snapshot = session.clone();
            // Session first, code second: a code must never resolve to an id
            // that is not yet in the map.
            self.sessions
                .insert(session.id, Arc::new(RwLock::new(session)));
            match self.codes.entry(code) {
                Entry::Occupied(_) => {
                    // Code already taken by a concurrent creator; drop the
                    // orphan record and roll another code.
                    self.sessions.remove(&snapshot.id);
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(snapshot.id);
                    return Ok(snapshot);
                }
            }
        }

        Err(ServiceError::Internal(
            "could not allocate an unused join code".into(),
        ))
    }

    fn handle(&self, id: Uuid) -> Result<Arc<RwLock<Session>>, ServiceError> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("session `{id}` not found")))
    }

    /// Clone the current state of a session.
    ///
    /// The snapshot is stale the moment it is returned; callers that mutate
    /// must re-check their guards inside [`SessionStore::transition`].
    pub async fn snapshot(&self, id: Uuid) -> Result<Session, ServiceError> {
        let handle = self.handle(id)?;
        let guard = handle.read().await;
        Ok(guard.clone())
    }

    /// Resolve a join code (case-insensitive) to a session id.
    pub fn resolve_code(&self, code: &str) -> Result<Uuid, ServiceError> {
        let normalized = code.trim().to_ascii_uppercase();
        self.codes
            .get(&normalized)
            .map(|entry| *entry.value())
            .ok_or_else(|| ServiceError::NotFound(format!("unknown session code `{normalized}`")))
    }

    /// Run a guarded mutation under the session's exclusive write lock.
    pub async fn transition<T>(
        &self,
        id: Uuid,
        mutation: impl FnOnce(&mut Session) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let handle = self.handle(id)?;
        let mut guard = handle.write().await;
        mutation(&mut guard)
    }

    /// Number of sessions currently held by this process.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate one join code candidate from the unambiguous alphabet.
fn generate_join_code() -> String {
    let mut rng = rand::rng();
    (0..JOIN_CODE_LENGTH)
        .map(|_| {
            let index = rng.random_range(0..JOIN_CODE_ALPHABET.len());
            JOIN_CODE_ALPHABET[index] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_codes_are_six_uppercase_alphanumeric_chars() {
        for _ in 0..64 {
            let code = generate_join_code();
            assert_eq!(code.len(), JOIN_CODE_LENGTH);
            assert!(
                code.chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            );
        }
    }

    #[tokio::test]
    async fn create_registers_code_for_lookup() {
        let store = SessionStore::new();
        let session = store.create(Uuid::new_v4()).unwrap();

        let resolved = store.resolve_code(&session.code).unwrap();
        assert_eq!(resolved, session.id);

        let lowercase = session.code.to_ascii_lowercase();
        assert_eq!(store.resolve_code(&lowercase).unwrap(), session.id);
    }

    #[tokio::test]
    async fn unknown_code_and_id_are_not_found() {
        let store = SessionStore::new();
        assert!(matches!(
            store.resolve_code("ZZZZZZ"),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            store.snapshot(Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn phase_guard_rejects_stale_transitions() {
        let store = SessionStore::new();
        let session = store.create(Uuid::new_v4()).unwrap();

        store
            .transition(session.id, |session| {
                session.ensure_phase(SessionPhase::Created)?;
                session.phase = SessionPhase::Started;
                session.current_question_index = Some(0);
                Ok(())
            })
            .await
            .unwrap();

        // A second "start" must fail the guard instead of silently re-running.
        let err = store
            .transition(session.id, |session| {
                session.ensure_phase(SessionPhase::Created)?;
                session.phase = SessionPhase::Started;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn snapshot_is_a_detached_copy() {
        let store = SessionStore::new();
        let session = store.create(Uuid::new_v4()).unwrap();

        let before = store.snapshot(session.id).await.unwrap();
        store
            .transition(session.id, |session| {
                session.phase = SessionPhase::Started;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(before.phase, SessionPhase::Created);
        let after = store.snapshot(session.id).await.unwrap();
        assert_eq!(after.phase, SessionPhase::Started);
    }
}
