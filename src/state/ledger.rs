use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// One recorded answer event. Rows are appended, never mutated or deleted;
/// the full history stays available for audit while scoring only ever looks
/// at the latest row per (participant, question).
#[derive(Debug, Clone)]
pub struct AnswerSubmission {
    /// Participant (user) that submitted.
    pub user_id: Uuid,
    /// Question being answered.
    pub question_id: Uuid,
    /// Ids of the selected answers, as sent by the client.
    pub selected_answer_ids: Vec<Uuid>,
    /// Submission timestamp.
    pub submitted_at: OffsetDateTime,
    /// Ledger-wide sequence number; breaks ties between submissions that
    /// land within the same millisecond.
    pub seq: u64,
}

impl AnswerSubmission {
    /// Ordering key implementing latest-by-timestamp with a stable tie-break.
    fn order_key(&self) -> (OffsetDateTime, u64) {
        (self.submitted_at, self.seq)
    }
}

/// Append-only per-session answer history.
///
/// Appends from many concurrent submitters only contend on the session's
/// shard; nothing is ever rewritten in place, so readers always observe a
/// consistent prefix of the history.
pub struct SubmissionLedger {
    entries: DashMap<Uuid, Vec<AnswerSubmission>>,
    seq: AtomicU64,
}

impl SubmissionLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Append a submission row for the given session and return a copy of it.
    pub fn append(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        question_id: Uuid,
        selected_answer_ids: Vec<Uuid>,
    ) -> AnswerSubmission {
        let submission = AnswerSubmission {
            user_id,
            question_id,
            selected_answer_ids,
            submitted_at: OffsetDateTime::now_utc(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };

        self.entries
            .entry(session_id)
            .or_default()
            .push(submission.clone());
        submission
    }

    /// All submissions recorded for a session, in append order.
    pub fn for_session(&self, session_id: Uuid) -> Vec<AnswerSubmission> {
        self.entries
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// All submissions one participant made in a session, in append order.
    pub fn for_participant(&self, session_id: Uuid, user_id: Uuid) -> Vec<AnswerSubmission> {
        self.entries
            .get(&session_id)
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|submission| submission.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Latest submission a participant made for one question, if any.
    pub fn latest_for(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        question_id: Uuid,
    ) -> Option<AnswerSubmission> {
        self.entries.get(&session_id).and_then(|entry| {
            entry
                .value()
                .iter()
                .filter(|submission| {
                    submission.user_id == user_id && submission.question_id == question_id
                })
                .max_by_key(|submission| submission.order_key())
                .cloned()
        })
    }

    /// Latest submission per participant for one question, in first-answer order.
    pub fn latest_per_participant(
        &self,
        session_id: Uuid,
        question_id: Uuid,
    ) -> Vec<AnswerSubmission> {
        let Some(entry) = self.entries.get(&session_id) else {
            return Vec::new();
        };

        let mut latest: indexmap::IndexMap<Uuid, AnswerSubmission> = indexmap::IndexMap::new();
        for submission in entry
            .value()
            .iter()
            .filter(|submission| submission.question_id == question_id)
        {
            match latest.get(&submission.user_id) {
                Some(existing) if existing.order_key() >= submission.order_key() => {}
                _ => {
                    latest.insert(submission.user_id, submission.clone());
                }
            }
        }
        latest.into_values().collect()
    }
}

impl Default for SubmissionLedger {
    fn default() -> Self {
        Self::new()
    }
}
