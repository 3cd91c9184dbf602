//! Business logic powering the session commands. These helpers coordinate
//! the session store, the submission ledger, the scoring engine, and the
//! timer registry while honouring the one-writer-per-session discipline.

use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::models::QuizEntity,
    dto::{
        events::AnswerRestoreEvent,
        quiz::QuestionSnapshot,
        session::{
            AdvanceResponse, JoinResponse, ParticipantResult, ParticipantSummary,
            QuestionAnswerReview, QuestionStatsResponse, ResultsResponse, ScoreEntry,
            SessionSnapshot, SubmissionView, SubmitAnswerResponse,
        },
    },
    error::ServiceError,
    services::{events, scoring, timer_service},
    state::{Participant, Session, SessionPhase, SharedState},
};

/// What the pause timer found when it tried to continue the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AutoOutcome {
    /// The next question is now active.
    Advanced,
    /// The expired question was the last one; the session is finished.
    Finished,
    /// A manual command got there first; nothing was changed.
    Superseded,
}

fn seconds(value: u64) -> TimeDuration {
    TimeDuration::seconds(value as i64)
}

fn summary(participant: &Participant) -> ParticipantSummary {
    ParticipantSummary {
        user_id: participant.user_id,
        display_name: participant.display_name.clone(),
        connected: participant.connected,
    }
}

fn ensure_author(quiz: &QuizEntity, user_id: Uuid, command: &str) -> Result<(), ServiceError> {
    if quiz.author_id == user_id {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "only the quiz author may {command} this session"
        )))
    }
}

/// Bootstrap a run of a quiz. The session starts in the lobby with a fresh
/// join code; only the quiz author may create it.
pub async fn create_session(
    state: &SharedState,
    quiz_id: Uuid,
    user_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    let quiz = state.require_quiz(quiz_id).await?;
    ensure_author(&quiz, user_id, "host")?;
    if quiz.questions.is_empty() {
        return Err(ServiceError::Validation(
            "quiz has no questions to run".into(),
        ));
    }

    let session = state.sessions().create(quiz_id)?;
    Ok(build_snapshot(state, &session, &quiz))
}

/// Resolve a join code and idempotently register the participant.
///
/// Joining twice with the same user maps to the same roster entry. With
/// `connected` set the membership is immediately marked live (WebSocket
/// path); the REST path leaves the flag untouched until a socket shows up.
pub async fn join(
    state: &SharedState,
    user_id: Uuid,
    code: &str,
    display_name: String,
    connected: bool,
) -> Result<JoinResponse, ServiceError> {
    let display_name = display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(ServiceError::Validation(
            "display name must not be empty".into(),
        ));
    }

    let session_id = state.sessions().resolve_code(code)?;
    let (quiz_id, announce) = state
        .sessions()
        .transition(session_id, move |session| {
            if session.phase == SessionPhase::Finished {
                return Err(ServiceError::Conflict(
                    "cannot join a finished session".into(),
                ));
            }

            let quiz_id = session.quiz_id;
            match session.participants.get_mut(&user_id) {
                Some(existing) => {
                    let reconnected = connected && !existing.connected;
                    if connected {
                        existing.connected = true;
                    }
                    Ok((quiz_id, reconnected.then(|| summary(existing))))
                }
                None => {
                    let participant = Participant {
                        user_id,
                        display_name,
                        connected,
                        joined_at: OffsetDateTime::now_utc(),
                    };
                    let announce = summary(&participant);
                    session.participants.insert(user_id, participant);
                    Ok((quiz_id, Some(announce)))
                }
            }
        })
        .await?;

    if let Some(participant) = announce {
        events::broadcast_participant_joined(state, session_id, participant);
    }

    Ok(JoinResponse {
        session_id,
        quiz_id,
    })
}

/// Full current state for the initial sync of a newly-connected client.
pub async fn get_state(
    state: &SharedState,
    session_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    let session = state.sessions().snapshot(session_id).await?;
    let quiz = state.require_quiz(session.quiz_id).await?;
    Ok(build_snapshot(state, &session, &quiz))
}

/// Leave the lobby: activate the first question and start its countdown.
pub async fn start_quiz(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    let session = state.sessions().snapshot(session_id).await?;
    let quiz = state.require_quiz(session.quiz_id).await?;
    ensure_author(&quiz, user_id, "start")?;

    let first = quiz
        .question_at(0)
        .ok_or_else(|| ServiceError::Validation("quiz has no questions to run".into()))?;
    let ends_at = OffsetDateTime::now_utc() + seconds(first.time_limit_seconds);

    let updated = state
        .sessions()
        .transition(session_id, move |session| {
            session.ensure_phase(SessionPhase::Created)?;
            session.phase = SessionPhase::Started;
            session.current_question_index = Some(0);
            session.current_question_ends_at = Some(ends_at);
            Ok(session.clone())
        })
        .await?;

    let snapshot = build_snapshot(state, &updated, &quiz);
    events::broadcast_session_started(state, &snapshot);
    events::broadcast_question_advanced(state, session_id, 0, ends_at, first.into());
    timer_service::arm_countdown(state, session_id);

    Ok(snapshot)
}

/// Activate another question on behalf of the host.
///
/// The deadline policy follows the original behaviour: an explicit
/// `time_limit_seconds` counts from now; otherwise a still-standing previous
/// deadline is extended by the target question's time limit; otherwise the
/// configured default applies.
pub async fn advance_question(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    next_question_index: Option<usize>,
    time_limit_seconds: Option<u64>,
) -> Result<AdvanceResponse, ServiceError> {
    let session = state.sessions().snapshot(session_id).await?;
    let quiz = state.require_quiz(session.quiz_id).await?;
    ensure_author(&quiz, user_id, "advance")?;

    // A manual advance supersedes whatever timer is pending for the session;
    // cancelling before the transition is what prevents a double advance.
    state.timers().cancel(session_id);

    let now = OffsetDateTime::now_utc();
    let default_seconds = state.config().default_advance_seconds();
    let total = quiz.questions.len();
    let quiz_for_target = quiz.clone();

    let (index, ends_at, question) = state
        .sessions()
        .transition(session_id, move |session| {
            session.ensure_phase(SessionPhase::Started)?;

            let target = match next_question_index {
                Some(index) => {
                    if index >= total {
                        return Err(ServiceError::Validation(format!(
                            "question index {index} out of range (quiz has {total} questions)"
                        )));
                    }
                    index
                }
                None => {
                    let current = session.current_question_index.ok_or_else(|| {
                        ServiceError::Internal("started session has no current question".into())
                    })?;
                    let next = current + 1;
                    if next >= total {
                        return Err(ServiceError::Conflict(
                            "no further questions to advance to".into(),
                        ));
                    }
                    next
                }
            };

            let question = quiz_for_target.question_at(target).ok_or_else(|| {
                ServiceError::Internal(format!("question at index {target} missing"))
            })?;

            let ends_at = match time_limit_seconds {
                Some(explicit) => now + seconds(explicit),
                None => match session.current_question_ends_at {
                    Some(previous) => previous + seconds(question.time_limit_seconds),
                    None => now + seconds(default_seconds),
                },
            };

            session.current_question_index = Some(target);
            session.current_question_ends_at = Some(ends_at);
            Ok((target, ends_at, QuestionSnapshot::from(question)))
        })
        .await?;

    events::broadcast_question_advanced(state, session_id, index, ends_at, question);
    timer_service::arm_countdown(state, session_id);

    Ok(AdvanceResponse {
        current_question_index: index,
        current_question_ends_at: ends_at,
    })
}

/// Terminate the session. Only read operations are accepted afterwards.
pub async fn finish_session(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    let session = state.sessions().snapshot(session_id).await?;
    let quiz = state.require_quiz(session.quiz_id).await?;
    ensure_author(&quiz, user_id, "finish")?;

    state.timers().cancel(session_id);

    let updated = state
        .sessions()
        .transition(session_id, |session| {
            session.ensure_phase(SessionPhase::Started)?;
            session.phase = SessionPhase::Finished;
            session.current_question_ends_at = None;
            Ok(session.clone())
        })
        .await?;

    broadcast_full_scores(state, session_id).await?;
    let snapshot = build_snapshot(state, &updated, &quiz);
    events::broadcast_session_state(state, &snapshot);
    Ok(snapshot)
}

/// Record an answer for the active question.
///
/// The row is appended to the ledger (history is never overwritten); scoring
/// later picks the latest row, so resubmitting before the deadline safely
/// replaces the effective selection.
pub async fn submit_answer(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
    question_id: Uuid,
    selected_answer_ids: Vec<Uuid>,
) -> Result<SubmitAnswerResponse, ServiceError> {
    if selected_answer_ids.is_empty() {
        return Err(ServiceError::Validation(
            "at least one answer must be selected".into(),
        ));
    }

    let session = state.sessions().snapshot(session_id).await?;
    session.ensure_phase(SessionPhase::Started)?;
    if !session.participants.contains_key(&user_id) {
        return Err(ServiceError::NotFound(format!(
            "participant `{user_id}` not found in session"
        )));
    }

    let quiz = state.require_quiz(session.quiz_id).await?;
    let question = quiz
        .question(question_id)
        .ok_or_else(|| ServiceError::NotFound(format!("question `{question_id}` not found")))?;

    let active_question_id = session
        .current_question_index
        .and_then(|index| quiz.question_at(index))
        .map(|question| question.id);
    if active_question_id != Some(question_id) {
        return Err(ServiceError::Conflict(
            "question is not the one currently being played".into(),
        ));
    }
    let Some(deadline) = session.current_question_ends_at else {
        return Err(ServiceError::Conflict(
            "question is no longer accepting answers".into(),
        ));
    };
    if timer_service::remaining_seconds(deadline, OffsetDateTime::now_utc()) == 0 {
        return Err(ServiceError::Conflict(
            "question deadline has passed".into(),
        ));
    }

    let submission = state
        .ledger()
        .append(session_id, user_id, question_id, selected_answer_ids);
    let is_correct = scoring::selection_is_correct(question, &submission.selected_answer_ids);

    // Correctness goes to the submitter only; broadcasting it would leak the
    // answer while the question is still open.
    events::send_targeted(
        state,
        session_id,
        user_id,
        events::EVENT_ANSWER_CONFIRMED,
        &crate::dto::events::AnswerConfirmedEvent {
            question_id,
            is_correct,
        },
    );

    let stats = build_question_stats(state, &session, question_id);
    events::broadcast_question_stats(state, session_id, &stats);

    Ok(SubmitAnswerResponse {
        question_id,
        is_correct,
    })
}

/// Final standings, recomputed from the ledger on every call.
pub async fn get_results(
    state: &SharedState,
    session_id: Uuid,
) -> Result<ResultsResponse, ServiceError> {
    let session = state.sessions().snapshot(session_id).await?;
    session.ensure_phase(SessionPhase::Finished)?;
    let quiz = state.require_quiz(session.quiz_id).await?;

    let results = session
        .participants
        .values()
        .map(|participant| {
            let submissions = state.ledger().for_participant(session_id, participant.user_id);
            let latest = scoring::latest_by_question(&submissions);
            let per_question_answers = quiz
                .questions
                .iter()
                .filter_map(|question| {
                    latest.get(&question.id).map(|submission| QuestionAnswerReview {
                        question_id: question.id,
                        selected_answer_ids: submission.selected_answer_ids.clone(),
                        is_correct: scoring::selection_is_correct(
                            question,
                            &submission.selected_answer_ids,
                        ),
                    })
                })
                .collect();

            ParticipantResult {
                participant: summary(participant),
                score: scoring::compute_score(&quiz, &submissions, None),
                per_question_answers,
            }
        })
        .collect();

    Ok(ResultsResponse {
        quiz_title: quiz.title.clone(),
        total_questions: quiz.questions.len(),
        results,
    })
}

/// Host-facing live view of who answered the active question.
pub async fn current_question_stats(
    state: &SharedState,
    session_id: Uuid,
) -> Result<QuestionStatsResponse, ServiceError> {
    let session = state.sessions().snapshot(session_id).await?;
    session.ensure_phase(SessionPhase::Started)?;
    let quiz = state.require_quiz(session.quiz_id).await?;

    let index = session
        .current_question_index
        .ok_or_else(|| ServiceError::Internal("started session has no current question".into()))?;
    let question = quiz
        .question_at(index)
        .ok_or_else(|| ServiceError::Internal(format!("question at index {index} missing")))?;

    Ok(build_question_stats(state, &session, question.id))
}

/// In-flight selection of a reconnecting participant, if the question they
/// answered is still active.
pub async fn restore_answer(
    state: &SharedState,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<Option<AnswerRestoreEvent>, ServiceError> {
    let session = state.sessions().snapshot(session_id).await?;
    if !session.question_active() {
        return Ok(None);
    }

    let quiz = state.require_quiz(session.quiz_id).await?;
    let Some(question) = session
        .current_question_index
        .and_then(|index| quiz.question_at(index))
    else {
        return Ok(None);
    };

    Ok(state
        .ledger()
        .latest_for(session_id, user_id, question.id)
        .map(|submission| AnswerRestoreEvent {
            question_id: submission.question_id,
            selected_answer_ids: submission.selected_answer_ids,
        }))
}

/// Flip a participant's connected flag off after their last socket dropped.
pub async fn mark_disconnected(state: &SharedState, session_id: Uuid, user_id: Uuid) {
    let result = state
        .sessions()
        .transition(session_id, |session| {
            let Some(participant) = session.participants.get_mut(&user_id) else {
                return Ok(false);
            };
            let was_connected = participant.connected;
            participant.connected = false;
            Ok(was_connected)
        })
        .await;

    match result {
        Ok(true) => events::broadcast_participant_disconnected(state, session_id, user_id),
        Ok(false) => {}
        Err(err) => debug!(%session_id, error = %err, "disconnect bookkeeping skipped"),
    }
}

/// Continue the session once the inter-question pause elapsed: activate the
/// next question, or finish when the expired question was the last.
///
/// Guarded on the expired question still being current with no deadline set,
/// so a manual advance or finish that raced the pause wins and this becomes
/// a no-op. Arming the follow-up countdown is left to the caller.
pub(crate) async fn auto_continue(
    state: &SharedState,
    session_id: Uuid,
    expired_index: usize,
) -> Result<AutoOutcome, ServiceError> {
    let session = state.sessions().snapshot(session_id).await?;
    let quiz = state.require_quiz(session.quiz_id).await?;
    let next_index = expired_index + 1;

    if let Some(question) = quiz.question_at(next_index) {
        let ends_at = OffsetDateTime::now_utc() + seconds(question.time_limit_seconds);
        let advanced = state
            .sessions()
            .transition(session_id, move |session| {
                if session.phase == SessionPhase::Started
                    && session.current_question_ends_at.is_none()
                    && session.current_question_index == Some(expired_index)
                {
                    session.current_question_index = Some(next_index);
                    session.current_question_ends_at = Some(ends_at);
                    Ok(true)
                } else {
                    Ok(false)
                }
            })
            .await?;

        if !advanced {
            return Ok(AutoOutcome::Superseded);
        }
        events::broadcast_question_advanced(state, session_id, next_index, ends_at, question.into());
        Ok(AutoOutcome::Advanced)
    } else {
        let finished = state
            .sessions()
            .transition(session_id, move |session| {
                if session.phase == SessionPhase::Started
                    && session.current_question_ends_at.is_none()
                    && session.current_question_index == Some(expired_index)
                {
                    session.phase = SessionPhase::Finished;
                    Ok(Some(session.clone()))
                } else {
                    Ok(None)
                }
            })
            .await?;

        let Some(updated) = finished else {
            return Ok(AutoOutcome::Superseded);
        };
        broadcast_full_scores(state, session_id).await?;
        let snapshot = build_snapshot(state, &updated, &quiz);
        events::broadcast_session_state(state, &snapshot);
        Ok(AutoOutcome::Finished)
    }
}

/// Broadcast the scoreboard with every revealed question counted.
pub(crate) async fn broadcast_full_scores(
    state: &SharedState,
    session_id: Uuid,
) -> Result<(), ServiceError> {
    let session = state.sessions().snapshot(session_id).await?;
    let quiz = state.require_quiz(session.quiz_id).await?;
    let scores = score_entries(state, &session, &quiz, None);
    events::broadcast_scores_update(state, session_id, scores, quiz.questions.len());
    Ok(())
}

/// Assemble the full client-facing view of a session.
pub(crate) fn build_snapshot(
    state: &SharedState,
    session: &Session,
    quiz: &QuizEntity,
) -> SessionSnapshot {
    let now = OffsetDateTime::now_utc();
    let question = session
        .current_question_index
        .and_then(|index| quiz.question_at(index))
        .map(QuestionSnapshot::from);

    // Live scores leave the question still being played out of the count.
    let exclude = if session.question_active() {
        session
            .current_question_index
            .and_then(|index| quiz.question_at(index))
            .map(|question| question.id)
    } else {
        None
    };
    let scores = score_entries(state, session, quiz, exclude);

    SessionSnapshot {
        id: session.id,
        quiz_id: session.quiz_id,
        quiz_title: quiz.title.clone(),
        code: session.code.clone(),
        phase: session.phase.as_str().to_string(),
        current_question_index: session.current_question_index,
        current_question_ends_at: session.current_question_ends_at,
        time_left_seconds: session
            .current_question_ends_at
            .map(|deadline| timer_service::remaining_seconds(deadline, now)),
        question,
        participants: session.participants.values().map(summary).collect(),
        scores,
        total_questions: quiz.questions.len(),
        created_at: session.created_at,
    }
}

fn score_entries(
    state: &SharedState,
    session: &Session,
    quiz: &QuizEntity,
    exclude_question_id: Option<Uuid>,
) -> Vec<ScoreEntry> {
    session
        .participants
        .values()
        .map(|participant| ScoreEntry {
            user_id: participant.user_id,
            display_name: participant.display_name.clone(),
            score: scoring::compute_score(
                quiz,
                &state.ledger().for_participant(session.id, participant.user_id),
                exclude_question_id,
            ),
        })
        .collect()
}

fn build_question_stats(
    state: &SharedState,
    session: &Session,
    question_id: Uuid,
) -> QuestionStatsResponse {
    let submissions = state
        .ledger()
        .latest_per_participant(session.id, question_id)
        .into_iter()
        .map(|submission| SubmissionView {
            user_id: submission.user_id,
            display_name: session
                .participants
                .get(&submission.user_id)
                .map(|participant| participant.display_name.clone())
                .unwrap_or_default(),
            selected_answer_ids: submission.selected_answer_ids,
            submitted_at: submission.submitted_at,
        })
        .collect();

    QuestionStatsResponse {
        question_id,
        total_participants: session.participants.len(),
        submissions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::broadcast::error::TryRecvError;

    use crate::{
        config::AppConfig,
        dao::{
            catalog::InMemoryQuizCatalog,
            models::{AnswerEntity, QuestionEntity, QuestionKind, QuizEntity},
        },
        dto::events::ServerEvent,
        state::{AppState, TimerKind},
    };

    fn question(time_limit_seconds: u64, correct: usize, total: usize) -> QuestionEntity {
        let answers = (0..total)
            .map(|position| AnswerEntity {
                id: Uuid::new_v4(),
                text: format!("answer {position}"),
                is_correct: position < correct,
            })
            .collect();
        QuestionEntity {
            id: Uuid::new_v4(),
            text: "which of these?".into(),
            kind: if correct > 1 {
                QuestionKind::MultipleChoice
            } else {
                QuestionKind::SingleChoice
            },
            time_limit_seconds,
            answers,
        }
    }

    fn quiz(questions: Vec<QuestionEntity>) -> QuizEntity {
        QuizEntity {
            id: Uuid::new_v4(),
            title: "Geography".into(),
            author_id: Uuid::new_v4(),
            questions,
        }
    }

    fn state_with(quiz: &QuizEntity) -> SharedState {
        let catalog = InMemoryQuizCatalog::new();
        catalog.insert(quiz.clone());
        AppState::new(AppConfig::default(), Arc::new(catalog))
    }

    async fn force_deadline(
        state: &SharedState,
        session_id: Uuid,
        deadline: Option<OffsetDateTime>,
    ) {
        state
            .sessions()
            .transition(session_id, |session| {
                session.current_question_ends_at = deadline;
                Ok(())
            })
            .await
            .unwrap();
    }

    fn drain(
        receiver: &mut tokio::sync::broadcast::Receiver<ServerEvent>,
    ) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        loop {
            match receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
        events
    }

    #[tokio::test]
    async fn create_session_requires_the_quiz_author() {
        let quiz = quiz(vec![question(30, 1, 2)]);
        let state = state_with(&quiz);

        let err = create_session(&state, quiz.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let snapshot = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        assert_eq!(snapshot.phase, "CREATED");
        assert_eq!(snapshot.code.len(), crate::state::session::JOIN_CODE_LENGTH);
    }

    #[tokio::test]
    async fn create_session_rejects_a_quiz_without_questions() {
        let quiz = quiz(Vec::new());
        let state = state_with(&quiz);
        let err = create_session(&state, quiz.id, quiz.author_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn join_is_idempotent_per_user() {
        let quiz = quiz(vec![question(30, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();

        let user = Uuid::new_v4();
        let first = join(&state, user, &session.code, "Ada".into(), false)
            .await
            .unwrap();
        let second = join(&state, user, &session.code, "Ada again".into(), false)
            .await
            .unwrap();

        assert_eq!(first.session_id, second.session_id);
        assert_eq!(first.quiz_id, second.quiz_id);

        let snapshot = get_state(&state, session.id).await.unwrap();
        assert_eq!(snapshot.participants.len(), 1);
        // The original display name sticks.
        assert_eq!(snapshot.participants[0].display_name, "Ada");
    }

    #[tokio::test]
    async fn join_with_an_unknown_code_is_not_found() {
        let quiz = quiz(vec![question(30, 1, 2)]);
        let state = state_with(&quiz);
        let err = join(&state, Uuid::new_v4(), "ZZZZZZ", "Ada".into(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn start_activates_the_first_question() {
        let quiz = quiz(vec![question(60, 1, 2), question(45, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();

        let err = start_quiz(&state, session.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let mut receiver = state.hub().subscribe(session.id);
        let started = start_quiz(&state, session.id, quiz.author_id).await.unwrap();
        assert_eq!(started.phase, "STARTED");
        assert_eq!(started.current_question_index, Some(0));

        let ends_at = started.current_question_ends_at.unwrap();
        let remaining = timer_service::remaining_seconds(ends_at, OffsetDateTime::now_utc());
        assert!((58..=60).contains(&remaining), "remaining was {remaining}");

        let events = drain(&mut receiver);
        assert!(events.iter().any(|e| e.name == events::EVENT_SESSION_STARTED));
        assert!(events.iter().any(|e| e.name == events::EVENT_QUESTION_ADVANCED));

        // Starting twice must fail the phase guard, not restart the countdown.
        let err = start_quiz(&state, session.id, quiz.author_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn snapshot_time_left_is_derived_from_the_absolute_deadline() {
        let quiz = quiz(vec![question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();

        // Two observers fetching independently agree within a second.
        let first = get_state(&state, session.id).await.unwrap();
        let second = get_state(&state, session.id).await.unwrap();
        assert_eq!(first.current_question_ends_at, second.current_question_ends_at);
        let a = first.time_left_seconds.unwrap();
        let b = second.time_left_seconds.unwrap();
        assert!(a.abs_diff(b) <= 1);
    }

    #[tokio::test]
    async fn submit_requires_a_registered_participant() {
        let quiz = quiz(vec![question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        let question_id = quiz.questions[0].id;

        // Before start: the session phase guard rejects the submission.
        let err = submit_answer(&state, session.id, Uuid::new_v4(), question_id, vec![Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        start_quiz(&state, session.id, quiz.author_id).await.unwrap();
        let err = submit_answer(&state, session.id, Uuid::new_v4(), question_id, vec![Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn submit_rejects_an_empty_selection() {
        let quiz = quiz(vec![question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        let user = Uuid::new_v4();
        join(&state, user, &session.code, "Ada".into(), false).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();

        let err = submit_answer(&state, session.id, user, quiz.questions[0].id, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn submit_confirms_correctness_and_broadcasts_stats() {
        let quiz = quiz(vec![question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        let user = Uuid::new_v4();
        join(&state, user, &session.code, "Ada".into(), false).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();

        let mut receiver = state.hub().subscribe(session.id);
        let q = &quiz.questions[0];
        let ack = submit_answer(&state, session.id, user, q.id, q.correct_answer_ids())
            .await
            .unwrap();
        assert!(ack.is_correct);

        let events_seen = drain(&mut receiver);
        let stats = events_seen
            .iter()
            .find(|e| e.name == events::EVENT_QUESTION_STATS)
            .expect("stats broadcast missing");
        assert_eq!(stats.data["total_participants"], 1);
        assert_eq!(stats.data["submissions"].as_array().unwrap().len(), 1);
        // Correctness must not appear anywhere in the broadcast payload.
        assert!(stats.data.get("is_correct").is_none());

        let wrong = vec![q.answers[1].id];
        let ack = submit_answer(&state, session.id, user, q.id, wrong).await.unwrap();
        assert!(!ack.is_correct);

        let stats = current_question_stats(&state, session.id).await.unwrap();
        // Resubmission overwrites the effective row instead of adding one.
        assert_eq!(stats.submissions.len(), 1);
        assert_eq!(stats.submissions[0].selected_answer_ids, vec![q.answers[1].id]);
    }

    #[tokio::test]
    async fn submissions_are_rejected_for_inactive_questions() {
        let quiz = quiz(vec![question(60, 1, 2), question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        let user = Uuid::new_v4();
        join(&state, user, &session.code, "Ada".into(), false).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();

        // Second question is not active yet.
        let later = &quiz.questions[1];
        let err = submit_answer(&state, session.id, user, later.id, vec![later.answers[0].id])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // Once the deadline is exhausted the active question closes too.
        force_deadline(&state, session.id, Some(OffsetDateTime::now_utc())).await;
        let q = &quiz.questions[0];
        let err = submit_answer(&state, session.id, user, q.id, vec![q.answers[0].id])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn two_participants_score_one_and_zero() {
        let quiz = quiz(vec![question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();

        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        join(&state, alice, &session.code, "Alice".into(), false).await.unwrap();
        join(&state, bob, &session.code, "Bob".into(), false).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();

        let q = &quiz.questions[0];
        submit_answer(&state, session.id, alice, q.id, q.correct_answer_ids())
            .await
            .unwrap();
        submit_answer(&state, session.id, bob, q.id, vec![q.answers[1].id])
            .await
            .unwrap();

        // The single question expires and the pause runs out.
        let mut receiver = state.hub().subscribe(session.id);
        force_deadline(&state, session.id, Some(OffsetDateTime::now_utc())).await;
        timer_service::process_expiry(&state, session.id).await.unwrap();

        let events_seen = drain(&mut receiver);
        let scores = events_seen
            .iter()
            .find(|e| e.name == events::EVENT_SCORES_UPDATE)
            .expect("scores broadcast missing");
        let rows = scores.data["scores"].as_array().unwrap();
        assert_eq!(rows[0]["score"], 1);
        assert_eq!(rows[1]["score"], 0);
        assert_eq!(scores.data["total_questions"], 1);

        let outcome = auto_continue(&state, session.id, 0).await.unwrap();
        assert_eq!(outcome, AutoOutcome::Finished);

        let results = get_results(&state, session.id).await.unwrap();
        assert_eq!(results.total_questions, 1);
        assert_eq!(results.results[0].score, 1);
        assert_eq!(results.results[1].score, 0);
    }

    #[tokio::test]
    async fn latest_submission_wins_in_results() {
        let quiz = quiz(vec![question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        let user = Uuid::new_v4();
        join(&state, user, &session.code, "Ada".into(), false).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();

        let q = &quiz.questions[0];
        submit_answer(&state, session.id, user, q.id, vec![q.answers[1].id])
            .await
            .unwrap();
        submit_answer(&state, session.id, user, q.id, q.correct_answer_ids())
            .await
            .unwrap();

        finish_session(&state, session.id, quiz.author_id).await.unwrap();
        let results = get_results(&state, session.id).await.unwrap();
        assert_eq!(results.results[0].score, 1);
        let review = &results.results[0].per_question_answers[0];
        assert!(review.is_correct);
        assert_eq!(review.selected_answer_ids, q.correct_answer_ids());
    }

    #[tokio::test]
    async fn advance_with_an_explicit_limit_counts_from_now() {
        let quiz = quiz(vec![question(60, 1, 2), question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();

        let response = advance_question(&state, session.id, quiz.author_id, None, Some(45))
            .await
            .unwrap();
        assert_eq!(response.current_question_index, 1);
        let remaining = timer_service::remaining_seconds(
            response.current_question_ends_at,
            OffsetDateTime::now_utc(),
        );
        assert!((43..=45).contains(&remaining), "remaining was {remaining}");
    }

    #[tokio::test]
    async fn advance_without_a_limit_extends_the_previous_deadline() {
        let quiz = quiz(vec![question(60, 1, 2), question(20, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        let started = start_quiz(&state, session.id, quiz.author_id).await.unwrap();
        let previous = started.current_question_ends_at.unwrap();

        let response = advance_question(&state, session.id, quiz.author_id, None, None)
            .await
            .unwrap();
        // Previous deadline plus the target question's 20 second limit.
        assert_eq!(
            response.current_question_ends_at,
            previous + TimeDuration::seconds(20)
        );
    }

    #[tokio::test]
    async fn advance_without_a_limit_or_deadline_defaults_to_thirty_seconds() {
        let quiz = quiz(vec![question(60, 1, 2), question(20, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();
        // Mid-pause: no deadline stands.
        force_deadline(&state, session.id, None).await;

        let response = advance_question(&state, session.id, quiz.author_id, None, None)
            .await
            .unwrap();
        let remaining = timer_service::remaining_seconds(
            response.current_question_ends_at,
            OffsetDateTime::now_utc(),
        );
        assert!((28..=30).contains(&remaining), "remaining was {remaining}");
    }

    #[tokio::test]
    async fn advance_validates_the_explicit_index() {
        let quiz = quiz(vec![question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();

        let err = advance_question(&state, session.id, quiz.author_id, Some(7), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // No next question to fall through to either.
        let err = advance_question(&state, session.id, quiz.author_id, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = advance_question(&state, session.id, Uuid::new_v4(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn finished_sessions_are_immutable() {
        let quiz = quiz(vec![question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        let user = Uuid::new_v4();
        join(&state, user, &session.code, "Ada".into(), false).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();
        let q = &quiz.questions[0];
        submit_answer(&state, session.id, user, q.id, q.correct_answer_ids())
            .await
            .unwrap();

        finish_session(&state, session.id, quiz.author_id).await.unwrap();

        assert!(matches!(
            start_quiz(&state, session.id, quiz.author_id).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            advance_question(&state, session.id, quiz.author_id, None, None).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            submit_answer(&state, session.id, user, q.id, q.correct_answer_ids()).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            join(&state, Uuid::new_v4(), &session.code, "Late".into(), false).await,
            Err(ServiceError::Conflict(_))
        ));

        let first = get_results(&state, session.id).await.unwrap();
        let second = get_results(&state, session.id).await.unwrap();
        assert_eq!(first.results[0].score, second.results[0].score);
        assert_eq!(first.results.len(), second.results.len());
    }

    #[tokio::test]
    async fn results_are_only_available_once_finished() {
        let quiz = quiz(vec![question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        let err = get_results(&state, session.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn expiry_fires_exactly_once() {
        let quiz = quiz(vec![question(60, 1, 2), question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();
        force_deadline(&state, session.id, Some(OffsetDateTime::now_utc())).await;

        let mut receiver = state.hub().subscribe(session.id);
        timer_service::process_expiry(&state, session.id).await.unwrap();
        timer_service::process_expiry(&state, session.id).await.unwrap();

        let expired_events = drain(&mut receiver)
            .into_iter()
            .filter(|e| e.name == events::EVENT_TIMER_EXPIRED)
            .count();
        assert_eq!(expired_events, 1);

        let snapshot = get_state(&state, session.id).await.unwrap();
        assert_eq!(snapshot.current_question_ends_at, None);
        assert_eq!(snapshot.current_question_index, Some(0));
        assert_eq!(state.timers().armed_kind(session.id), Some(TimerKind::Pause));
        state.timers().cancel(session.id);
    }

    #[tokio::test]
    async fn auto_continue_advances_exactly_once() {
        let quiz = quiz(vec![question(60, 1, 2), question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();
        // Mid-pause after question 0.
        force_deadline(&state, session.id, None).await;

        let first = auto_continue(&state, session.id, 0).await.unwrap();
        assert_eq!(first, AutoOutcome::Advanced);
        let second = auto_continue(&state, session.id, 0).await.unwrap();
        assert_eq!(second, AutoOutcome::Superseded);

        let snapshot = get_state(&state, session.id).await.unwrap();
        assert_eq!(snapshot.current_question_index, Some(1));
    }

    #[tokio::test]
    async fn manual_advance_supersedes_the_pending_auto_advance() {
        let quiz = quiz(vec![question(60, 1, 2), question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();
        force_deadline(&state, session.id, None).await;

        // The host advances manually before the pause callback fires.
        advance_question(&state, session.id, quiz.author_id, None, Some(30))
            .await
            .unwrap();

        // The stale pause callback must not advance a second time.
        let outcome = auto_continue(&state, session.id, 0).await.unwrap();
        assert_eq!(outcome, AutoOutcome::Superseded);
        let snapshot = get_state(&state, session.id).await.unwrap();
        assert_eq!(snapshot.current_question_index, Some(1));
    }

    #[tokio::test]
    async fn live_scores_exclude_the_active_question() {
        let quiz = quiz(vec![question(60, 1, 2), question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        let user = Uuid::new_v4();
        join(&state, user, &session.code, "Ada".into(), false).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();

        let q = &quiz.questions[0];
        submit_answer(&state, session.id, user, q.id, q.correct_answer_ids())
            .await
            .unwrap();

        // While the question is active the correct answer must not show up.
        let snapshot = get_state(&state, session.id).await.unwrap();
        assert_eq!(snapshot.scores[0].score, 0);

        // Once expired it counts.
        force_deadline(&state, session.id, Some(OffsetDateTime::now_utc())).await;
        timer_service::process_expiry(&state, session.id).await.unwrap();
        state.timers().cancel(session.id);
        let snapshot = get_state(&state, session.id).await.unwrap();
        assert_eq!(snapshot.scores[0].score, 1);
    }

    #[tokio::test]
    async fn restore_answer_returns_the_in_flight_selection() {
        let quiz = quiz(vec![question(60, 1, 2)]);
        let state = state_with(&quiz);
        let session = create_session(&state, quiz.id, quiz.author_id).await.unwrap();
        let user = Uuid::new_v4();
        join(&state, user, &session.code, "Ada".into(), false).await.unwrap();
        start_quiz(&state, session.id, quiz.author_id).await.unwrap();

        assert!(restore_answer(&state, session.id, user).await.unwrap().is_none());

        let q = &quiz.questions[0];
        submit_answer(&state, session.id, user, q.id, vec![q.answers[1].id])
            .await
            .unwrap();

        let restored = restore_answer(&state, session.id, user).await.unwrap().unwrap();
        assert_eq!(restored.question_id, q.id);
        assert_eq!(restored.selected_answer_ids, vec![q.answers[1].id]);
    }
}
