//! Pure scoring functions. Scores are recomputed from the ledger on every
//! call — submissions can change until a question's deadline, so nothing
//! here is cached.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    dao::models::{QuestionEntity, QuizEntity},
    state::ledger::AnswerSubmission,
};

/// Whether a selection matches the question's correct answer set.
///
/// Both sides are sorted and compared pairwise: same length, same ids. This
/// is deliberately structural rather than set-based so duplicated ids in a
/// selection cannot fake a match.
pub fn selection_is_correct(question: &QuestionEntity, selected: &[Uuid]) -> bool {
    let mut selected = selected.to_vec();
    selected.sort();
    let mut correct = question.correct_answer_ids();
    correct.sort();
    selected == correct
}

/// Reduce one participant's submissions to the latest row per question.
pub fn latest_by_question(submissions: &[AnswerSubmission]) -> HashMap<Uuid, &AnswerSubmission> {
    let mut latest: HashMap<Uuid, &AnswerSubmission> = HashMap::new();
    for submission in submissions {
        match latest.get(&submission.question_id) {
            Some(existing)
                if (existing.submitted_at, existing.seq)
                    >= (submission.submitted_at, submission.seq) => {}
            _ => {
                latest.insert(submission.question_id, submission);
            }
        }
    }
    latest
}

/// Count the questions one participant answered correctly.
///
/// `exclude_question_id` leaves the still-active question out of live views
/// so correctness is not revealed before its deadline.
pub fn compute_score(
    quiz: &QuizEntity,
    submissions: &[AnswerSubmission],
    exclude_question_id: Option<Uuid>,
) -> usize {
    latest_by_question(submissions)
        .iter()
        .filter(|(question_id, _)| Some(**question_id) != exclude_question_id)
        .filter(|(question_id, submission)| {
            quiz.question(**question_id)
                .is_some_and(|question| {
                    selection_is_correct(question, &submission.selected_answer_ids)
                })
        })
        .count()
}
