use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{AnswerEntity, QuestionEntity, QuestionKind};

/// One selectable answer as shown to participants. The correctness flag is
/// deliberately absent: snapshots are broadcast while the question is open.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerSnapshot {
    /// Identifier to send back in a submission.
    pub id: Uuid,
    /// Answer text.
    pub text: String,
}

impl From<&AnswerEntity> for AnswerSnapshot {
    fn from(answer: &AnswerEntity) -> Self {
        Self {
            id: answer.id,
            text: answer.text.clone(),
        }
    }
}

/// A question as shown to participants while it is being played.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionSnapshot {
    /// Question identifier.
    pub id: Uuid,
    /// Question text.
    pub text: String,
    /// Single or multiple choice.
    pub kind: QuestionKind,
    /// Countdown length for this question, in seconds.
    pub time_limit_seconds: u64,
    /// Candidate answers in authoring order, correctness stripped.
    pub answers: Vec<AnswerSnapshot>,
}

impl From<&QuestionEntity> for QuestionSnapshot {
    fn from(question: &QuestionEntity) -> Self {
        Self {
            id: question.id,
            text: question.text.clone(),
            kind: question.kind,
            time_limit_seconds: question.time_limit_seconds,
            answers: question.answers.iter().map(Into::into).collect(),
        }
    }
}

/// Catalog listing entry for host UIs.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuizListItem {
    /// Quiz identifier.
    pub id: Uuid,
    /// Quiz title.
    pub title: String,
}
