use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Discriminates how many answers a question expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    /// Exactly one answer is correct.
    SingleChoice,
    /// One or more answers are correct; all of them must be selected.
    MultipleChoice,
}

/// One selectable answer of a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEntity {
    /// Stable identifier of the answer.
    pub id: Uuid,
    /// Text shown to participants.
    pub text: String,
    /// Whether this answer belongs to the correct set.
    pub is_correct: bool,
}

/// One question of a quiz, with its ordered-by-insertion answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionEntity {
    /// Stable identifier of the question.
    pub id: Uuid,
    /// Question text.
    pub text: String,
    /// Single or multiple choice.
    pub kind: QuestionKind,
    /// Countdown length for this question, in seconds.
    pub time_limit_seconds: u64,
    /// Candidate answers in authoring order.
    pub answers: Vec<AnswerEntity>,
}

impl QuestionEntity {
    /// Ids of the answers flagged correct, in authoring order.
    pub fn correct_answer_ids(&self) -> Vec<Uuid> {
        self.answers
            .iter()
            .filter(|answer| answer.is_correct)
            .map(|answer| answer.id)
            .collect()
    }
}

/// A quiz definition as provided by the external authoring subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizEntity {
    /// Stable identifier of the quiz.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// User that authored the quiz; only this user may run host commands.
    pub author_id: Uuid,
    /// Ordered sequence of questions.
    pub questions: Vec<QuestionEntity>,
}

impl QuizEntity {
    /// Look a question up by its identifier.
    pub fn question(&self, id: Uuid) -> Option<&QuestionEntity> {
        self.questions.iter().find(|question| question.id == id)
    }

    /// Question at the given position in the quiz order.
    pub fn question_at(&self, index: usize) -> Option<&QuestionEntity> {
        self.questions.get(index)
    }
}
