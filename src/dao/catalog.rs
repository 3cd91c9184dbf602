use std::{error::Error, fs, path::Path};

use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt};
use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::QuizEntity;

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Error raised by catalog backends regardless of the underlying store.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog backend could not serve the request.
    #[error("quiz catalog unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl CatalogError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        CatalogError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Abstraction over the quiz authoring subsystem, read-only from this side.
pub trait QuizCatalog: Send + Sync {
    /// Fetch a quiz definition by id.
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, CatalogResult<Option<QuizEntity>>>;
    /// List the available quizzes as (id, title) pairs.
    fn list_quizzes(&self) -> BoxFuture<'static, CatalogResult<Vec<(Uuid, String)>>>;
}

/// Catalog backed by an in-process map, seeded from a JSON file at startup.
#[derive(Default)]
pub struct InMemoryQuizCatalog {
    quizzes: DashMap<Uuid, QuizEntity>,
}

impl InMemoryQuizCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load quiz definitions from a JSON file containing a list of quizzes.
    pub fn from_file(path: &Path) -> CatalogResult<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            CatalogError::unavailable(format!("reading quiz file `{}`", path.display()), err)
        })?;
        let quizzes: Vec<QuizEntity> = serde_json::from_str(&contents).map_err(|err| {
            CatalogError::unavailable(format!("parsing quiz file `{}`", path.display()), err)
        })?;

        let catalog = Self::new();
        for quiz in quizzes {
            catalog.insert(quiz);
        }
        Ok(catalog)
    }

    /// Register a quiz definition, replacing any previous one with the same id.
    pub fn insert(&self, quiz: QuizEntity) {
        self.quizzes.insert(quiz.id, quiz);
    }

    /// Number of quizzes currently registered.
    pub fn len(&self) -> usize {
        self.quizzes.len()
    }

    /// Whether the catalog holds no quizzes at all.
    pub fn is_empty(&self) -> bool {
        self.quizzes.is_empty()
    }
}

impl QuizCatalog for InMemoryQuizCatalog {
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, CatalogResult<Option<QuizEntity>>> {
        let quiz = self.quizzes.get(&id).map(|entry| entry.value().clone());
        future::ready(Ok(quiz)).boxed()
    }

    fn list_quizzes(&self) -> BoxFuture<'static, CatalogResult<Vec<(Uuid, String)>>> {
        let quizzes = self
            .quizzes
            .iter()
            .map(|entry| (entry.id, entry.title.clone()))
            .collect();
        future::ready(Ok(quizzes)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{AnswerEntity, QuestionEntity, QuestionKind};

    fn sample_quiz() -> QuizEntity {
        QuizEntity {
            id: Uuid::new_v4(),
            title: "Capitals".into(),
            author_id: Uuid::new_v4(),
            questions: vec![QuestionEntity {
                id: Uuid::new_v4(),
                text: "Capital of France?".into(),
                kind: QuestionKind::SingleChoice,
                time_limit_seconds: 20,
                answers: vec![
                    AnswerEntity {
                        id: Uuid::new_v4(),
                        text: "Paris".into(),
                        is_correct: true,
                    },
                    AnswerEntity {
                        id: Uuid::new_v4(),
                        text: "Lyon".into(),
                        is_correct: false,
                    },
                ],
            }],
        }
    }

    #[tokio::test]
    async fn find_returns_inserted_quiz() {
        let catalog = InMemoryQuizCatalog::new();
        let quiz = sample_quiz();
        let id = quiz.id;
        catalog.insert(quiz);

        let found = catalog.find_quiz(id).await.unwrap();
        assert_eq!(found.map(|quiz| quiz.id), Some(id));
    }

    #[tokio::test]
    async fn find_unknown_returns_none() {
        let catalog = InMemoryQuizCatalog::new();
        assert!(catalog.find_quiz(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[test]
    fn correct_answer_ids_follow_authoring_order() {
        let quiz = sample_quiz();
        let question = &quiz.questions[0];
        assert_eq!(question.correct_answer_ids(), vec![question.answers[0].id]);
    }
}
