//! Read-only quiz catalog boundary. Quiz authoring and durable persistence
//! live outside this service; the orchestrator only ever reads quiz
//! definitions through the [`catalog::QuizCatalog`] trait.

pub mod catalog;
pub mod models;
