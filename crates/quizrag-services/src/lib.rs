//! Service container for the quiz generator retrieval core.
//!
//! [`QuizRagServices`] is built once at startup, from an [`AppConfig`] and
//! the external models it cannot construct itself, and shared by `Arc` with
//! every request handler. It owns the cache gateway and the retrieval
//! orchestrator; there are no process-wide singletons.
//!
//! [`AppConfig`]: quizrag_config::AppConfig

pub mod error;
pub mod services;
pub mod telemetry;
pub mod wiring;

pub use error::{ServiceError, ServiceResult};
pub use services::{search_identifier, CachedSearch, Collaborators, QuizRagServices};
pub use telemetry::init_tracing;
