use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),
    #[error("Source file missing: {0}")]
    SourceMissing(String),
    #[error("Embedding service failure: {0}")]
    EmbeddingService(String),
    #[error("LLM endpoint unreachable: {0}. Check that the model endpoint is running and that the configured base URL is reachable from this host.")]
    LlmUnreachable(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Processing error: {0}")]
    Processing(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
