use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading the metric catalogs
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to open metric catalog {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed row in {catalog} catalog")]
    Row {
        catalog: &'static str,
        #[source]
        source: csv::Error,
    },
}

/// Errors raised while building a [`crate::content::Content`]
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("unknown content type '{content_type}', expected one of: {}", allowed.join(", "))]
    UnknownContentType {
        content_type: String,
        allowed: Vec<String>,
    },
}

/// Errors raised by a chat backend
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("environment variable {0} not found")]
    MissingApiKey(String),
    #[error("failed to build chat request: {0}")]
    Request(String),
    #[error("chat completion call failed: {0}")]
    Http(#[from] async_openai::error::OpenAIError),
    #[error("chat completion returned no content")]
    EmptyResponse,
    #[error("chat completion did not call tool '{0}'")]
    MissingToolCall(String),
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
}

/// Errors raised by the grading cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to access grading cache {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("grading cache {} is corrupt", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("grading cache lock poisoned")]
    Poisoned,
}

/// Errors raised while computing LLM-judged metrics
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("metric '{metric}' failed")]
    Metric {
        metric: String,
        #[source]
        source: LlmError,
    },
}

impl EvalError {
    /// Name of the metric that failed
    pub fn metric(&self) -> &str {
        match self {
            EvalError::Metric { metric, .. } => metric,
        }
    }
}

/// Errors raised while extracting content insights
#[derive(Debug, Error)]
pub enum InsightError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("content insights did not match the expected schema")]
    Schema(#[source] serde_json::Error),
    #[error("expected 3-4 search queries, got {0}")]
    SearchQueryCount(usize),
}
