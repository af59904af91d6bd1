use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    // Worker errors
    #[error("Worker failed: {worker}: {message}")]
    WorkerFailed { worker: String, message: String },

    #[error("Worker timeout after {timeout_secs}s: {worker}")]
    WorkerTimeout { worker: String, timeout_secs: u64 },

    // Graph errors
    #[error("Recursion limit of {limit} steps reached without hitting a terminal step")]
    RecursionExceeded { limit: usize },

    #[error("Step not found in graph: {0}")]
    UnknownStep(String),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Run timed out after {0}s")]
    RunTimeout(u64),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;
