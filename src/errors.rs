use thiserror::Error;

#[derive(Debug, Error)]
pub enum PointClawError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Target window unavailable: {0}")]
    WindowUnavailable(String),

    #[error("Cell index {index} out of range (valid: 1..={max})")]
    OutOfRange { index: u32, max: u32 },

    #[error("Point ({x}, {y}) lies outside the grid region")]
    OutOfBounds { x: i32, y: i32 },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Rate limit exceeded for '{user}': more than {limit} commands in {window_secs}s")]
    RateLimitExceeded {
        user: String,
        limit: u32,
        window_secs: u64,
    },

    #[error("Consolidation failed: {0}")]
    ConsolidationFailure(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Run cancelled")]
    Cancelled,
}

impl PointClawError {
    /// Errors the loop absorbs as a skipped iteration instead of surfacing.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PointClawError::WindowUnavailable(_)
                | PointClawError::MalformedResponse(_)
                | PointClawError::RateLimitExceeded { .. }
                | PointClawError::ConsolidationFailure(_)
        )
    }
}

pub type PointClawResult<T> = Result<T, PointClawError>;
