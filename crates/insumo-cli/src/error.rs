use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        hint: Option<String>,
    },
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("request queue is closed")]
    QueueClosed,
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}
