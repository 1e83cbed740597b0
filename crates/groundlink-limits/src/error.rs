/// Failure raised by a limits response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    /// The response reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The response panicked.
    #[error("response panicked: {0}")]
    Panicked(String),
}

impl ResponseError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
