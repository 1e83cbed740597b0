/// Errors produced by background work or by the runner itself.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The work reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The work panicked.
    #[error("task {task} panicked: {message}")]
    Panicked { task: String, message: String },

    /// No tokio runtime is reachable from the calling thread.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// Any other error raised by the work.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(error))
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
