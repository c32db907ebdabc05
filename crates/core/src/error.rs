use thiserror::Error;

/// Errors surfaced by the streaming pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// `start` was called while a previous run is still executing.
    #[error("the service is already running")]
    AlreadyRunning,

    /// Work was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The submitter was disposed and accepts no more submissions.
    #[error("submitter has been disposed")]
    Disposed,

    /// The outbound half of a stream session is no longer writable.
    #[error("stream session {0} is closed")]
    StreamClosed(String),

    /// Channel setup failed.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The collector answered with a non-OK status.
    #[error("collector returned {0}")]
    Status(#[from] tonic::Status),

    /// The service body panicked.
    #[error("service body panicked: {0}")]
    Panicked(String),

    /// Config file could not be read.
    #[error("config io error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Config file is not valid TOML for the expected shape.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A wire message could not be decoded into the domain record.
    #[error("invalid wire message: {0}")]
    InvalidWire(String),
}

impl Error {
    /// Whether this error represents cancellation rather than failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result alias for the pipeline.
pub type Result<T, E = Error> = std::result::Result<T, E>;
