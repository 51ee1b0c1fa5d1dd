use thiserror::Error;

/// Errors that can occur while running a capture session.
///
/// Fatal variants abort the session; `AlreadyActive` / `NotActive` reject a
/// call without touching any state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("audio source not initialized: {0}")]
    SourceNotInitialized(String),

    #[error("audio source read failed: {0}")]
    SourceReadFailure(String),

    #[error("encoder failure: {0}")]
    EncoderFailure(String),

    #[error("sink I/O failure: {0}")]
    SinkIoFailure(String),

    #[error("a capture session is already active")]
    AlreadyActive,

    #[error("no capture session is active")]
    NotActive,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("capture thread panicked: {0}")]
    CaptureThreadPanicked(String),
}

impl CaptureError {
    /// Whether this error ends the session it occurred in.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::AlreadyActive | Self::NotActive)
    }
}
