use std::time::Duration;

use crate::models::audio_models::PcmFormat;
use crate::models::config::CaptureAuthorization;
use crate::models::error::CaptureError;

/// A blocking producer of interleaved PCM bytes.
///
/// Implemented by:
/// - `ReaderSource` (any `Read` byte stream)
/// - `CommandSource` (external capture process)
/// - `ToneSource` (synthetic sine)
pub trait FrameSource: Send {
    /// Format of the bytes returned by `read_into`.
    fn format(&self) -> PcmFormat;

    /// Smallest internal buffer the source keeps, in bytes.
    ///
    /// Callers read with half of this so the source is drained well before
    /// it can overrun.
    fn min_buffer_size(&self) -> usize;

    /// Begin delivering audio.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Copy available bytes into `buf`.
    ///
    /// Blocks for at most `timeout`. Returns `Some(n)` with `n > 0` when data
    /// was copied, `Some(0)` only at end of stream, and `None` when the
    /// timeout elapsed with nothing available. A zero timeout polls.
    fn read_into(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, CaptureError>;

    /// Stop the device and release it. Idempotent.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Human-readable name for logs.
    fn description(&self) -> String;
}

/// Opens frame sources for new sessions.
pub trait SourceProvider: Send + Sync {
    fn open(
        &self,
        format: &PcmFormat,
        authorization: Option<&CaptureAuthorization>,
    ) -> Result<Box<dyn FrameSource>, CaptureError>;
}

impl<F> SourceProvider for F
where
    F: Fn(&PcmFormat, Option<&CaptureAuthorization>) -> Result<Box<dyn FrameSource>, CaptureError>
        + Send
        + Sync,
{
    fn open(
        &self,
        format: &PcmFormat,
        authorization: Option<&CaptureAuthorization>,
    ) -> Result<Box<dyn FrameSource>, CaptureError> {
        self(format, authorization)
    }
}
