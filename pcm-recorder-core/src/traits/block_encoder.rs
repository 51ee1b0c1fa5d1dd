use std::time::Duration;

use crate::models::config::EncoderFormat;
use crate::models::error::CaptureError;

/// Description of a dequeued output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputBufferInfo {
    pub index: usize,
    pub offset: usize,
    pub size: usize,
    pub presentation_time_us: u64,
    /// Codec-config / stream metadata rather than audio payload.
    pub is_config: bool,
    pub end_of_stream: bool,
}

/// A block-oriented encoder driven through indexed input and output slots.
///
/// Input: `dequeue_input_buffer` → fill `input_buffer(i)` → `queue_input_buffer`.
/// Output: `dequeue_output_buffer` → read `output_buffer(i)` → `release_output_buffer`.
///
/// An index is only valid between its dequeue and its queue/release.
/// Platform encoders implement this trait; `SoftwareEncoder` is the
/// in-process implementation.
pub trait BlockEncoder: Send {
    fn name(&self) -> &str;

    fn configure(&mut self, format: &EncoderFormat) -> Result<(), CaptureError>;

    fn start(&mut self) -> Result<(), CaptureError>;

    /// Index of a free input slot, or `None` if none frees up within `timeout`.
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> Result<Option<usize>, CaptureError>;

    /// Writable storage of a dequeued input slot (its full capacity).
    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8], CaptureError>;

    fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        presentation_time_us: u64,
        end_of_stream: bool,
    ) -> Result<(), CaptureError>;

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<Option<OutputBufferInfo>, CaptureError>;

    /// Storage of a dequeued output slot; valid bytes are `info.offset..info.offset + info.size`.
    fn output_buffer(&self, index: usize) -> Result<&[u8], CaptureError>;

    fn release_output_buffer(&mut self, index: usize) -> Result<(), CaptureError>;

    /// Stop encoding. Pending output is discarded by the encoder.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Free all encoder resources. Idempotent.
    fn release(&mut self);
}

/// Creates block encoders for new sessions.
pub trait EncoderProvider: Send + Sync {
    fn create(&self, format: &EncoderFormat) -> Result<Box<dyn BlockEncoder>, CaptureError>;
}

impl<F> EncoderProvider for F
where
    F: Fn(&EncoderFormat) -> Result<Box<dyn BlockEncoder>, CaptureError> + Send + Sync,
{
    fn create(&self, format: &EncoderFormat) -> Result<Box<dyn BlockEncoder>, CaptureError> {
        self(format)
    }
}
