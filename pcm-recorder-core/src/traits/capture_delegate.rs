use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::CaptureState;

/// Event delegate for capture session notifications.
///
/// All methods are called from whichever thread drives the change: the
/// caller's thread for `start`/`stop`, the capture thread otherwise.
/// Implementations must not call back into the session.
pub trait CaptureDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &CaptureState);

    /// Called when a fatal error ends the session.
    fn on_error(&self, error: &CaptureError);

    /// Called when the output file has been finalized.
    fn on_capture_finished(&self, result: &RecordingResult);
}
