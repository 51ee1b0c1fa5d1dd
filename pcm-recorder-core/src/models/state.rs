use super::error::CaptureError;
use super::recording_result::RecordingResult;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → starting → capturing → stopping → finished / failed → idle
///           ↓
///          idle (start rejected)
/// ```
/// A session that finishes or fails on its own (end of stream, fatal error)
/// stays in `Finished` / `Failed` until `stop` collects the result.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Starting,
    Capturing,
    Stopping,
    Finished(Box<RecordingResult>),
    Failed(CaptureError),
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Capturing => "capturing",
            Self::Stopping => "stopping",
            Self::Finished(_) => "finished",
            Self::Failed(_) => "failed",
        }
    }
}

/// Encoder adapter lifecycle.
///
/// ```text
/// unconfigured → configured → running → draining → stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Unconfigured,
    Configured,
    Running,
    Draining,
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(CaptureState::Failed(CaptureError::NotActive).is_terminal());
        assert!(!CaptureState::Capturing.is_terminal());
        assert!(CaptureState::Idle.is_idle());
        assert_eq!(CaptureState::Stopping.name(), "stopping");
    }
}
