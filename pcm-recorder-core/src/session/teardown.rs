use crate::models::error::CaptureError;

/// Collects step results during teardown.
///
/// The first error is kept for the caller; later ones are logged so they do
/// not mask it.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    first: Option<CaptureError>,
    later: usize,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` as having happened during `step`.
    pub fn push(&mut self, step: &str, error: CaptureError) {
        if self.first.is_none() {
            log::error!("{} failed: {}", step, error);
            self.first = Some(error);
        } else {
            log::warn!("{} also failed: {}", step, error);
            self.later += 1;
        }
    }

    /// Unwrap a step result, recording its error.
    pub fn check<T>(&mut self, step: &str, result: Result<T, CaptureError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.push(step, e);
                None
            }
        }
    }

    pub fn has_error(&self) -> bool {
        self.first.is_some()
    }

    /// `Ok(value)` if nothing failed, otherwise the first error.
    pub fn finish<T>(self, value: T) -> Result<T, CaptureError> {
        if self.later > 0 {
            log::debug!("{} further teardown errors were logged", self.later);
        }
        match self.first {
            Some(e) => Err(e),
            None => Ok(value),
        }
    }
}
