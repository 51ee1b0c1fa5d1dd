use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::audio_models::{PcmFormat, PcmFrame, SessionDiagnostics};
use crate::models::config::SessionConfig;
use crate::models::error::CaptureError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::storage::file_sink::sha256_file;
use crate::storage::metadata::write_metadata;
use crate::traits::frame_source::FrameSource;

use super::controller::StatusReporter;
use super::sink::SessionSink;
use super::teardown::ErrorCollector;

/// Why the read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// Run flag cleared by `stop`.
    Stopped,
    /// Source reached end of stream.
    EndOfStream,
    /// A fatal error; already recorded.
    Failed,
}

/// Everything one session thread owns.
pub(crate) struct CaptureLoop {
    pub(crate) config: SessionConfig,
    pub(crate) format: PcmFormat,
    pub(crate) source: Box<dyn FrameSource>,
    pub(crate) sink: SessionSink,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) read_size: usize,
    /// Frame read while priming the source, written first.
    pub(crate) primed: Option<PcmFrame>,
    pub(crate) status: StatusReporter,
}

impl CaptureLoop {
    /// Body of the capture thread: read until stopped, then drain and tear down.
    pub(crate) fn run(mut self) -> Result<RecordingResult, CaptureError> {
        let mut diagnostics = SessionDiagnostics::default();
        let mut errors = ErrorCollector::new();
        let mut buf = vec![0u8; self.read_size];
        let mut pending = self.primed.take();
        let mut pcm_bytes: u64 = 0;

        if let Some(frame) = &pending {
            diagnostics.frames_read += 1;
            diagnostics.bytes_read += frame.len() as u64;
        }

        // Teardown must run even if a source or encoder panics mid-session
        let body = panic::catch_unwind(AssertUnwindSafe(|| {
            let exit = self.read_loop(&mut buf, &mut pending, &mut pcm_bytes, &mut diagnostics, &mut errors);
            log::debug!("Capture loop exited: {:?}", exit);

            if exit == Exit::Stopped {
                self.drain_source(&mut buf, &mut pending, &mut pcm_bytes, &mut diagnostics, &mut errors);
            }
        }));
        if let Err(payload) = body {
            errors.push("capture loop", CaptureError::CaptureThreadPanicked(panic_message(payload.as_ref())));
        }
        if let Some(frame) = pending.take() {
            log::warn!("Discarding {} bytes that never reached the sink", frame.len());
        }

        self.teardown(pcm_bytes, diagnostics, errors)
    }

    /// Release a session that never ran: stop the source and remove the
    /// files the sink created.
    pub(crate) fn abandon(mut self) {
        if let Err(e) = self.source.stop() {
            log::warn!("Failed to stop {}: {}", self.source.description(), e);
        }
        self.sink.discard();
    }

    fn read_loop(
        &mut self,
        buf: &mut [u8],
        pending: &mut Option<PcmFrame>,
        pcm_bytes: &mut u64,
        diagnostics: &mut SessionDiagnostics,
        errors: &mut ErrorCollector,
    ) -> Exit {
        while self.running.load(Ordering::Acquire) {
            let frame = match pending.take() {
                Some(frame) => frame,
                None => match self.source.read_into(buf, self.config.read_timeout) {
                    Ok(Some(0)) => return Exit::EndOfStream,
                    Ok(Some(n)) => {
                        diagnostics.frames_read += 1;
                        diagnostics.bytes_read += n as u64;
                        PcmFrame::from_slice(&buf[..n])
                    }
                    Ok(None) => {
                        self.sink.flush();
                        if let Err(e) = self.sink.service() {
                            errors.push("encoder output", e);
                            return Exit::Failed;
                        }
                        continue;
                    }
                    Err(e) => {
                        errors.push("source read", e);
                        return Exit::Failed;
                    }
                },
            };

            let len = frame.len() as u64;
            match self.sink.accept(frame, self.config.slot_timeout) {
                Ok(None) => *pcm_bytes += len,
                Ok(Some(back)) => *pending = Some(back),
                Err(e) => {
                    errors.push("sink write", e);
                    return Exit::Failed;
                }
            }
        }
        Exit::Stopped
    }

    /// Push everything the source already buffered through the sink.
    fn drain_source(
        &mut self,
        buf: &mut [u8],
        pending: &mut Option<PcmFrame>,
        pcm_bytes: &mut u64,
        diagnostics: &mut SessionDiagnostics,
        errors: &mut ErrorCollector,
    ) {
        let deadline = Instant::now() + self.config.drain_timeout;
        loop {
            let frame = match pending.take() {
                Some(frame) => frame,
                None => match self.source.read_into(buf, Duration::ZERO) {
                    Ok(Some(0)) | Ok(None) => return,
                    Ok(Some(n)) => {
                        diagnostics.frames_read += 1;
                        diagnostics.bytes_read += n as u64;
                        diagnostics.drained_bytes += n as u64;
                        PcmFrame::from_slice(&buf[..n])
                    }
                    Err(e) => {
                        errors.push("source drain", e);
                        return;
                    }
                },
            };

            let len = frame.len() as u64;
            match self.sink.accept(frame, self.config.slot_timeout) {
                Ok(None) => *pcm_bytes += len,
                Ok(Some(back)) => {
                    *pending = Some(back);
                    if Instant::now() >= deadline {
                        log::warn!("Sink still busy at drain deadline");
                        return;
                    }
                }
                Err(e) => {
                    errors.push("sink write", e);
                    return;
                }
            }
        }
    }

    /// Encoder, source, file, container; every step runs.
    fn teardown(
        mut self,
        pcm_bytes: u64,
        mut diagnostics: SessionDiagnostics,
        mut errors: ErrorCollector,
    ) -> Result<RecordingResult, CaptureError> {
        errors.check("encoder stop", self.sink.stop_encoder(self.config.drain_timeout));
        errors.check("source stop", self.source.stop());
        errors.check("sink close", self.sink.close_file());
        let payload_bytes = errors.check("finalize", self.sink.finalize());

        if let Some(stats) = self.sink.encoder_stats() {
            diagnostics.encoder_inputs = stats.inputs;
            diagnostics.encoder_outputs = stats.outputs;
            diagnostics.config_slots_skipped = stats.config_skipped;
        }

        let dest = self.sink.destination().to_path_buf();
        let result = payload_bytes.and_then(|payload_bytes| {
            diagnostics.bytes_written = payload_bytes;
            let checksum = errors.check("checksum", sha256_file(&dest))?;
            let metadata = RecordingMetadata::new(
                &dest.to_string_lossy(),
                self.config.output_format,
                &self.format,
                pcm_bytes,
                payload_bytes,
                &checksum,
                self.sink.encoder_mime(),
            );
            if self.config.write_metadata {
                errors.check("metadata", write_metadata(&metadata, &dest));
            }
            Some(RecordingResult {
                file_path: dest.clone(),
                payload_bytes,
                duration_secs: self.format.duration_secs(pcm_bytes),
                checksum,
                metadata,
                diagnostics: diagnostics.clone(),
            })
        });

        match result {
            Some(result) if !errors.has_error() => {
                log::info!(
                    "Recording finished: {} ({} payload bytes, {:.2}s)",
                    result.file_path.display(),
                    result.payload_bytes,
                    result.duration_secs
                );
                self.status.finished(&result);
                Ok(result)
            }
            finalized => {
                if finalized.is_some() {
                    log::warn!("Session failed; partial recording kept at {}", dest.display());
                }
                let error = errors
                    .finish(())
                    .err()
                    .unwrap_or_else(|| CaptureError::SinkIoFailure("recording was not finalized".into()));
                self.status.failed(&error);
                Err(error)
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".into()
    }
}
