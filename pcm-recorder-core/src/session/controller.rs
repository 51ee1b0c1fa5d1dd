use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use parking_lot::Mutex;

use crate::encoder::software::SoftwareEncoder;
use crate::models::audio_models::PcmFrame;
use crate::models::config::{EncoderFormat, OutputFormat, SessionConfig};
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::CaptureState;
use crate::processing::adpcm::ImaAdpcmCodec;
use crate::processing::transfer::BufferSizing;
use crate::traits::block_encoder::{BlockEncoder, EncoderProvider};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::frame_source::{FrameSource, SourceProvider};

use super::capture_loop::{panic_message, CaptureLoop};
use super::sink::SessionSink;

/// Shared session state plus the delegate that hears about changes.
#[derive(Clone)]
pub(crate) struct StatusReporter {
    state: Arc<Mutex<CaptureState>>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl StatusReporter {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CaptureState::Idle)),
            delegate: None,
        }
    }

    fn get(&self) -> CaptureState {
        self.state.lock().clone()
    }

    pub(crate) fn set(&self, new_state: CaptureState) {
        log::debug!("Session state -> {}", new_state.name());
        *self.state.lock() = new_state.clone();
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(&new_state);
        }
    }

    pub(crate) fn finished(&self, result: &RecordingResult) {
        self.set(CaptureState::Finished(Box::new(result.clone())));
        if let Some(ref delegate) = self.delegate {
            delegate.on_capture_finished(result);
        }
    }

    pub(crate) fn failed(&self, error: &CaptureError) {
        self.set(CaptureState::Failed(error.clone()));
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(error);
        }
    }
}

struct ActiveSession {
    running: Arc<AtomicBool>,
    handle: thread::JoinHandle<Result<RecordingResult, CaptureError>>,
}

/// Runs one capture session at a time.
///
/// `start` opens the source and sink on the caller's thread and hands them
/// to a `pcm-capture` thread; `stop` clears the run flag, joins that
/// thread, and returns what it produced.
///
/// ```text
/// [FrameSource] → read_into → [capture loop] → raw / WAV part file
///                                      └─────→ [EncoderAdapter] → stream file
/// ```
pub struct SessionController {
    sources: Arc<dyn SourceProvider>,
    encoders: Arc<dyn EncoderProvider>,
    status: StatusReporter,
    active: Option<ActiveSession>,
}

impl SessionController {
    /// Controller using the built-in IMA ADPCM encoder for encoded output.
    pub fn new(sources: impl SourceProvider + 'static) -> Self {
        Self {
            sources: Arc::new(sources),
            encoders: Arc::new(software_adpcm),
            status: StatusReporter::new(),
            active: None,
        }
    }

    /// Replace the encoder factory, e.g. with a platform codec.
    pub fn with_encoder_provider(mut self, encoders: impl EncoderProvider + 'static) -> Self {
        self.encoders = Arc::new(encoders);
        self
    }

    /// Takes effect for the next session.
    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.status.delegate = Some(delegate);
    }

    pub fn state(&self) -> CaptureState {
        self.status.get()
    }

    /// A session exists until `stop` collects it, even after it ended on
    /// its own.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Open the source and sink and start the capture thread.
    ///
    /// On failure nothing is left running and no output file remains.
    pub fn start(&mut self, config: SessionConfig) -> Result<(), CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyActive);
        }
        config.validate().map_err(CaptureError::ConfigurationFailed)?;

        self.status.set(CaptureState::Starting);

        match self.launch(config) {
            Ok(session) => {
                self.active = Some(session);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start capture: {}", e);
                if let Some(ref delegate) = self.status.delegate {
                    delegate.on_error(&e);
                }
                self.status.set(CaptureState::Idle);
                Err(e)
            }
        }
    }

    /// Stop the session, drain what was captured, and return the result.
    pub fn stop(&mut self) -> Result<RecordingResult, CaptureError> {
        let session = self.active.take().ok_or(CaptureError::NotActive)?;

        if !self.status.get().is_terminal() {
            self.status.set(CaptureState::Stopping);
        }
        session.running.store(false, Ordering::Release);

        let result = match session.handle.join() {
            Ok(result) => result,
            Err(payload) => {
                let error = CaptureError::CaptureThreadPanicked(panic_message(payload.as_ref()));
                self.status.failed(&error);
                Err(error)
            }
        };
        self.status.set(CaptureState::Idle);
        result
    }

    fn launch(&self, config: SessionConfig) -> Result<ActiveSession, CaptureError> {
        let format = config.pcm_format();
        let mut source = self.sources.open(&format, config.authorization.as_ref())?;

        let mut read_size = BufferSizing::new(source.min_buffer_size(), &format).read_size;
        if config.output_format == OutputFormat::Encoded {
            read_size = format.align_down(read_size.min(config.encoder.max_input_size));
        }

        let primed = match prime_source(source.as_mut(), &config, read_size) {
            Ok(frame) => frame,
            Err(e) => {
                stop_quietly(source.as_mut());
                return Err(e);
            }
        };

        let sink = match SessionSink::open(&config, self.encoders.as_ref()) {
            Ok(sink) => sink,
            Err(e) => {
                stop_quietly(source.as_mut());
                return Err(e);
            }
        };

        if let Some(max) = sink.max_frame() {
            read_size = format.align_down(read_size.min(max));
        }

        log::info!(
            "Capture started: {} → {} ({:?}, read size {} bytes)",
            source.description(),
            sink.destination().display(),
            config.output_format,
            read_size
        );

        let running = Arc::new(AtomicBool::new(true));
        let capture = CaptureLoop {
            config,
            format,
            source,
            sink,
            running: Arc::clone(&running),
            read_size,
            primed: Some(primed),
            status: self.status.clone(),
        };

        // Spawn first, then hand the loop over; a failed spawn keeps it here.
        let (hand_off, receive) = mpsc::channel::<CaptureLoop>();
        let spawned = thread::Builder::new().name("pcm-capture".into()).spawn(move || {
            match receive.recv() {
                Ok(capture) => capture.run(),
                Err(_) => Err(CaptureError::SourceNotInitialized("capture loop was never handed over".into())),
            }
        });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                capture.abandon();
                return Err(CaptureError::SourceNotInitialized(format!(
                    "failed to spawn capture thread: {}",
                    e
                )));
            }
        };

        self.status.set(CaptureState::Capturing);
        if let Err(mpsc::SendError(capture)) = hand_off.send(capture) {
            capture.abandon();
            return Err(CaptureError::SourceNotInitialized("capture thread exited before start".into()));
        }

        Ok(ActiveSession { running, handle })
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.active.is_some() {
            log::warn!("Controller dropped with an active session; stopping it");
            if let Err(e) = self.stop() {
                log::warn!("Session ended with error: {}", e);
            }
        }
    }
}

/// Start `source` and wait for its first frame.
fn prime_source(source: &mut dyn FrameSource, config: &SessionConfig, read_size: usize) -> Result<PcmFrame, CaptureError> {
    let format = config.pcm_format();
    if source.format() != format {
        return Err(CaptureError::SourceNotInitialized(format!(
            "source delivers {} Hz / {} ch / {}-bit, session wants {} Hz / {} ch / {}-bit",
            source.format().sample_rate,
            source.format().channels(),
            source.format().bit_depth,
            format.sample_rate,
            format.channels(),
            format.bit_depth
        )));
    }

    source.start()?;
    let mut buf = vec![0u8; read_size];
    match source.read_into(&mut buf, config.startup_timeout)? {
        Some(0) => Err(CaptureError::SourceNotInitialized(
            "source ended before delivering any audio".into(),
        )),
        Some(n) => Ok(PcmFrame::from_slice(&buf[..n])),
        None => Err(CaptureError::SourceNotInitialized(format!(
            "no audio within {:?}",
            config.startup_timeout
        ))),
    }
}

fn stop_quietly(source: &mut dyn FrameSource) {
    if let Err(e) = source.stop() {
        log::warn!("Failed to stop {}: {}", source.description(), e);
    }
}

fn software_adpcm(_format: &EncoderFormat) -> Result<Box<dyn BlockEncoder>, CaptureError> {
    Ok(Box::new(SoftwareEncoder::new(ImaAdpcmCodec::new())))
}
