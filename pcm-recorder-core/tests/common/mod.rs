#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use pcm_recorder_core::{
    BlockEncoder, CaptureAuthorization, CaptureDelegate, CaptureError, CaptureState, EncoderFormat, FrameSource,
    OutputBufferInfo, PcmFormat, RecordingResult, SessionController,
};

/// One scripted response of a `ScriptedSource`.
#[derive(Debug, Clone)]
pub enum Step {
    Data(Vec<u8>),
    /// Visible only to zero-timeout polls, i.e. the stop drain.
    Held(Vec<u8>),
    Eof,
    Fail(String),
    /// Panics inside `read_into`.
    Panic(&'static str),
}

/// Frame source replaying a fixed script, then idling.
pub struct ScriptedSource {
    format: PcmFormat,
    steps: VecDeque<Step>,
    pub stopped: Arc<Mutex<bool>>,
}

impl ScriptedSource {
    pub fn new(format: PcmFormat, steps: Vec<Step>) -> Self {
        Self {
            format,
            steps: steps.into(),
            stopped: Arc::new(Mutex::new(false)),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn min_buffer_size(&self) -> usize {
        self.format.byte_rate() as usize * 40 / 1000
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn read_into(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, CaptureError> {
        match self.steps.pop_front() {
            Some(Step::Data(data)) => Ok(Some(copy_step(data, buf, &mut self.steps, Step::Data))),
            Some(Step::Held(data)) if timeout.is_zero() => Ok(Some(copy_step(data, buf, &mut self.steps, Step::Held))),
            Some(Step::Eof) => {
                self.steps.push_front(Step::Eof);
                Ok(Some(0))
            }
            Some(Step::Fail(message)) => Err(CaptureError::SourceReadFailure(message)),
            Some(Step::Panic(message)) => panic!("{}", message),
            other => {
                if let Some(step) = other {
                    self.steps.push_front(step);
                }
                if !timeout.is_zero() {
                    thread::sleep(timeout.min(Duration::from_millis(2)));
                }
                Ok(None)
            }
        }
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        *self.stopped.lock() = true;
        Ok(())
    }

    fn description(&self) -> String {
        "scripted".into()
    }
}

fn copy_step(data: Vec<u8>, buf: &mut [u8], steps: &mut VecDeque<Step>, wrap: fn(Vec<u8>) -> Step) -> usize {
    let n = data.len().min(buf.len());
    buf[..n].copy_from_slice(&data[..n]);
    if n < data.len() {
        steps.push_front(wrap(data[n..].to_vec()));
    }
    n
}

/// Controller whose every session replays `steps`.
pub fn scripted_controller(steps: Vec<Step>) -> SessionController {
    SessionController::new(
        move |format: &PcmFormat, _: Option<&CaptureAuthorization>| -> Result<Box<dyn FrameSource>, CaptureError> {
            Ok(Box::new(ScriptedSource::new(*format, steps.clone())))
        },
    )
}

/// Deterministic PCM test pattern.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// `len` bytes split into `Data` steps of `chunk` bytes.
pub fn data_steps(bytes: &[u8], chunk: usize) -> Vec<Step> {
    bytes.chunks(chunk).map(|c| Step::Data(c.to_vec())).collect()
}

pub const CONFIG_PACKET: &[u8] = b"CODEC-CONFIG";

/// Block encoder that echoes its input, after one codec-config packet.
///
/// `fail_after` makes the nth queued input fail.
pub struct EchoEncoder {
    inputs: Vec<Vec<u8>>,
    free_inputs: VecDeque<usize>,
    pending: VecDeque<(Vec<u8>, bool, bool)>,
    current: Option<Vec<u8>>,
    queued: usize,
    fail_after: Option<usize>,
    slot_size: Option<usize>,
    capacity: usize,
}

impl EchoEncoder {
    pub fn new(fail_after: Option<usize>) -> Self {
        Self {
            inputs: Vec::new(),
            free_inputs: VecDeque::new(),
            pending: VecDeque::new(),
            current: None,
            queued: 0,
            fail_after,
            slot_size: None,
            capacity: 0,
        }
    }

    /// Input slots of `size` bytes regardless of the configured max input.
    pub fn with_slot_size(mut self, size: usize) -> Self {
        self.slot_size = Some(size);
        self
    }
}

impl BlockEncoder for EchoEncoder {
    fn name(&self) -> &str {
        "echo"
    }

    fn configure(&mut self, format: &EncoderFormat) -> Result<(), CaptureError> {
        self.capacity = self.slot_size.unwrap_or(format.max_input_size);
        self.inputs = vec![vec![0; self.capacity]; 2];
        self.free_inputs = (0..2).collect();
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.pending.push_back((CONFIG_PACKET.to_vec(), true, false));
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> Result<Option<usize>, CaptureError> {
        Ok(self.free_inputs.pop_front())
    }

    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8], CaptureError> {
        Ok(&mut self.inputs[index][..])
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        _presentation_time_us: u64,
        end_of_stream: bool,
    ) -> Result<(), CaptureError> {
        self.queued += 1;
        if self.fail_after.is_some_and(|n| self.queued > n) {
            return Err(CaptureError::EncoderFailure("codec crashed".into()));
        }
        self.free_inputs.push_back(index);
        if size > 0 {
            self.pending.push_back((self.inputs[index][..size].to_vec(), false, false));
        }
        if end_of_stream {
            self.pending.push_back((Vec::new(), false, true));
        }
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> Result<Option<OutputBufferInfo>, CaptureError> {
        if self.current.is_some() {
            return Ok(None);
        }
        let Some((data, is_config, end_of_stream)) = self.pending.pop_front() else {
            return Ok(None);
        };
        let size = data.len();
        self.current = Some(data);
        Ok(Some(OutputBufferInfo {
            index: 0,
            offset: 0,
            size,
            presentation_time_us: 0,
            is_config,
            end_of_stream,
        }))
    }

    fn output_buffer(&self, _index: usize) -> Result<&[u8], CaptureError> {
        self.current
            .as_deref()
            .ok_or_else(|| CaptureError::EncoderFailure("no output held".into()))
    }

    fn release_output_buffer(&mut self, _index: usize) -> Result<(), CaptureError> {
        self.current = None;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn release(&mut self) {}
}

/// Delegate recording every callback.
#[derive(Default)]
pub struct RecordingDelegate {
    pub states: Mutex<Vec<&'static str>>,
    pub errors: Mutex<Vec<CaptureError>>,
    pub finished: Mutex<Vec<RecordingResult>>,
}

impl CaptureDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: &CaptureState) {
        self.states.lock().push(state.name());
    }

    fn on_error(&self, error: &CaptureError) {
        self.errors.lock().push(error.clone());
    }

    fn on_capture_finished(&self, result: &RecordingResult) {
        self.finished.lock().push(result.clone());
    }
}

/// Poll until the session ends on its own.
pub fn wait_until_terminal(controller: &SessionController) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !controller.state().is_terminal() {
        assert!(Instant::now() < deadline, "session did not finish");
        thread::sleep(Duration::from_millis(2));
    }
}
