//! Drives a `BlockEncoder` through its slot protocol.
//!
//! Lifecycle: `unconfigured → configured → running → draining → stopped`.
//! Slots are handed out as move-only tokens, so a slot cannot be submitted
//! or released twice.

use std::ops::Range;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::audio_models::PcmFrame;
use crate::models::config::EncoderFormat;
use crate::models::error::CaptureError;
use crate::models::state::EncoderState;
use crate::traits::block_encoder::{BlockEncoder, OutputBufferInfo};

/// A dequeued input slot; consumed by `submit`.
#[derive(Debug)]
pub struct InputSlot {
    index: usize,
}

impl InputSlot {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A dequeued output slot; consumed by `release`.
#[derive(Debug)]
pub struct OutputSlot {
    info: OutputBufferInfo,
}

impl OutputSlot {
    pub fn index(&self) -> usize {
        self.info.index
    }

    pub fn is_config(&self) -> bool {
        self.info.is_config
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.info.end_of_stream
    }

    pub fn byte_range(&self) -> Range<usize> {
        self.info.offset..self.info.offset + self.info.size
    }

    pub fn presentation_time_us(&self) -> u64 {
        self.info.presentation_time_us
    }
}

/// Counters kept by the adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderStats {
    pub inputs: u64,
    pub input_bytes: u64,
    pub outputs: u64,
    pub output_bytes: u64,
    pub config_skipped: u64,
}

/// Result of one output drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    pub written: usize,
    pub end_of_stream: bool,
}

pub struct EncoderAdapter {
    encoder: Box<dyn BlockEncoder>,
    state: EncoderState,
    format: Option<EncoderFormat>,
    input_capacity: usize,
    last_pts: u64,
    stats: EncoderStats,
    released: bool,
}

impl EncoderAdapter {
    pub fn new(encoder: Box<dyn BlockEncoder>) -> Self {
        Self {
            encoder,
            state: EncoderState::Unconfigured,
            format: None,
            input_capacity: 0,
            last_pts: 0,
            stats: EncoderStats::default(),
            released: false,
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn stats(&self) -> EncoderStats {
        self.stats
    }

    pub fn encoder_name(&self) -> &str {
        self.encoder.name()
    }

    pub fn mime(&self) -> Option<&str> {
        self.format.as_ref().map(|f| f.mime.as_str())
    }

    /// Largest frame a single input slot accepts.
    pub fn input_capacity(&self) -> usize {
        self.input_capacity
    }

    /// Microsecond timestamp for the next frame, derived from input bytes so far.
    pub fn next_timestamp_us(&self) -> u64 {
        match &self.format {
            Some(format) => format.pcm.timestamp_us(self.stats.input_bytes).max(self.last_pts),
            None => self.last_pts,
        }
    }

    pub fn configure(&mut self, format: &EncoderFormat) -> Result<(), CaptureError> {
        self.expect_state(EncoderState::Unconfigured, "configure")?;
        self.encoder.configure(format).map_err(Self::fatal)?;
        self.format = Some(format.clone());
        self.input_capacity = format.max_input_size;
        self.state = EncoderState::Configured;
        log::debug!("Encoder {} configured for {}", self.encoder.name(), format.mime);
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.expect_state(EncoderState::Configured, "start")?;
        self.encoder.start().map_err(Self::fatal)?;
        self.state = EncoderState::Running;
        Ok(())
    }

    pub fn acquire_input_slot(&mut self, timeout: Duration) -> Result<Option<InputSlot>, CaptureError> {
        self.expect_state(EncoderState::Running, "acquire input slot")?;
        self.dequeue_input(timeout)
    }

    /// Writable storage of an acquired slot.
    pub fn slot_buffer(&mut self, slot: &InputSlot) -> Result<&mut [u8], CaptureError> {
        self.encoder.input_buffer(slot.index).map_err(Self::fatal)
    }

    /// Hand `len` bytes of the slot to the encoder.
    pub fn submit(&mut self, slot: InputSlot, len: usize, presentation_time_us: u64) -> Result<(), CaptureError> {
        self.expect_state(EncoderState::Running, "submit")?;
        self.queue_input(slot, len, presentation_time_us, false)
    }

    pub fn poll_output_slot(&mut self, timeout: Duration) -> Result<Option<OutputSlot>, CaptureError> {
        if !matches!(self.state, EncoderState::Running | EncoderState::Draining) {
            return Err(self.wrong_state("poll output slot"));
        }
        let info = self.encoder.dequeue_output_buffer(timeout).map_err(Self::fatal)?;
        Ok(info.map(|info| OutputSlot { info }))
    }

    /// Valid bytes of a polled output slot.
    pub fn output_bytes(&self, slot: &OutputSlot) -> Result<&[u8], CaptureError> {
        let buffer = self.encoder.output_buffer(slot.index()).map_err(Self::fatal)?;
        buffer.get(slot.byte_range()).ok_or_else(|| {
            CaptureError::EncoderFailure(format!(
                "output range {:?} exceeds slot of {} bytes",
                slot.byte_range(),
                buffer.len()
            ))
        })
    }

    pub fn release(&mut self, slot: OutputSlot) -> Result<(), CaptureError> {
        self.encoder.release_output_buffer(slot.index()).map_err(Self::fatal)
    }

    /// One input attempt: copy `frame` into a slot if one is free.
    ///
    /// Returns the frame back when no slot was available so the caller can
    /// retry it on the next iteration.
    pub fn feed(&mut self, frame: PcmFrame, timeout: Duration) -> Result<Option<PcmFrame>, CaptureError> {
        if frame.len() > self.input_capacity {
            return Err(CaptureError::EncoderFailure(format!(
                "frame of {} bytes exceeds input slot capacity {}",
                frame.len(),
                self.input_capacity
            )));
        }
        let Some(slot) = self.acquire_input_slot(timeout)? else {
            return Ok(Some(frame));
        };
        let len = frame.len();
        let buffer = self.slot_buffer(&slot)?;
        if len > buffer.len() {
            return Err(CaptureError::EncoderFailure(format!(
                "frame of {} bytes exceeds input slot {} of {} bytes",
                len,
                slot.index,
                buffer.len()
            )));
        }
        buffer[..len].copy_from_slice(frame.as_bytes());
        let pts = self.next_timestamp_us();
        self.submit(slot, len, pts)?;
        Ok(None)
    }

    /// Move every currently available output slot to `write`.
    ///
    /// Codec-config slots are released without being written.
    pub fn drain_output<W>(&mut self, write: &mut W) -> Result<DrainOutcome, CaptureError>
    where
        W: FnMut(&[u8]) -> Result<(), CaptureError>,
    {
        let mut outcome = DrainOutcome::default();
        while let Some(slot) = self.poll_output_slot(Duration::ZERO)? {
            if slot.is_end_of_stream() {
                outcome.end_of_stream = true;
            }
            if slot.is_config() {
                self.stats.config_skipped += 1;
                self.release(slot)?;
                continue;
            }

            let written = match self.output_bytes(&slot) {
                Ok(bytes) if !bytes.is_empty() => {
                    let len = bytes.len();
                    write(bytes).map(|_| len)
                }
                Ok(_) => Ok(0),
                Err(e) => Err(e),
            };
            // Slot goes back even when the write failed
            self.release(slot)?;
            let len = written?;

            if len > 0 {
                self.stats.outputs += 1;
                self.stats.output_bytes += len as u64;
                outcome.written += len;
            }
        }
        Ok(outcome)
    }

    /// Running → Draining → Stopped.
    ///
    /// Signals end of input, writes remaining output until the encoder
    /// reports end of stream or `drain_timeout` passes, then stops and
    /// releases the encoder. Release happens even if draining failed.
    pub fn stop<W>(&mut self, write: &mut W, drain_timeout: Duration) -> Result<(), CaptureError>
    where
        W: FnMut(&[u8]) -> Result<(), CaptureError>,
    {
        let drained = match self.state {
            EncoderState::Running => {
                self.state = EncoderState::Draining;
                self.drain_to_end(write, drain_timeout)
            }
            EncoderState::Stopped => return Ok(()),
            _ => Ok(()),
        };

        let stopped = if matches!(self.state, EncoderState::Unconfigured) {
            Ok(())
        } else {
            self.encoder.stop().map_err(Self::fatal)
        };
        self.release_encoder();
        self.state = EncoderState::Stopped;
        log::debug!(
            "Encoder {} stopped: {} inputs, {} outputs, {} config slots skipped",
            self.encoder.name(),
            self.stats.inputs,
            self.stats.outputs,
            self.stats.config_skipped
        );

        drained.and(stopped)
    }

    fn drain_to_end<W>(&mut self, write: &mut W, drain_timeout: Duration) -> Result<(), CaptureError>
    where
        W: FnMut(&[u8]) -> Result<(), CaptureError>,
    {
        let deadline = Instant::now() + drain_timeout;
        let poll = Duration::from_millis(5).min(drain_timeout);

        // Submit the end-of-stream marker, draining output to make room
        loop {
            if let Some(slot) = self.dequeue_input(poll)? {
                let pts = self.next_timestamp_us();
                self.queue_input(slot, 0, pts, true)?;
                break;
            }
            if self.drain_output(write)?.end_of_stream {
                return Ok(());
            }
            if Instant::now() >= deadline {
                log::warn!("Encoder refused end-of-stream input before drain deadline");
                return Ok(());
            }
        }

        loop {
            if self.drain_output(write)?.end_of_stream {
                return Ok(());
            }
            if Instant::now() >= deadline {
                log::warn!("Encoder did not signal end of stream within {:?}", drain_timeout);
                return Ok(());
            }
            thread::sleep(poll);
        }
    }

    fn dequeue_input(&mut self, timeout: Duration) -> Result<Option<InputSlot>, CaptureError> {
        let index = self.encoder.dequeue_input_buffer(timeout).map_err(Self::fatal)?;
        Ok(index.map(|index| InputSlot { index }))
    }

    fn queue_input(
        &mut self,
        slot: InputSlot,
        len: usize,
        presentation_time_us: u64,
        end_of_stream: bool,
    ) -> Result<(), CaptureError> {
        if presentation_time_us < self.last_pts {
            return Err(CaptureError::EncoderFailure(format!(
                "timestamp {}us precedes previous {}us",
                presentation_time_us, self.last_pts
            )));
        }
        self.encoder
            .queue_input_buffer(slot.index, len, presentation_time_us, end_of_stream)
            .map_err(Self::fatal)?;
        self.last_pts = presentation_time_us;
        if len > 0 {
            self.stats.inputs += 1;
            self.stats.input_bytes += len as u64;
        }
        Ok(())
    }

    fn release_encoder(&mut self) {
        if !self.released {
            self.encoder.release();
            self.released = true;
        }
    }

    fn expect_state(&self, expected: EncoderState, op: &str) -> Result<(), CaptureError> {
        if self.state != expected {
            return Err(self.wrong_state(op));
        }
        Ok(())
    }

    fn wrong_state(&self, op: &str) -> CaptureError {
        CaptureError::EncoderFailure(format!("cannot {} while encoder is {:?}", op, self.state))
    }

    /// Every encoder error ends the session.
    fn fatal(error: CaptureError) -> CaptureError {
        match error {
            CaptureError::EncoderFailure(_) => error,
            other => CaptureError::EncoderFailure(other.to_string()),
        }
    }
}

impl Drop for EncoderAdapter {
    fn drop(&mut self) {
        self.release_encoder();
    }
}
