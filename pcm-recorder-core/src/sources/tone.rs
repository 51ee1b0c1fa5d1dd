use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::audio_models::PcmFormat;
use crate::models::error::CaptureError;
use crate::processing::transfer::{BufferSizing, RingTransfer};
use crate::traits::frame_source::FrameSource;

use super::reader::check_format;
use super::DEFAULT_BUFFER_MILLIS;

const CHUNK_MILLIS: u32 = 10;

/// Synthetic sine source paced in real time.
///
/// Used for demos and for exercising the pipeline without a device. With a
/// `limit` set, the stream ends after that much audio.
pub struct ToneSource {
    format: PcmFormat,
    sizing: BufferSizing,
    frequency: f64,
    amplitude: f64,
    limit: Option<Duration>,
    paced: bool,
    transfer: RingTransfer,
    running: Arc<AtomicBool>,
    generator: Option<thread::JoinHandle<()>>,
}

impl ToneSource {
    pub fn new(format: PcmFormat, frequency: f64) -> Result<Self, CaptureError> {
        check_format(&format)?;
        if frequency.is_nan() || frequency <= 0.0 || frequency >= format.sample_rate as f64 / 2.0 {
            return Err(CaptureError::SourceNotInitialized(format!(
                "tone frequency {} Hz is outside (0, {}) Hz",
                frequency,
                format.sample_rate / 2
            )));
        }
        let sizing = BufferSizing::for_latency(&format, DEFAULT_BUFFER_MILLIS);
        Ok(Self {
            format,
            sizing,
            frequency,
            amplitude: 0.5,
            limit: None,
            paced: true,
            transfer: RingTransfer::for_format(&sizing, &format),
            running: Arc::new(AtomicBool::new(false)),
            generator: None,
        })
    }

    /// Peak level in `0.0..=1.0` of full scale.
    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// End the stream after `limit` of audio.
    pub fn with_limit(mut self, limit: Duration) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Generate as fast as the reader drains instead of in real time.
    ///
    /// Only meaningful together with a limit.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }
}

/// Interleaved s16le sine samples, continuing from `start_frame`.
fn synthesize(format: &PcmFormat, frequency: f64, amplitude: f64, start_frame: u64, frames: usize) -> Vec<u8> {
    let channels = format.channels() as usize;
    let step = TAU * frequency / format.sample_rate as f64;
    let peak = amplitude * i16::MAX as f64;

    let mut out = Vec::with_capacity(frames * channels * 2);
    for i in 0..frames {
        let phase = ((start_frame + i as u64) as f64 * step) % TAU;
        let sample = (phase.sin() * peak).round() as i16;
        for _ in 0..channels {
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
    out
}

impl FrameSource for ToneSource {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn min_buffer_size(&self) -> usize {
        self.sizing.min_buffer
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.generator.is_some() {
            return Err(CaptureError::SourceNotInitialized("tone source already started".into()));
        }

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let transfer = self.transfer.clone();
        let format = self.format;
        let frequency = self.frequency;
        let amplitude = self.amplitude;
        let paced = self.paced;
        let capacity = self.sizing.capacity;
        let chunk_frames = (format.sample_rate * CHUNK_MILLIS / 1000).max(1) as u64;
        let total_frames = self
            .limit
            .map(|limit| (limit.as_secs_f64() * format.sample_rate as f64).round() as u64);

        let handle = thread::Builder::new()
            .name("pcm-source-tone".into())
            .spawn(move || {
                let started = Instant::now();
                let mut produced: u64 = 0;
                while running.load(Ordering::Acquire) {
                    let frames = match total_frames {
                        Some(total) if produced >= total => break,
                        Some(total) => chunk_frames.min(total - produced),
                        None => chunk_frames,
                    };
                    let chunk = synthesize(&format, frequency, amplitude, produced, frames as usize);
                    if !paced {
                        // Wait for room instead of overrunning the ring
                        while running.load(Ordering::Acquire) && transfer.available() + chunk.len() > capacity {
                            thread::sleep(Duration::from_millis(1));
                        }
                    }
                    transfer.push(&chunk);
                    produced += frames;

                    if paced {
                        let due = Duration::from_secs_f64(produced as f64 / format.sample_rate as f64);
                        if let Some(wait) = due.checked_sub(started.elapsed()) {
                            thread::sleep(wait);
                        }
                    }
                }
                transfer.close();
            })
            .map_err(|e| CaptureError::SourceNotInitialized(format!("failed to spawn tone thread: {}", e)))?;

        self.generator = Some(handle);
        log::debug!("Tone source started at {} Hz", self.frequency);
        Ok(())
    }

    fn read_into(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, CaptureError> {
        self.transfer
            .read_into(buf, timeout)
            .map_err(CaptureError::SourceReadFailure)
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.generator.take() {
            if handle.join().is_err() {
                log::error!("Tone thread panicked");
            }
        }
        self.transfer.close();
        Ok(())
    }

    fn description(&self) -> String {
        format!(
            "tone {} Hz ({} Hz, {} ch, {}-bit)",
            self.frequency,
            self.format.sample_rate,
            self.format.channels(),
            self.format.bit_depth
        )
    }
}

impl Drop for ToneSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.generator.take() {
            let _ = handle.join();
        }
    }
}
