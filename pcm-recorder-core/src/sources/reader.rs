use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::audio_models::PcmFormat;
use crate::models::error::CaptureError;
use crate::processing::transfer::{BufferSizing, RingTransfer};
use crate::traits::frame_source::FrameSource;

use super::DEFAULT_BUFFER_MILLIS;

/// Frame source over a blocking byte stream of interleaved s16le PCM.
///
/// A pump thread reads the stream into a ring so the session thread can
/// poll it with a timeout. Works with device nodes, FIFOs, pipes and stdin.
pub struct ReaderSource {
    name: String,
    format: PcmFormat,
    sizing: BufferSizing,
    transfer: RingTransfer,
    reader: Option<Box<dyn Read + Send>>,
    running: Arc<AtomicBool>,
    pump: Option<thread::JoinHandle<()>>,
}

impl ReaderSource {
    pub fn new<R>(reader: R, format: PcmFormat, name: impl Into<String>) -> Result<Self, CaptureError>
    where
        R: Read + Send + 'static,
    {
        check_format(&format)?;
        let sizing = BufferSizing::for_latency(&format, DEFAULT_BUFFER_MILLIS);
        Ok(Self {
            name: name.into(),
            format,
            sizing,
            transfer: RingTransfer::for_format(&sizing, &format),
            reader: Some(Box::new(reader)),
            running: Arc::new(AtomicBool::new(false)),
            pump: None,
        })
    }

    /// Bytes dropped because the reader fell behind the stream.
    pub fn overrun_bytes(&self) -> u64 {
        self.transfer.overrun()
    }

    /// Wait for the pump thread to exit. Only call once the stream is known
    /// to return (closed or killed), otherwise this blocks.
    pub(crate) fn join_pump(&mut self) {
        if let Some(handle) = self.pump.take() {
            if handle.join().is_err() {
                log::error!("Reader thread for {} panicked", self.name);
            }
        }
    }
}

impl FrameSource for ReaderSource {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn min_buffer_size(&self) -> usize {
        self.sizing.min_buffer
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        let Some(mut reader) = self.reader.take() else {
            return Err(CaptureError::SourceNotInitialized(format!(
                "{} already started",
                self.name
            )));
        };

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let transfer = self.transfer.clone();
        let chunk_size = self.sizing.read_size;
        let name = self.name.clone();

        let handle = thread::Builder::new()
            .name("pcm-source-reader".into())
            .spawn(move || {
                let mut chunk = vec![0u8; chunk_size];
                while running.load(Ordering::Acquire) {
                    match reader.read(&mut chunk) {
                        Ok(0) => {
                            log::debug!("{} reached end of stream", name);
                            transfer.close();
                            break;
                        }
                        Ok(n) => transfer.push(&chunk[..n]),
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            log::error!("{} read failed: {}", name, e);
                            transfer.fail(e.to_string());
                            break;
                        }
                    }
                }
            })
            .map_err(|e| CaptureError::SourceNotInitialized(format!("failed to spawn reader thread: {}", e)))?;

        self.pump = Some(handle);
        Ok(())
    }

    fn read_into(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, CaptureError> {
        self.transfer
            .read_into(buf, timeout)
            .map_err(CaptureError::SourceReadFailure)
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::Release);
        self.transfer.close();

        // A pump blocked inside read() exits when the stream next returns;
        // joining here could hang on an idle stdin.
        if let Some(handle) = self.pump.take() {
            if handle.is_finished() {
                if handle.join().is_err() {
                    log::error!("Reader thread for {} panicked", self.name);
                }
            } else {
                log::debug!("Detaching reader thread for {}", self.name);
            }
        }
        self.reader = None;
        Ok(())
    }

    fn description(&self) -> String {
        format!(
            "{} ({} Hz, {} ch, {}-bit)",
            self.name,
            self.format.sample_rate,
            self.format.channels(),
            self.format.bit_depth
        )
    }
}

impl Drop for ReaderSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.transfer.close();
    }
}

pub(crate) fn check_format(format: &PcmFormat) -> Result<(), CaptureError> {
    if format.bit_depth != 16 {
        return Err(CaptureError::SourceNotInitialized(format!(
            "unsupported bit depth {}",
            format.bit_depth
        )));
    }
    if format.sample_rate == 0 {
        return Err(CaptureError::SourceNotInitialized("sample rate is zero".into()));
    }
    Ok(())
}
