//! Bounded hand-off between a capture thread and the session's reader.
//!
//! The producer half pushes whatever the device delivers; the consumer half
//! blocks (with a timeout) until bytes arrive or the producer closes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::PcmFormat;
use crate::processing::ring_buffer::ByteRing;

/// Buffer sizes derived from a source's minimum buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizing {
    /// Smallest buffer the device keeps.
    pub min_buffer: usize,
    /// Ring capacity: four minimum buffers of headroom.
    pub capacity: usize,
    /// Caller read size: half a minimum buffer, whole sample frames.
    pub read_size: usize,
}

impl BufferSizing {
    pub fn new(min_buffer: usize, format: &PcmFormat) -> Self {
        let min_buffer = format.align_down(min_buffer);
        Self {
            min_buffer,
            capacity: min_buffer * 4,
            read_size: format.align_down(min_buffer / 2),
        }
    }

    /// Minimum buffer covering `millis` of audio.
    pub fn for_latency(format: &PcmFormat, millis: u32) -> Self {
        let bytes = format.byte_rate() as u64 * millis as u64 / 1000;
        Self::new(bytes as usize, format)
    }
}

struct Shared {
    ring: ByteRing,
    closed: bool,
    error: Option<String>,
}

/// Producer/consumer pair around one `ByteRing`.
#[derive(Clone)]
pub struct RingTransfer {
    inner: Arc<(Mutex<Shared>, Condvar)>,
}

impl RingTransfer {
    pub fn new(capacity: usize) -> Self {
        Self::with_frame_size(capacity, 1)
    }

    /// Transfer sized by `sizing` that only hands out whole sample frames.
    pub fn for_format(sizing: &BufferSizing, format: &PcmFormat) -> Self {
        Self::with_frame_size(sizing.capacity, format.block_align() as usize)
    }

    pub fn with_frame_size(capacity: usize, frame_size: usize) -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(Shared {
                    ring: ByteRing::with_frame_size(capacity, frame_size),
                    closed: false,
                    error: None,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Push captured bytes and wake the reader.
    ///
    /// Writes after `close` are ignored.
    pub fn push(&self, bytes: &[u8]) {
        let (lock, cvar) = &*self.inner;
        let mut shared = lock.lock();
        if shared.closed {
            return;
        }
        let dropped = shared.ring.write(bytes);
        if dropped > 0 {
            log::warn!("Capture ring overrun: dropped {} bytes", dropped);
        }
        drop(shared);
        cvar.notify_one();
    }

    /// Mark end of stream. Bytes already buffered stay readable.
    pub fn close(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().closed = true;
        cvar.notify_all();
    }

    /// Close with a producer-side failure, reported after the buffered bytes.
    pub fn fail(&self, message: String) {
        let (lock, cvar) = &*self.inner;
        {
            let mut shared = lock.lock();
            shared.error.get_or_insert(message);
            shared.closed = true;
        }
        cvar.notify_all();
    }

    /// Read whole frames into `out`, waiting up to `timeout` for data.
    ///
    /// `Ok(Some(n))` bytes copied (0 once closed and empty), `Ok(None)` on
    /// timeout, `Err` with the producer's failure once the buffer is drained.
    /// A trailing incomplete frame left at close is discarded.
    pub fn read_into(&self, out: &mut [u8], timeout: Duration) -> Result<Option<usize>, String> {
        if out.is_empty() {
            return Ok(Some(0));
        }
        let (lock, cvar) = &*self.inner;
        let mut shared = lock.lock();
        let frame_size = shared.ring.frame_size();
        if out.len() < frame_size {
            return Err(format!(
                "read buffer of {} bytes is smaller than one {}-byte frame",
                out.len(),
                frame_size
            ));
        }
        let deadline = Instant::now() + timeout;
        loop {
            if shared.ring.readable() > 0 {
                return Ok(Some(shared.ring.read_into(out)));
            }
            if shared.closed {
                let partial = shared.ring.discard_partial();
                if partial > 0 {
                    log::warn!("Discarding {} bytes of incomplete frame at end of stream", partial);
                }
                return match shared.error.take() {
                    Some(message) => Err(message),
                    None => Ok(Some(0)),
                };
            }
            if cvar.wait_until(&mut shared, deadline).timed_out() {
                if shared.ring.readable() > 0 {
                    return Ok(Some(shared.ring.read_into(out)));
                }
                return Ok(None);
            }
        }
    }

    pub fn available(&self) -> usize {
        self.inner.0.lock().ring.count()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.0.lock().closed
    }

    pub fn overrun(&self) -> u64 {
        self.inner.0.lock().ring.overrun()
    }
}
