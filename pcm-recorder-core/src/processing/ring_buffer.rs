/// Circular byte buffer between a capture producer and a reader.
///
/// Not synchronized; `RingTransfer` wraps it in a
/// `parking_lot::Mutex` for cross-thread access.
///
/// Overflow behavior: drops the oldest bytes and counts them as overrun.
/// Drops and reads happen in whole frames of `frame_size` bytes, so the
/// read position always stays on a sample frame boundary.
#[derive(Debug)]
pub struct ByteRing {
    buffer: Vec<u8>,
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
    frame_size: usize,
    overrun: u64,
}

impl ByteRing {
    pub fn new(capacity: usize) -> Self {
        Self::with_frame_size(capacity, 1)
    }

    pub fn with_frame_size(capacity: usize, frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        let capacity = capacity.max(frame_size);
        Self {
            buffer: vec![0; capacity],
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity,
            frame_size,
            overrun: 0,
        }
    }

    /// Append bytes, dropping the oldest whole frames on overflow.
    ///
    /// `bytes` may end mid-frame; the next write continues that frame.
    /// Returns the number of bytes dropped by this write.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        if bytes.is_empty() {
            return 0;
        }

        // Drop from the front of (buffered ++ bytes), rounded up to whole frames
        let total = self.available + bytes.len();
        let excess = total.saturating_sub(self.capacity);
        let dropped = if excess == 0 {
            0
        } else {
            excess.div_ceil(self.frame_size).saturating_mul(self.frame_size).min(total)
        };

        let from_ring = dropped.min(self.available);
        if from_ring > 0 {
            self.read_index = (self.read_index + from_ring) % self.capacity;
            self.available -= from_ring;
        }
        let bytes = &bytes[dropped - from_ring..];

        let first = bytes.len().min(self.capacity - self.write_index);
        self.buffer[self.write_index..self.write_index + first].copy_from_slice(&bytes[..first]);
        let rest = bytes.len() - first;
        if rest > 0 {
            self.buffer[..rest].copy_from_slice(&bytes[first..]);
        }
        self.write_index = (self.write_index + bytes.len()) % self.capacity;
        self.available += bytes.len();

        self.overrun += dropped as u64;
        dropped
    }

    /// Move whole frames, up to `out.len()` bytes, into `out`, returning how
    /// many bytes were copied.
    pub fn read_into(&mut self, out: &mut [u8]) -> usize {
        let to_read = self.align_down(out.len().min(self.available));
        if to_read == 0 {
            return 0;
        }

        let first = to_read.min(self.capacity - self.read_index);
        out[..first].copy_from_slice(&self.buffer[self.read_index..self.read_index + first]);
        let rest = to_read - first;
        if rest > 0 {
            out[first..to_read].copy_from_slice(&self.buffer[..rest]);
        }
        self.read_index = (self.read_index + to_read) % self.capacity;
        self.available -= to_read;
        to_read
    }

    /// Number of bytes currently available for reading.
    pub fn count(&self) -> usize {
        self.available
    }

    /// Bytes a reader can take: buffered bytes in whole frames.
    pub fn readable(&self) -> usize {
        self.align_down(self.available)
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Throw away a trailing incomplete frame, returning its length.
    pub fn discard_partial(&mut self) -> usize {
        let partial = self.available - self.readable();
        if partial > 0 {
            self.write_index = (self.write_index + self.capacity - partial) % self.capacity;
            self.available -= partial;
        }
        partial
    }

    fn align_down(&self, bytes: usize) -> usize {
        bytes - bytes % self.frame_size
    }

    /// Total bytes dropped to overflow since creation.
    pub fn overrun(&self) -> u64 {
        self.overrun
    }

    pub fn reset(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
