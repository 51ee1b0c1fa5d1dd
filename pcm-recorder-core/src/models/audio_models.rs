use serde::{Deserialize, Serialize};

/// Channel layout of the captured stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn channels(self) -> u16 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }

    pub fn from_channels(channels: u16) -> Option<Self> {
        match channels {
            1 => Some(Self::Mono),
            2 => Some(Self::Stereo),
            _ => None,
        }
    }
}

/// Parameters of an interleaved little-endian PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub layout: ChannelLayout,
    pub bit_depth: u16,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, layout: ChannelLayout, bit_depth: u16) -> Self {
        Self {
            sample_rate,
            layout,
            bit_depth,
        }
    }

    pub fn channels(&self) -> u16 {
        self.layout.channels()
    }

    pub fn bytes_per_sample(&self) -> u16 {
        self.bit_depth / 8
    }

    /// Bytes in one sample frame (one sample for every channel).
    pub fn block_align(&self) -> u16 {
        self.channels() * self.bytes_per_sample()
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Duration in seconds represented by `bytes` of payload.
    pub fn duration_secs(&self, bytes: u64) -> f64 {
        let rate = self.byte_rate();
        if rate == 0 {
            return 0.0;
        }
        bytes as f64 / rate as f64
    }

    /// Microsecond timestamp of the sample frame starting at byte `offset`.
    pub fn timestamp_us(&self, offset: u64) -> u64 {
        let align = self.block_align() as u64;
        if align == 0 || self.sample_rate == 0 {
            return 0;
        }
        (offset / align) * 1_000_000 / self.sample_rate as u64
    }

    /// Round `bytes` down to a whole number of sample frames (at least one).
    pub fn align_down(&self, bytes: usize) -> usize {
        let align = self.block_align().max(1) as usize;
        (bytes / align * align).max(align)
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::new(44_100, ChannelLayout::Mono, 16)
    }
}

/// One chunk of raw interleaved samples read from a frame source.
///
/// Immutable once built; handed from stage to stage by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmFrame {
    data: Vec<u8>,
}

impl PcmFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Counters collected by the capture loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDiagnostics {
    pub frames_read: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub encoder_inputs: u64,
    pub encoder_outputs: u64,
    pub config_slots_skipped: u64,
    pub drained_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_16bit_derived_fields() {
        let format = PcmFormat::new(44_100, ChannelLayout::Mono, 16);
        assert_eq!(format.block_align(), 2);
        assert_eq!(format.byte_rate(), 88_200);
    }

    #[test]
    fn stereo_16bit_derived_fields() {
        let format = PcmFormat::new(48_000, ChannelLayout::Stereo, 16);
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.byte_rate(), 192_000);
    }

    #[test]
    fn timestamps_follow_sample_count() {
        let format = PcmFormat::new(48_000, ChannelLayout::Stereo, 16);
        assert_eq!(format.timestamp_us(0), 0);
        assert_eq!(format.timestamp_us(192_000), 1_000_000);
        assert_eq!(format.timestamp_us(4 * 480), 10_000);
    }

    #[test]
    fn align_down_keeps_whole_frames() {
        let format = PcmFormat::new(48_000, ChannelLayout::Stereo, 16);
        assert_eq!(format.align_down(1023), 1020);
        assert_eq!(format.align_down(1), 4);
    }

    #[test]
    fn duration_from_bytes() {
        let format = PcmFormat::default();
        approx::assert_relative_eq!(format.duration_secs(88_200), 1.0);
        approx::assert_relative_eq!(format.duration_secs(44_100), 0.5);
    }
}
