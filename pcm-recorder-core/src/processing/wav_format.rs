//! WAV container header synthesis and parsing.
//!
//! Generates the standard 44-byte RIFF header for 16-bit PCM. All
//! multi-byte fields are little-endian regardless of host byte order.

use crate::models::audio_models::PcmFormat;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Largest payload whose size still fits the RIFF chunk-size field.
pub const MAX_WAV_DATA_SIZE: u64 = u32::MAX as u64 - 36;

/// Fields of a canonical PCM WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    pub fn new(format: &PcmFormat, data_size: u32) -> Self {
        Self {
            channels: format.channels(),
            sample_rate: format.sample_rate,
            bits_per_sample: format.bit_depth,
            data_size,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.checked_block_align().unwrap_or(u16::MAX)
    }

    pub fn byte_rate(&self) -> u32 {
        self.checked_byte_rate().unwrap_or(u32::MAX)
    }

    /// RIFF chunk size: everything after the first 8 bytes.
    pub fn chunk_size(&self) -> u32 {
        self.checked_chunk_size().unwrap_or(u32::MAX)
    }

    fn checked_block_align(&self) -> Option<u16> {
        self.channels.checked_mul(self.bits_per_sample / 8)
    }

    fn checked_byte_rate(&self) -> Option<u32> {
        self.sample_rate.checked_mul(self.checked_block_align()? as u32)
    }

    fn checked_chunk_size(&self) -> Option<u32> {
        self.data_size.checked_add(36)
    }

    pub fn to_bytes(&self) -> [u8; WAV_HEADER_SIZE] {
        generate_wav_header(self.sample_rate, self.bits_per_sample, self.channels, self.data_size)
    }

    /// Parse a canonical 44-byte PCM header.
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < WAV_HEADER_SIZE {
            return Err(format!("header too short: {} bytes", bytes.len()));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err("not a RIFF/WAVE file".into());
        }
        if &bytes[12..16] != b"fmt " || read_u32(bytes, 16) != 16 {
            return Err("unexpected fmt chunk".into());
        }
        if read_u16(bytes, 20) != 1 {
            return Err(format!("unsupported audio format: {}", read_u16(bytes, 20)));
        }
        if &bytes[36..40] != b"data" {
            return Err("missing data chunk".into());
        }

        let header = Self {
            channels: read_u16(bytes, 22),
            sample_rate: read_u32(bytes, 24),
            bits_per_sample: read_u16(bytes, 34),
            data_size: read_u32(bytes, 40),
        };

        let (Some(block_align), Some(byte_rate)) = (header.checked_block_align(), header.checked_byte_rate()) else {
            return Err("inconsistent byte rate or block align: fields overflow".into());
        };
        if read_u32(bytes, 28) != byte_rate || read_u16(bytes, 32) != block_align {
            return Err("inconsistent byte rate or block align".into());
        }
        if header.checked_chunk_size() != Some(read_u32(bytes, 4)) {
            return Err("RIFF chunk size does not match data size".into());
        }
        Ok(header)
    }
}

/// Generate a 44-byte WAV RIFF header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * block_align
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(sample_rate: u32, bit_depth: u16, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let block_align = channels.saturating_mul(bit_depth / 8);
    let byte_rate = sample_rate.saturating_mul(block_align as u32);
    let chunk_size = data_size.saturating_add(36);

    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::ChannelLayout;

    #[test]
    fn header_size_is_44_bytes() {
        let header = generate_wav_header(48000, 16, 2, 0);
        assert_eq!(header.len(), 44);
    }

    #[test]
    fn header_riff_magic() {
        let header = generate_wav_header(48000, 16, 2, 0);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(&header[36..40], b"data");
    }

    #[test]
    fn one_second_of_44k_mono() {
        let format = PcmFormat::new(44_100, ChannelLayout::Mono, 16);
        let bytes = WavHeader::new(&format, 88_200).to_bytes();

        assert_eq!(read_u32(&bytes, 4), 36 + 88_200);
        assert_eq!(read_u16(&bytes, 20), 1);
        assert_eq!(read_u16(&bytes, 22), 1);
        assert_eq!(read_u32(&bytes, 24), 44_100);
        assert_eq!(read_u32(&bytes, 28), 88_200);
        assert_eq!(read_u16(&bytes, 32), 2);
        assert_eq!(read_u16(&bytes, 34), 16);
        assert_eq!(read_u32(&bytes, 40), 88_200);
    }

    #[test]
    fn header_48khz_stereo_16bit() {
        let header = generate_wav_header(48000, 16, 2, 9600);
        assert_eq!(read_u32(&header, 28), 192_000);
        assert_eq!(read_u16(&header, 32), 4);
        assert_eq!(read_u32(&header, 40), 9600);
        assert_eq!(read_u32(&header, 4), 36 + 9600);
    }

    #[test]
    fn parse_recovers_written_parameters() {
        let format = PcmFormat::new(22_050, ChannelLayout::Stereo, 16);
        let written = WavHeader::new(&format, 1234 * 4);
        let parsed = WavHeader::parse(&written.to_bytes()).unwrap();

        assert_eq!(parsed, written);
        assert_eq!(parsed.sample_rate, 22_050);
        assert_eq!(parsed.channels, 2);
        assert_eq!(parsed.bits_per_sample, 16);
    }

    #[test]
    fn parse_rejects_corrupt_headers() {
        let format = PcmFormat::default();
        let good = WavHeader::new(&format, 100).to_bytes();

        assert!(WavHeader::parse(&good[..40]).is_err());

        let mut bad_magic = good;
        bad_magic[0..4].copy_from_slice(b"RIFX");
        assert!(WavHeader::parse(&bad_magic).is_err());

        let mut bad_size = good;
        bad_size[4..8].copy_from_slice(&7u32.to_le_bytes());
        assert!(WavHeader::parse(&bad_size).is_err());

        let mut huge_channels = good;
        huge_channels[22..24].copy_from_slice(&u16::MAX.to_le_bytes());
        assert!(WavHeader::parse(&huge_channels).is_err());

        let mut huge_data = good;
        huge_data[40..44].copy_from_slice(&u32::MAX.to_le_bytes());
        huge_data[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(WavHeader::parse(&huge_data).is_err());
    }

    #[test]
    fn accessors_saturate_instead_of_overflowing() {
        let header = WavHeader {
            channels: u16::MAX,
            sample_rate: 192_000,
            bits_per_sample: 16,
            data_size: u32::MAX,
        };
        assert_eq!(header.block_align(), u16::MAX);
        assert_eq!(header.chunk_size(), u32::MAX);
        assert_eq!(header.to_bytes().len(), WAV_HEADER_SIZE);
    }
}
