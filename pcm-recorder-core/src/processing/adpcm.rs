//! IMA ADPCM block codec (4 bits per sample).
//!
//! Block layout per channel: 4-byte header (predictor i16 LE, step index,
//! reserved) followed by 504 nibbles, low nibble first. Stereo blocks
//! interleave the channels in 4-byte groups of eight samples, as in the
//! Microsoft IMA ADPCM WAVE format (tag 0x0011).

use crate::models::audio_models::PcmFormat;
use crate::models::config::EncoderFormat;
use crate::traits::frame_codec::FrameCodec;

pub const IMA_ADPCM_MIME: &str = "audio/x-ima-adpcm";

/// Samples per channel in one block, the first carried by the header.
pub const SAMPLES_PER_BLOCK: usize = 505;

/// Encoded bytes per channel in one block.
pub const BLOCK_BYTES_PER_CHANNEL: usize = 256;

const WAVE_FORMAT_IMA_ADPCM: u16 = 0x0011;

const INDEX_TABLE: [i32; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

const STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66, 73,
    80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408, 449, 494,
    544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066, 2272, 2499,
    2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630, 9493, 10442,
    11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794, 32767,
];

#[derive(Debug, Clone, Copy, Default)]
struct ChannelState {
    predictor: i32,
    index: i32,
}

impl ChannelState {
    fn encode(&mut self, sample: i16) -> u8 {
        let step = STEP_TABLE[self.index as usize];
        let mut diff = sample as i32 - self.predictor;
        let mut nibble = 0u8;
        if diff < 0 {
            nibble = 8;
            diff = -diff;
        }

        let mut mask = 4u8;
        let mut threshold = step;
        for _ in 0..3 {
            if diff >= threshold {
                nibble |= mask;
                diff -= threshold;
            }
            threshold >>= 1;
            mask >>= 1;
        }

        // Track the decoder's reconstruction, not the input
        self.decode(nibble);
        nibble
    }

    fn decode(&mut self, nibble: u8) -> i16 {
        let step = STEP_TABLE[self.index as usize];
        let mut delta = step >> 3;
        if nibble & 4 != 0 {
            delta += step;
        }
        if nibble & 2 != 0 {
            delta += step >> 1;
        }
        if nibble & 1 != 0 {
            delta += step >> 2;
        }
        if nibble & 8 != 0 {
            self.predictor -= delta;
        } else {
            self.predictor += delta;
        }
        self.predictor = self.predictor.clamp(i16::MIN as i32, i16::MAX as i32);
        self.index = (self.index + INDEX_TABLE[nibble as usize & 0x0f]).clamp(0, 88);
        self.predictor as i16
    }
}

/// Block size in bytes for `channels`.
pub fn block_align(channels: usize) -> usize {
    BLOCK_BYTES_PER_CHANNEL * channels
}

/// IMA ADPCM encoder producing one packet per block.
#[derive(Debug, Default)]
pub struct ImaAdpcmCodec {
    format: Option<PcmFormat>,
    pending: Vec<i16>,
    carry: Option<u8>,
    states: [ChannelState; 2],
}

impl ImaAdpcmCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> usize {
        self.format.map(|f| f.channels() as usize).unwrap_or(1)
    }

    fn encode_block(&mut self, samples: &[i16]) -> Vec<u8> {
        let channels = self.channels();
        let mut block = Vec::with_capacity(block_align(channels));

        for (ch, state) in self.states.iter_mut().enumerate().take(channels) {
            let first = samples[ch];
            state.predictor = first as i32;
            block.extend_from_slice(&first.to_le_bytes());
            block.push(state.index as u8);
            block.push(0);
        }

        let mut nibbles = vec![Vec::with_capacity(SAMPLES_PER_BLOCK - 1); channels];
        for frame in 1..SAMPLES_PER_BLOCK {
            for (ch, out) in nibbles.iter_mut().enumerate() {
                out.push(self.states[ch].encode(samples[frame * channels + ch]));
            }
        }

        // Eight nibbles (4 bytes) per channel per group
        for group in 0..(SAMPLES_PER_BLOCK - 1) / 8 {
            for ch_nibbles in &nibbles {
                let chunk = &ch_nibbles[group * 8..group * 8 + 8];
                for pair in chunk.chunks(2) {
                    block.push(pair[0] | (pair[1] << 4));
                }
            }
        }

        block
    }

    fn drain_blocks(&mut self, packets: &mut Vec<Vec<u8>>) {
        let block_samples = SAMPLES_PER_BLOCK * self.channels();
        while self.pending.len() >= block_samples {
            let rest = self.pending.split_off(block_samples);
            let block_input = std::mem::replace(&mut self.pending, rest);
            packets.push(self.encode_block(&block_input));
        }
    }
}

impl FrameCodec for ImaAdpcmCodec {
    fn mime(&self) -> &str {
        IMA_ADPCM_MIME
    }

    fn configure(&mut self, format: &EncoderFormat) -> Result<(), String> {
        if format.pcm.bit_depth != 16 {
            return Err(format!("IMA ADPCM needs 16-bit input, got {}", format.pcm.bit_depth));
        }
        self.format = Some(format.pcm);
        self.reset();
        Ok(())
    }

    /// `WAVEFORMATEX` for IMA ADPCM followed by `wSamplesPerBlock`.
    fn codec_config(&self) -> Vec<u8> {
        let format = self.format.unwrap_or_default();
        let channels = format.channels();
        let align = block_align(channels as usize) as u32;
        let avg_bytes = (format.sample_rate as u64 * align as u64 / SAMPLES_PER_BLOCK as u64) as u32;

        let mut config = Vec::with_capacity(20);
        config.extend_from_slice(&WAVE_FORMAT_IMA_ADPCM.to_le_bytes());
        config.extend_from_slice(&channels.to_le_bytes());
        config.extend_from_slice(&format.sample_rate.to_le_bytes());
        config.extend_from_slice(&avg_bytes.to_le_bytes());
        config.extend_from_slice(&(align as u16).to_le_bytes());
        config.extend_from_slice(&4u16.to_le_bytes());
        config.extend_from_slice(&2u16.to_le_bytes());
        config.extend_from_slice(&(SAMPLES_PER_BLOCK as u16).to_le_bytes());
        config
    }

    fn encode(&mut self, pcm: &[u8], packets: &mut Vec<Vec<u8>>) -> Result<(), String> {
        if self.format.is_none() {
            return Err("codec not configured".into());
        }

        let mut bytes = pcm;
        if let Some(low) = self.carry.take() {
            match bytes.split_first() {
                Some((&high, rest)) => {
                    self.pending.push(i16::from_le_bytes([low, high]));
                    bytes = rest;
                }
                None => {
                    self.carry = Some(low);
                    return Ok(());
                }
            }
        }

        let mut chunks = bytes.chunks_exact(2);
        self.pending
            .extend(chunks.by_ref().map(|pair| i16::from_le_bytes([pair[0], pair[1]])));
        if let [odd] = chunks.remainder() {
            self.carry = Some(*odd);
        }

        self.drain_blocks(packets);
        Ok(())
    }

    fn flush(&mut self, packets: &mut Vec<Vec<u8>>) -> Result<(), String> {
        self.carry = None;
        if self.pending.is_empty() {
            return Ok(());
        }
        let block_samples = SAMPLES_PER_BLOCK * self.channels();
        self.pending.resize(block_samples, 0);
        self.drain_blocks(packets);
        Ok(())
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.carry = None;
        self.states = [ChannelState::default(); 2];
    }
}

/// Decode one block back to interleaved samples.
pub fn decode_block(block: &[u8], channels: usize) -> Result<Vec<i16>, String> {
    if channels == 0 || channels > 2 || block.len() != block_align(channels) {
        return Err(format!("bad block: {} bytes for {} channels", block.len(), channels));
    }

    let mut states = [ChannelState::default(); 2];
    let mut out = vec![0i16; SAMPLES_PER_BLOCK * channels];
    for (ch, state) in states.iter_mut().enumerate().take(channels) {
        let header = &block[ch * 4..ch * 4 + 4];
        let first = i16::from_le_bytes([header[0], header[1]]);
        if header[2] > 88 {
            return Err(format!("step index out of range: {}", header[2]));
        }
        state.predictor = first as i32;
        state.index = header[2] as i32;
        out[ch] = first;
    }

    let body = &block[channels * 4..];
    for (group_index, group) in body.chunks(4 * channels).enumerate() {
        for (ch, bytes) in group.chunks(4).enumerate() {
            for (i, byte) in bytes.iter().enumerate() {
                let frame = 1 + group_index * 8 + i * 2;
                out[frame * channels + ch] = states[ch].decode(byte & 0x0f);
                out[(frame + 1) * channels + ch] = states[ch].decode(byte >> 4);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::ChannelLayout;

    fn configured(layout: ChannelLayout) -> ImaAdpcmCodec {
        let mut codec = ImaAdpcmCodec::new();
        let format = EncoderFormat {
            pcm: PcmFormat::new(44_100, layout, 16),
            ..Default::default()
        };
        codec.configure(&format).unwrap();
        codec
    }

    fn sine(frames: usize, channels: usize) -> Vec<i16> {
        (0..frames)
            .flat_map(|i| {
                let v = ((i as f64 * 440.0 * 2.0 * std::f64::consts::PI / 44_100.0).sin() * 8_000.0) as i16;
                std::iter::repeat(v).take(channels)
            })
            .collect()
    }

    fn to_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn config_describes_stream() {
        let codec = configured(ChannelLayout::Stereo);
        let config = codec.codec_config();
        assert_eq!(config.len(), 20);
        assert_eq!(u16::from_le_bytes([config[0], config[1]]), 0x0011);
        assert_eq!(u16::from_le_bytes([config[2], config[3]]), 2);
        assert_eq!(u16::from_le_bytes([config[12], config[13]]), 512);
        assert_eq!(u16::from_le_bytes([config[18], config[19]]), 505);
    }

    #[test]
    fn emits_whole_blocks_across_chunk_boundaries() {
        let mut codec = configured(ChannelLayout::Mono);
        let pcm = to_bytes(&sine(SAMPLES_PER_BLOCK * 2 + 10, 1));
        let mut packets = Vec::new();

        // Odd-sized chunks exercise the byte carry
        for chunk in pcm.chunks(333) {
            codec.encode(chunk, &mut packets).unwrap();
        }
        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|p| p.len() == 256));

        codec.flush(&mut packets).unwrap();
        assert_eq!(packets.len(), 3);
    }

    #[test]
    fn mono_round_trip_stays_close() {
        let mut codec = configured(ChannelLayout::Mono);
        let input = sine(SAMPLES_PER_BLOCK, 1);
        let mut packets = Vec::new();
        codec.encode(&to_bytes(&input), &mut packets).unwrap();
        assert_eq!(packets.len(), 1);

        let decoded = decode_block(&packets[0], 1).unwrap();
        assert_eq!(decoded[0], input[0]);
        let max_err = input
            .iter()
            .zip(&decoded)
            .skip(32)
            .map(|(a, b)| (*a as i32 - *b as i32).abs())
            .max()
            .unwrap();
        assert!(max_err < 600, "max error {}", max_err);
    }

    #[test]
    fn stereo_round_trip_keeps_channels_apart() {
        let mut codec = configured(ChannelLayout::Stereo);
        let input: Vec<i16> = sine(SAMPLES_PER_BLOCK, 1)
            .into_iter()
            .flat_map(|v| [v, -v])
            .collect();
        let mut packets = Vec::new();
        codec.encode(&to_bytes(&input), &mut packets).unwrap();
        assert_eq!(packets[0].len(), 512);

        let decoded = decode_block(&packets[0], 2).unwrap();
        for frame in (64..SAMPLES_PER_BLOCK).step_by(50) {
            let left = decoded[frame * 2] as i32;
            let right = decoded[frame * 2 + 1] as i32;
            assert!((left + right).abs() < 1_200, "frame {}: {} {}", frame, left, right);
        }
    }

    #[test]
    fn encode_requires_configure() {
        let mut codec = ImaAdpcmCodec::new();
        let mut packets = Vec::new();
        assert!(codec.encode(&[0, 0], &mut packets).is_err());
    }
}
