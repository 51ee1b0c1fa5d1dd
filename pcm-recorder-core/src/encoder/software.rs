use std::collections::VecDeque;
use std::time::Duration;

use crate::models::config::EncoderFormat;
use crate::models::error::CaptureError;
use crate::traits::block_encoder::{BlockEncoder, OutputBufferInfo};
use crate::traits::frame_codec::FrameCodec;

const INPUT_SLOTS: usize = 4;
const OUTPUT_SLOTS: usize = 8;

/// Encoded packets waiting for an output slot before input is refused.
const MAX_BACKLOG: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unconfigured,
    Configured,
    Running,
    Stopped,
    Released,
}

struct Packet {
    data: Vec<u8>,
    presentation_time_us: u64,
    is_config: bool,
    end_of_stream: bool,
}

/// In-process `BlockEncoder` running a `FrameCodec` behind a fixed slot pool.
///
/// Encoding happens synchronously on `queue_input_buffer`; packets wait in a
/// bounded backlog until the caller dequeues them into output slots. While
/// the backlog is full no input slot is handed out, so an undrained output
/// side throttles the input side.
pub struct SoftwareEncoder<C: FrameCodec> {
    codec: C,
    name: String,
    phase: Phase,
    input_capacity: usize,
    inputs: Vec<Vec<u8>>,
    free_inputs: VecDeque<usize>,
    dequeued_inputs: Vec<bool>,
    outputs: Vec<Vec<u8>>,
    free_outputs: VecDeque<usize>,
    held_outputs: Vec<bool>,
    backlog: VecDeque<Packet>,
    input_ended: bool,
}

impl<C: FrameCodec> SoftwareEncoder<C> {
    pub fn new(codec: C) -> Self {
        let name = format!("software:{}", codec.mime());
        Self {
            codec,
            name,
            phase: Phase::Unconfigured,
            input_capacity: 0,
            inputs: Vec::new(),
            free_inputs: VecDeque::new(),
            dequeued_inputs: Vec::new(),
            outputs: Vec::new(),
            free_outputs: VecDeque::new(),
            held_outputs: Vec::new(),
            backlog: VecDeque::new(),
            input_ended: false,
        }
    }

    /// Packets encoded but not yet dequeued.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    fn reset_slots(&mut self) {
        self.inputs = vec![vec![0; self.input_capacity]; INPUT_SLOTS];
        self.free_inputs = (0..INPUT_SLOTS).collect();
        self.dequeued_inputs = vec![false; INPUT_SLOTS];
        self.outputs = vec![Vec::new(); OUTPUT_SLOTS];
        self.free_outputs = (0..OUTPUT_SLOTS).collect();
        self.held_outputs = vec![false; OUTPUT_SLOTS];
        self.backlog.clear();
        self.input_ended = false;
    }

    fn require_running(&self, op: &str) -> Result<(), CaptureError> {
        if self.phase != Phase::Running {
            return Err(CaptureError::EncoderFailure(format!(
                "{} while encoder is {:?}",
                op, self.phase
            )));
        }
        Ok(())
    }

    fn check_input(&self, index: usize) -> Result<(), CaptureError> {
        if !self.dequeued_inputs.get(index).copied().unwrap_or(false) {
            return Err(CaptureError::EncoderFailure(format!("input slot {} is not dequeued", index)));
        }
        Ok(())
    }

    fn check_output(&self, index: usize) -> Result<(), CaptureError> {
        if !self.held_outputs.get(index).copied().unwrap_or(false) {
            return Err(CaptureError::EncoderFailure(format!("output slot {} is not dequeued", index)));
        }
        Ok(())
    }

    fn enqueue_packets(&mut self, packets: Vec<Vec<u8>>, presentation_time_us: u64) {
        self.backlog.extend(packets.into_iter().map(|data| Packet {
            data,
            presentation_time_us,
            is_config: false,
            end_of_stream: false,
        }));
    }
}

impl<C: FrameCodec> BlockEncoder for SoftwareEncoder<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, format: &EncoderFormat) -> Result<(), CaptureError> {
        if !matches!(self.phase, Phase::Unconfigured | Phase::Stopped) {
            return Err(CaptureError::EncoderFailure(format!(
                "configure while encoder is {:?}",
                self.phase
            )));
        }
        if format.mime != self.codec.mime() {
            return Err(CaptureError::EncoderFailure(format!(
                "{} cannot encode {}",
                self.name, format.mime
            )));
        }
        if format.max_input_size == 0 {
            return Err(CaptureError::EncoderFailure("max input size is zero".into()));
        }
        self.codec.configure(format).map_err(CaptureError::EncoderFailure)?;
        self.input_capacity = format.max_input_size;
        self.reset_slots();
        self.phase = Phase::Configured;
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.phase != Phase::Configured {
            return Err(CaptureError::EncoderFailure(format!(
                "start while encoder is {:?}",
                self.phase
            )));
        }
        self.backlog.push_back(Packet {
            data: self.codec.codec_config(),
            presentation_time_us: 0,
            is_config: true,
            end_of_stream: false,
        });
        self.phase = Phase::Running;
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Duration) -> Result<Option<usize>, CaptureError> {
        self.require_running("dequeue input")?;
        if self.input_ended || self.backlog.len() >= MAX_BACKLOG {
            return Ok(None);
        }
        let Some(index) = self.free_inputs.pop_front() else {
            return Ok(None);
        };
        self.dequeued_inputs[index] = true;
        Ok(Some(index))
    }

    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8], CaptureError> {
        self.check_input(index)?;
        Ok(&mut self.inputs[index][..])
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        presentation_time_us: u64,
        end_of_stream: bool,
    ) -> Result<(), CaptureError> {
        self.require_running("queue input")?;
        self.check_input(index)?;
        if size > self.input_capacity {
            return Err(CaptureError::EncoderFailure(format!(
                "input of {} bytes exceeds slot capacity {}",
                size, self.input_capacity
            )));
        }

        self.dequeued_inputs[index] = false;
        self.free_inputs.push_back(index);

        let mut packets = Vec::new();
        self.codec
            .encode(&self.inputs[index][..size], &mut packets)
            .map_err(CaptureError::EncoderFailure)?;
        self.enqueue_packets(packets, presentation_time_us);

        if end_of_stream {
            let mut packets = Vec::new();
            self.codec.flush(&mut packets).map_err(CaptureError::EncoderFailure)?;
            self.enqueue_packets(packets, presentation_time_us);
            self.backlog.push_back(Packet {
                data: Vec::new(),
                presentation_time_us,
                is_config: false,
                end_of_stream: true,
            });
            self.input_ended = true;
        }
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Duration) -> Result<Option<OutputBufferInfo>, CaptureError> {
        self.require_running("dequeue output")?;
        if self.backlog.is_empty() {
            return Ok(None);
        }
        let Some(index) = self.free_outputs.pop_front() else {
            return Ok(None);
        };
        let Some(packet) = self.backlog.pop_front() else {
            self.free_outputs.push_front(index);
            return Ok(None);
        };

        let slot = &mut self.outputs[index];
        slot.clear();
        slot.extend_from_slice(&packet.data);
        self.held_outputs[index] = true;

        Ok(Some(OutputBufferInfo {
            index,
            offset: 0,
            size: packet.data.len(),
            presentation_time_us: packet.presentation_time_us,
            is_config: packet.is_config,
            end_of_stream: packet.end_of_stream,
        }))
    }

    fn output_buffer(&self, index: usize) -> Result<&[u8], CaptureError> {
        self.check_output(index)?;
        Ok(&self.outputs[index])
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<(), CaptureError> {
        self.check_output(index)?;
        self.held_outputs[index] = false;
        self.free_outputs.push_back(index);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if matches!(self.phase, Phase::Unconfigured | Phase::Released) {
            return Err(CaptureError::EncoderFailure(format!(
                "stop while encoder is {:?}",
                self.phase
            )));
        }
        self.codec.reset();
        self.reset_slots();
        self.phase = Phase::Stopped;
        Ok(())
    }

    fn release(&mut self) {
        self.codec.reset();
        self.inputs.clear();
        self.outputs.clear();
        self.free_inputs.clear();
        self.free_outputs.clear();
        self.dequeued_inputs.clear();
        self.held_outputs.clear();
        self.backlog.clear();
        self.phase = Phase::Released;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::adpcm::{ImaAdpcmCodec, SAMPLES_PER_BLOCK};

    const NO_WAIT: Duration = Duration::ZERO;

    fn running_encoder() -> SoftwareEncoder<ImaAdpcmCodec> {
        let mut encoder = SoftwareEncoder::new(ImaAdpcmCodec::new());
        encoder.configure(&EncoderFormat::default()).unwrap();
        encoder.start().unwrap();
        encoder
    }

    fn submit(encoder: &mut SoftwareEncoder<ImaAdpcmCodec>, bytes: &[u8], eos: bool) {
        let index = encoder.dequeue_input_buffer(NO_WAIT).unwrap().unwrap();
        encoder.input_buffer(index).unwrap()[..bytes.len()].copy_from_slice(bytes);
        encoder.queue_input_buffer(index, bytes.len(), 0, eos).unwrap();
    }

    #[test]
    fn first_output_is_codec_config() {
        let mut encoder = running_encoder();
        let info = encoder.dequeue_output_buffer(NO_WAIT).unwrap().unwrap();
        assert!(info.is_config);
        assert_eq!(info.size, 20);
        encoder.release_output_buffer(info.index).unwrap();
        assert!(encoder.dequeue_output_buffer(NO_WAIT).unwrap().is_none());
    }

    #[test]
    fn full_block_of_input_yields_one_packet() {
        let mut encoder = running_encoder();
        submit(&mut encoder, &vec![0u8; SAMPLES_PER_BLOCK * 2], false);

        let config = encoder.dequeue_output_buffer(NO_WAIT).unwrap().unwrap();
        encoder.release_output_buffer(config.index).unwrap();

        let block = encoder.dequeue_output_buffer(NO_WAIT).unwrap().unwrap();
        assert!(!block.is_config);
        assert_eq!(block.size, 256);
        assert_eq!(encoder.output_buffer(block.index).unwrap().len(), 256);
    }

    #[test]
    fn end_of_stream_flushes_and_marks_last_output() {
        let mut encoder = running_encoder();
        submit(&mut encoder, &[1, 0, 2, 0], true);

        let mut infos = Vec::new();
        while let Some(info) = encoder.dequeue_output_buffer(NO_WAIT).unwrap() {
            encoder.release_output_buffer(info.index).unwrap();
            infos.push(info);
        }
        assert_eq!(infos.len(), 3);
        assert!(infos[0].is_config);
        assert_eq!(infos[1].size, 256);
        assert!(infos[2].end_of_stream);
        assert!(encoder.dequeue_input_buffer(NO_WAIT).unwrap().is_none());
    }

    #[test]
    fn slots_run_out_until_returned() {
        let mut encoder = running_encoder();
        let held: Vec<usize> = (0..INPUT_SLOTS)
            .map(|_| encoder.dequeue_input_buffer(NO_WAIT).unwrap().unwrap())
            .collect();
        assert!(encoder.dequeue_input_buffer(NO_WAIT).unwrap().is_none());

        encoder.queue_input_buffer(held[0], 0, 0, false).unwrap();
        assert!(encoder.dequeue_input_buffer(NO_WAIT).unwrap().is_some());
    }

    #[test]
    fn full_backlog_refuses_input() {
        let mut encoder = running_encoder();
        let block = vec![0u8; SAMPLES_PER_BLOCK * 2];
        while encoder.backlog_len() < MAX_BACKLOG {
            submit(&mut encoder, &block, false);
        }
        assert!(encoder.dequeue_input_buffer(NO_WAIT).unwrap().is_none());

        let info = encoder.dequeue_output_buffer(NO_WAIT).unwrap().unwrap();
        encoder.release_output_buffer(info.index).unwrap();
        assert!(encoder.dequeue_input_buffer(NO_WAIT).unwrap().is_some());
    }

    #[test]
    fn stale_indices_are_rejected() {
        let mut encoder = running_encoder();
        assert!(encoder.input_buffer(0).is_err());
        assert!(encoder.release_output_buffer(3).is_err());
        assert!(encoder.queue_input_buffer(99, 0, 0, false).is_err());
    }

    #[test]
    fn lifecycle_is_enforced() {
        let mut encoder = SoftwareEncoder::new(ImaAdpcmCodec::new());
        assert!(encoder.start().is_err());
        assert!(encoder.dequeue_input_buffer(NO_WAIT).is_err());

        let wrong = EncoderFormat {
            mime: "audio/mp4a-latm".into(),
            ..Default::default()
        };
        assert!(encoder.configure(&wrong).is_err());

        encoder.configure(&EncoderFormat::default()).unwrap();
        encoder.start().unwrap();
        encoder.stop().unwrap();
        assert!(encoder.dequeue_output_buffer(NO_WAIT).is_err());
        encoder.release();
    }
}
