use crate::models::config::EncoderFormat;

/// A packet-producing audio codec run inside `SoftwareEncoder`.
///
/// Input is interleaved s16le PCM in arbitrary chunk sizes; the codec
/// buffers internally and emits whole packets.
pub trait FrameCodec: Send {
    fn mime(&self) -> &str;

    fn configure(&mut self, format: &EncoderFormat) -> Result<(), String>;

    /// Stream description emitted ahead of the first packet.
    fn codec_config(&self) -> Vec<u8>;

    fn encode(&mut self, pcm: &[u8], packets: &mut Vec<Vec<u8>>) -> Result<(), String>;

    /// Emit whatever is buffered as a final (padded) packet.
    fn flush(&mut self, packets: &mut Vec<Vec<u8>>) -> Result<(), String>;

    /// Drop buffered input and prediction state.
    fn reset(&mut self);
}
