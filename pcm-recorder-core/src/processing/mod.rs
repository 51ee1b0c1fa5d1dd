pub mod adpcm;
pub mod ring_buffer;
pub mod transfer;
pub mod wav_format;
