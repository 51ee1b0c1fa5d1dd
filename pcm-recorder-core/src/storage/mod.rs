pub mod file_sink;
pub mod metadata;
pub mod wav_finalizer;
