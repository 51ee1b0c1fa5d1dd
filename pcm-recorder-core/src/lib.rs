//! # pcm-recorder-core
//!
//! Capture-to-container pipeline for live PCM audio.
//!
//! A `FrameSource` delivers interleaved 16-bit PCM; the `SessionController`
//! moves it on a background thread into one of three sinks: a raw PCM file,
//! a WAV file (staged raw, header written on stop), or a block encoder whose
//! output is written as an elementary stream.
//!
//! ## Architecture
//!
//! ```text
//! pcm-recorder-core (this crate)
//! ├── traits/       ← FrameSource, SourceProvider, BlockEncoder, EncoderProvider, FrameCodec, CaptureDelegate
//! ├── models/       ← CaptureError, CaptureState, SessionConfig, PcmFormat, RecordingResult
//! ├── processing/   ← ByteRing, RingTransfer, WAV header, IMA ADPCM
//! ├── encoder/      ← EncoderAdapter (slot protocol), SoftwareEncoder
//! ├── sources/      ← ReaderSource, CommandSource, ToneSource
//! ├── storage/      ← FileSink, WAV finalizer, metadata sidecar
//! └── session/      ← SessionController (capture thread, drain, teardown)
//! ```

pub mod encoder;
pub mod models;
pub mod processing;
pub mod session;
pub mod sources;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use encoder::adapter::{EncoderAdapter, EncoderStats};
pub use encoder::software::SoftwareEncoder;
pub use models::audio_models::{ChannelLayout, PcmFormat, PcmFrame, SessionDiagnostics};
pub use models::config::{CaptureAuthorization, EncoderFormat, OutputFormat, SessionConfig};
pub use models::error::CaptureError;
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::{CaptureState, EncoderState};
pub use processing::adpcm::ImaAdpcmCodec;
pub use processing::ring_buffer::ByteRing;
pub use processing::transfer::{BufferSizing, RingTransfer};
pub use processing::wav_format::WavHeader;
pub use session::SessionController;
pub use sources::{CommandSource, ReaderSource, ToneSource};
pub use traits::block_encoder::{BlockEncoder, EncoderProvider, OutputBufferInfo};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::frame_codec::FrameCodec;
pub use traits::frame_source::{FrameSource, SourceProvider};
