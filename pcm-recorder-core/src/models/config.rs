use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::audio_models::{ChannelLayout, PcmFormat};

/// Output container produced by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Raw PCM staged in a temporary file, wrapped in a WAV header on stop.
    Wav,
    /// Headerless interleaved s16le samples.
    Raw,
    /// Block encoder output, codec-config packets excluded.
    Encoded,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Raw => "pcm",
            Self::Encoded => "es",
        }
    }
}

/// Opaque token handed over by the external consent step.
///
/// The session forwards it to the source provider and never inspects it.
#[derive(Clone, PartialEq, Eq)]
pub struct CaptureAuthorization(String);

impl CaptureAuthorization {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CaptureAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CaptureAuthorization(..)")
    }
}

/// Settings handed to a block encoder on `configure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderFormat {
    pub mime: String,
    pub pcm: PcmFormat,
    /// Target bit rate in bits per second (advisory for fixed-rate codecs).
    pub bit_rate: u32,
    /// Codec profile tag, e.g. "lc".
    pub profile: String,
    /// Largest input slot the encoder must accept, in bytes.
    pub max_input_size: usize,
}

impl Default for EncoderFormat {
    fn default() -> Self {
        Self {
            mime: "audio/x-ima-adpcm".into(),
            pcm: PcmFormat::default(),
            bit_rate: 64_000,
            profile: "lc".into(),
            max_input_size: 16_384,
        }
    }
}

/// Configuration for a capture session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sample rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Number of channels, 1 or 2 (default: 1).
    pub channels: u16,

    /// Bit depth, only 16 is supported.
    pub bit_depth: u16,

    pub output_format: OutputFormat,

    /// Destination file for the finished recording.
    pub output_path: PathBuf,

    /// Encoder settings used when `output_format` is `Encoded`.
    /// PCM parameters are overwritten from this config at session start.
    pub encoder: EncoderFormat,

    /// Upper bound on a single blocking source read.
    pub read_timeout: Duration,

    /// Upper bound on encoder slot acquisition and output polling.
    pub slot_timeout: Duration,

    /// How long `start` waits for the first frame from the source.
    pub startup_timeout: Duration,

    /// How long `stop` waits for the encoder to emit its end-of-stream.
    pub drain_timeout: Duration,

    /// Write `<output>.metadata.json` next to the recording.
    pub write_metadata: bool,

    pub authorization: Option<CaptureAuthorization>,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 || self.sample_rate > 192_000 {
            return Err(format!("unsupported sample rate: {}", self.sample_rate));
        }
        if self.bit_depth != 16 {
            return Err(format!("unsupported bit depth: {}", self.bit_depth));
        }
        if ChannelLayout::from_channels(self.channels).is_none() {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err("output path is empty".into());
        }
        if self.read_timeout.is_zero() || self.slot_timeout.is_zero() {
            return Err("read and slot timeouts must be non-zero".into());
        }
        if self.output_format == OutputFormat::Encoded && self.encoder.max_input_size == 0 {
            return Err("encoder max input size must be non-zero".into());
        }
        Ok(())
    }

    pub fn pcm_format(&self) -> PcmFormat {
        let layout = ChannelLayout::from_channels(self.channels).unwrap_or(ChannelLayout::Mono);
        PcmFormat::new(self.sample_rate, layout, self.bit_depth)
    }

    /// Encoder settings with the session's PCM parameters filled in.
    pub fn encoder_format(&self) -> EncoderFormat {
        EncoderFormat {
            pcm: self.pcm_format(),
            ..self.encoder.clone()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            bit_depth: 16,
            output_format: OutputFormat::Wav,
            output_path: PathBuf::from("recording.wav"),
            encoder: EncoderFormat::default(),
            read_timeout: Duration::from_millis(10),
            slot_timeout: Duration::from_millis(10),
            startup_timeout: Duration::from_millis(500),
            drain_timeout: Duration::from_secs(2),
            write_metadata: false,
            authorization: None,
        }
    }
}
