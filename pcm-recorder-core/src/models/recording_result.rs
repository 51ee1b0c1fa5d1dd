use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::audio_models::{PcmFormat, SessionDiagnostics};
use super::config::OutputFormat;

/// Result returned when a capture session is stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    /// Bytes of audio payload (raw PCM or encoded stream), header excluded.
    pub payload_bytes: u64,
    /// Captured PCM duration.
    pub duration_secs: f64,
    pub checksum: String,
    pub metadata: RecordingMetadata,
    pub diagnostics: SessionDiagnostics,
}

/// Metadata stored alongside a recording.
///
/// Serializable for the JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub file_path: String,
    pub output_format: OutputFormat,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub pcm_bytes: u64,
    pub payload_bytes: u64,
    pub duration_secs: f64,
    pub checksum: String,
    pub encoder_mime: Option<String>,
}

impl RecordingMetadata {
    pub fn new(
        file_path: &str,
        output_format: OutputFormat,
        pcm: &PcmFormat,
        pcm_bytes: u64,
        payload_bytes: u64,
        checksum: &str,
        encoder_mime: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            file_path: file_path.to_string(),
            output_format,
            sample_rate: pcm.sample_rate,
            channels: pcm.channels(),
            bit_depth: pcm.bit_depth,
            pcm_bytes,
            payload_bytes,
            duration_secs: pcm.duration_secs(pcm_bytes),
            checksum: checksum.to_string(),
            encoder_mime,
        }
    }
}
