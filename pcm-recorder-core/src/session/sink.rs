use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::encoder::adapter::{EncoderAdapter, EncoderStats};
use crate::models::audio_models::{PcmFormat, PcmFrame};
use crate::models::config::{OutputFormat, SessionConfig};
use crate::models::error::CaptureError;
use crate::storage::file_sink::FileSink;
use crate::storage::wav_finalizer::{finalize_wav, part_path};
use crate::traits::block_encoder::EncoderProvider;

/// Where captured frames go for the lifetime of one session.
pub(crate) enum SessionSink {
    /// Frames appended verbatim to the destination.
    Raw { file: FileSink },
    /// Frames staged in `<dest>.pcm.part`, wrapped in a WAV header on finalize.
    Wav {
        part: FileSink,
        dest: PathBuf,
        format: PcmFormat,
    },
    /// Frames fed to a block encoder; its output ranges go to the destination.
    Encoded { encoder: EncoderAdapter, stream: FileSink },
}

impl SessionSink {
    /// Open the sink selected by `config`. Nothing is left behind on failure.
    pub(crate) fn open(config: &SessionConfig, encoders: &dyn EncoderProvider) -> Result<Self, CaptureError> {
        let dest = config.output_path.clone();
        match config.output_format {
            OutputFormat::Raw => Ok(Self::Raw {
                file: FileSink::create(dest)?,
            }),
            OutputFormat::Wav => Ok(Self::Wav {
                part: FileSink::create(part_path(&dest))?,
                dest,
                format: config.pcm_format(),
            }),
            OutputFormat::Encoded => {
                let format = config.encoder_format();
                let mut encoder = EncoderAdapter::new(encoders.create(&format)?);
                encoder.configure(&format)?;
                encoder.start()?;
                // Dropping the adapter releases the encoder if the file fails
                let stream = FileSink::create(dest)?;
                log::debug!("Encoding with {} into {}", encoder.encoder_name(), stream.path().display());
                Ok(Self::Encoded { encoder, stream })
            }
        }
    }

    /// Largest frame the sink accepts in one call, if bounded.
    pub(crate) fn max_frame(&self) -> Option<usize> {
        match self {
            Self::Encoded { encoder, .. } => Some(encoder.input_capacity()),
            _ => None,
        }
    }

    pub(crate) fn destination(&self) -> &Path {
        match self {
            Self::Raw { file } => file.path(),
            Self::Wav { dest, .. } => dest,
            Self::Encoded { stream, .. } => stream.path(),
        }
    }

    /// Hand one frame to the sink.
    ///
    /// File sinks always take the frame. The encoded sink makes one input
    /// attempt and then drains all available output; the frame comes back
    /// if no input slot was free.
    pub(crate) fn accept(&mut self, frame: PcmFrame, slot_timeout: Duration) -> Result<Option<PcmFrame>, CaptureError> {
        match self {
            Self::Raw { file } | Self::Wav { part: file, .. } => {
                file.write(frame.as_bytes())?;
                Ok(None)
            }
            Self::Encoded { encoder, stream } => {
                let pending = encoder.feed(frame, slot_timeout)?;
                encoder.drain_output(&mut |bytes: &[u8]| stream.write(bytes))?;
                Ok(pending)
            }
        }
    }

    /// Move encoder output to the file without feeding input.
    pub(crate) fn service(&mut self) -> Result<(), CaptureError> {
        if let Self::Encoded { encoder, stream } = self {
            encoder.drain_output(&mut |bytes: &[u8]| stream.write(bytes))?;
        }
        Ok(())
    }

    /// Push buffered file bytes to the OS.
    pub(crate) fn flush(&mut self) {
        match self {
            Self::Raw { file } | Self::Wav { part: file, .. } => file.flush(),
            Self::Encoded { stream, .. } => stream.flush(),
        }
    }

    /// Signal end of input and drain the encoder. No-op for file sinks.
    pub(crate) fn stop_encoder(&mut self, drain_timeout: Duration) -> Result<(), CaptureError> {
        match self {
            Self::Encoded { encoder, stream } => {
                encoder.stop(&mut |bytes: &[u8]| stream.write(bytes), drain_timeout)
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn encoder_stats(&self) -> Option<EncoderStats> {
        match self {
            Self::Encoded { encoder, .. } => Some(encoder.stats()),
            _ => None,
        }
    }

    pub(crate) fn encoder_mime(&self) -> Option<String> {
        match self {
            Self::Encoded { encoder, .. } => encoder.mime().map(str::to_string),
            _ => None,
        }
    }

    /// Close the open file. Returns bytes written to it.
    pub(crate) fn close_file(&mut self) -> Result<u64, CaptureError> {
        match self {
            Self::Raw { file } | Self::Wav { part: file, .. } => file.close(),
            Self::Encoded { stream, .. } => stream.close(),
        }
    }

    /// Remove everything the sink created. Used when a session never ran.
    pub(crate) fn discard(self) {
        match self {
            Self::Raw { file } | Self::Wav { part: file, .. } => file.discard(),
            Self::Encoded { encoder, stream } => {
                drop(encoder);
                stream.discard();
            }
        }
    }

    /// Produce the final container. Returns the payload size in bytes.
    pub(crate) fn finalize(&self) -> Result<u64, CaptureError> {
        match self {
            Self::Raw { file } => Ok(file.bytes_written()),
            Self::Wav { part, dest, format } => finalize_wav(part.path(), dest, format),
            Self::Encoded { stream, .. } => Ok(stream.bytes_written()),
        }
    }
}
