//! CLI argument definitions using Clap

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use pcm_recorder_core::{OutputFormat, SessionConfig};

/// pcm-recorder - capture PCM audio into WAV, raw PCM or an encoded stream
#[derive(Parser, Debug)]
#[command(name = "pcm-recorder")]
#[command(version)]
#[command(about = "Record PCM audio from a device process, stdin or a test tone")]
pub struct Cli {
    /// Destination file
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    /// Output container
    #[arg(short, long, value_enum, default_value_t = FormatArg::Wav)]
    pub format: FormatArg,

    /// Sample rate in Hz
    #[arg(short = 'r', long, default_value_t = 44_100)]
    pub sample_rate: u32,

    /// Channel count (1 or 2)
    #[arg(short, long, default_value_t = 1)]
    pub channels: u16,

    /// Stop after this many seconds; otherwise record until the source ends
    #[arg(short, long, value_name = "SECS")]
    pub duration: Option<f64>,

    /// Where audio comes from
    #[arg(short, long, value_enum, default_value_t = SourceArg::Tone)]
    pub source: SourceArg,

    /// Capture command for `--source command` (default: arecord for the chosen format)
    #[arg(long, value_name = "CMD")]
    pub command: Option<String>,

    /// Tone frequency for `--source tone`
    #[arg(long, default_value_t = 440.0, value_name = "HZ")]
    pub tone_hz: f64,

    /// Write <output>.metadata.json next to the recording
    #[arg(short, long)]
    pub metadata: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Wav,
    Raw,
    Encoded,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Wav => OutputFormat::Wav,
            FormatArg::Raw => OutputFormat::Raw,
            FormatArg::Encoded => OutputFormat::Encoded,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    Tone,
    Stdin,
    Command,
}

impl Cli {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            output_format: self.format.into(),
            output_path: self.output.clone(),
            write_metadata: self.metadata,
            ..Default::default()
        }
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.duration
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_record_a_wav_tone() {
        let cli = Cli::parse_from(["pcm-recorder", "--output", "out.wav"]);
        assert_eq!(cli.format, FormatArg::Wav);
        assert_eq!(cli.source, SourceArg::Tone);

        let config = cli.session_config();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.channels, 1);
        assert_eq!(config.output_format, OutputFormat::Wav);
        assert!(!config.write_metadata);
        assert!(cli.max_duration().is_none());
    }

    #[test]
    fn flags_map_onto_config() {
        let cli = Cli::parse_from([
            "pcm-recorder",
            "-o",
            "take.es",
            "--format",
            "encoded",
            "--sample-rate",
            "16000",
            "--channels",
            "2",
            "--duration",
            "1.5",
            "--source",
            "command",
            "--command",
            "parec --raw",
            "--metadata",
        ]);
        let config = cli.session_config();
        assert_eq!(config.output_format, OutputFormat::Encoded);
        assert_eq!(config.sample_rate, 16_000);
        assert_eq!(config.channels, 2);
        assert!(config.write_metadata);
        assert_eq!(cli.max_duration(), Some(Duration::from_millis(1_500)));
        assert_eq!(cli.command.as_deref(), Some("parec --raw"));
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(Cli::try_parse_from(["pcm-recorder", "-o", "x", "--format", "mp3"]).is_err());
    }
}
