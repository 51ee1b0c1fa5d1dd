use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crate::models::audio_models::PcmFormat;
use crate::models::error::CaptureError;
use crate::traits::frame_source::FrameSource;

use super::reader::{check_format, ReaderSource};

/// Frame source fed by an external capture process writing raw s16le PCM
/// to stdout (`arecord -t raw`, `parec --raw`, `sox -t raw -`, ...).
///
/// The process is spawned when the source opens; a spawn failure is a
/// `SourceNotInitialized`. `stop` kills and reaps it.
pub struct CommandSource {
    program: String,
    child: Option<Child>,
    inner: ReaderSource,
}

impl CommandSource {
    pub fn spawn(program: &str, args: &[String], format: PcmFormat) -> Result<Self, CaptureError> {
        check_format(&format)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CaptureError::SourceNotInitialized(format!("failed to spawn {}: {}", program, e)))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CaptureError::SourceNotInitialized(format!("{} has no stdout", program)));
        };

        log::debug!("Spawned capture process {} (pid {})", program, child.id());
        Ok(Self {
            program: program.to_string(),
            child: Some(child),
            inner: ReaderSource::new(stdout, format, program)?,
        })
    }

    /// Split a command line on whitespace and spawn it.
    pub fn from_command_line(command_line: &str, format: PcmFormat) -> Result<Self, CaptureError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| CaptureError::SourceNotInitialized("empty capture command".into()))?;
        let args: Vec<String> = parts.collect();
        Self::spawn(&program, &args, format)
    }

    /// `arecord` arguments producing raw PCM in `format` on stdout.
    pub fn arecord_args(format: &PcmFormat) -> Vec<String> {
        vec![
            "-q".into(),
            "-t".into(),
            "raw".into(),
            "-f".into(),
            "S16_LE".into(),
            "-r".into(),
            format.sample_rate.to_string(),
            "-c".into(),
            format.channels().to_string(),
        ]
    }

    fn reap(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                log::debug!("kill {}: {}", self.program, e);
            }
            match child.wait() {
                Ok(status) => log::debug!("{} exited with {}", self.program, status),
                Err(e) => log::warn!("Failed to reap {}: {}", self.program, e),
            }
        }
    }
}

impl FrameSource for CommandSource {
    fn format(&self) -> PcmFormat {
        self.inner.format()
    }

    fn min_buffer_size(&self) -> usize {
        self.inner.min_buffer_size()
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.inner.start()
    }

    fn read_into(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, CaptureError> {
        self.inner.read_into(buf, timeout)
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        // Killing the process closes the pipe, so the pump returns and joins
        self.reap();
        self.inner.join_pump();
        self.inner.stop()
    }

    fn description(&self) -> String {
        format!("process {}", self.inner.description())
    }
}

impl Drop for CommandSource {
    fn drop(&mut self) {
        self.reap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_not_initialized() {
        let err = CommandSource::spawn("/nonexistent/capture-tool", &[], PcmFormat::default())
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::SourceNotInitialized(_)));
    }

    #[test]
    fn empty_command_line_is_rejected() {
        let err = CommandSource::from_command_line("   ", PcmFormat::default()).err().unwrap();
        assert!(matches!(err, CaptureError::SourceNotInitialized(_)));
    }

    #[test]
    fn arecord_arguments_match_format() {
        let args = CommandSource::arecord_args(&PcmFormat::default());
        assert_eq!(args.join(" "), "-q -t raw -f S16_LE -r 44100 -c 1");
    }

    #[cfg(unix)]
    #[test]
    fn reads_process_output() {
        let mut source =
            CommandSource::from_command_line("head -c 4000 /dev/zero", PcmFormat::default()).unwrap();
        source.start().unwrap();

        let mut total = 0;
        let mut buf = vec![0u8; 512];
        loop {
            match source.read_into(&mut buf, Duration::from_secs(5)).unwrap() {
                Some(0) => break,
                Some(n) => total += n,
                None => panic!("timed out"),
            }
        }
        assert_eq!(total, 4000);
        source.stop().unwrap();
    }
}
