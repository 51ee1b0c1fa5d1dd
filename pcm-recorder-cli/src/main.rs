mod args;
mod signals;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use pcm_recorder_core::{
    CaptureAuthorization, CaptureDelegate, CaptureError, CaptureState, CommandSource, FrameSource, PcmFormat,
    ReaderSource, RecordingResult, SessionController, ToneSource,
};

use args::{Cli, SourceArg};
use signals::{wait_for_stop, ShutdownSignal, StopReason};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Forwards session events to the log.
struct LogDelegate;

impl CaptureDelegate for LogDelegate {
    fn on_state_changed(&self, state: &CaptureState) {
        log::info!("state: {}", state.name());
    }

    fn on_error(&self, error: &CaptureError) {
        log::error!("capture error: {}", error);
    }

    fn on_capture_finished(&self, result: &RecordingResult) {
        log::info!("finalized {}", result.file_path.display());
    }
}

fn open_source(cli: &Cli, format: &PcmFormat) -> Result<Box<dyn FrameSource>, CaptureError> {
    match cli.source {
        SourceArg::Tone => Ok(Box::new(ToneSource::new(*format, cli.tone_hz)?)),
        SourceArg::Stdin => Ok(Box::new(ReaderSource::new(std::io::stdin(), *format, "stdin")?)),
        SourceArg::Command => match cli.command.as_deref() {
            Some(command_line) => Ok(Box::new(CommandSource::from_command_line(command_line, *format)?)),
            None => Ok(Box::new(CommandSource::spawn(
                "arecord",
                &CommandSource::arecord_args(format),
                *format,
            )?)),
        },
    }
}

fn print_result(result: &RecordingResult) {
    println!("file:     {}", result.file_path.display());
    println!("format:   {:?}", result.metadata.output_format);
    println!("duration: {:.2}s", result.duration_secs);
    println!("payload:  {} bytes", result.payload_bytes);
    println!("sha256:   {}", result.checksum);
    if result.diagnostics.drained_bytes > 0 {
        println!("drained:  {} bytes at stop", result.diagnostics.drained_bytes);
    }
}

fn run(cli: Cli) -> Result<RecordingResult, CaptureError> {
    let config = cli.session_config();
    let max_duration = cli.max_duration();
    let cli = Arc::new(cli);

    let source_cli = Arc::clone(&cli);
    let mut controller = SessionController::new(
        move |format: &PcmFormat, _: Option<&CaptureAuthorization>| open_source(&source_cli, format),
    );
    controller.set_delegate(Arc::new(LogDelegate));

    let shutdown = ShutdownSignal::new();
    if let Err(e) = shutdown.install() {
        log::warn!("Could not install Ctrl+C handler: {}", e);
    }

    controller.start(config)?;
    match wait_for_stop(|| controller.state().is_terminal(), &shutdown, max_duration, POLL_INTERVAL) {
        StopReason::Interrupted => eprintln!("Stopping recording..."),
        reason => log::debug!("Recording wait ended: {:?}", reason),
    }
    controller.stop()
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(result) => {
            print_result(&result);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("pcm-recorder: {}", e);
            ExitCode::FAILURE
        }
    }
}
