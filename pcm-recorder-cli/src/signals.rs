//! Shutdown signal for interactive recordings

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Set once SIGINT (Ctrl+C) or SIGTERM arrives.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT/SIGTERM to this flag. Only one handler per process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let signal = self.clone();
        ctrlc::set_handler(move || {
            log::info!("Received stop signal");
            signal.request();
        })
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Why the recording wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The session finished or failed on its own.
    SessionEnded,
    DurationElapsed,
    Interrupted,
}

/// Poll until the session ends, `max_duration` passes or a stop signal arrives.
pub fn wait_for_stop<F>(
    session_ended: F,
    shutdown: &ShutdownSignal,
    max_duration: Option<Duration>,
    poll: Duration,
) -> StopReason
where
    F: Fn() -> bool,
{
    let started = Instant::now();
    loop {
        if shutdown.is_requested() {
            return StopReason::Interrupted;
        }
        if session_ended() {
            return StopReason::SessionEnded;
        }
        if max_duration.is_some_and(|limit| started.elapsed() >= limit) {
            return StopReason::DurationElapsed;
        }
        thread::sleep(poll);
    }
}
