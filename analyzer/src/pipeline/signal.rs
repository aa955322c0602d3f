//! Host termination signals.
//!
//! SIGINT and SIGTERM both cancel one [`CancellationToken`]. Only the first
//! signal counts; later ones are logged and otherwise ignored so that a
//! shutdown already in progress is never restarted.

use std::sync::{Arc, OnceLock};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl ShutdownSignal {
    /// Conventional `128 + signo` exit status.
    pub fn exit_code(self) -> u8 {
        match self {
            ShutdownSignal::Interrupt => 130,
            ShutdownSignal::Terminate => 143,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShutdownTrigger {
    token: CancellationToken,
    first: Arc<OnceLock<ShutdownSignal>>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `signal` and cancel the token. Returns `false` if a signal had
    /// already been recorded.
    pub fn trigger(&self, signal: ShutdownSignal) -> bool {
        if self.first.set(signal).is_ok() {
            tracing::warn!(?signal, "Shutdown requested, flushing results");
            self.token.cancel();
            true
        } else {
            tracing::warn!(?signal, "Already shutting down, ignoring signal");
            false
        }
    }

    /// The first signal received, if any.
    pub fn signal(&self) -> Option<ShutdownSignal> {
        self.first.get().copied()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Listen for SIGINT (and SIGTERM on unix) for the rest of the process.
pub fn spawn_signal_listener(trigger: ShutdownTrigger) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut terminate = terminate_stream();
        loop {
            let signal = tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => ShutdownSignal::Interrupt,
                    Err(e) => {
                        tracing::error!("Failed to listen for ctrl-c: {}", e);
                        break;
                    }
                },
                _ = next_terminate(&mut terminate) => ShutdownSignal::Terminate,
            };
            trigger.trigger(signal);
        }
    })
}

#[cfg(unix)]
type TerminateStream = Option<tokio::signal::unix::Signal>;

#[cfg(not(unix))]
type TerminateStream = ();

#[cfg(unix)]
fn terminate_stream() -> TerminateStream {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!("Failed to listen for SIGTERM: {}", e);
            None
        }
    }
}

#[cfg(not(unix))]
fn terminate_stream() -> TerminateStream {}

#[cfg(unix)]
async fn next_terminate(stream: &mut TerminateStream) {
    match stream {
        Some(stream) => {
            if stream.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn next_terminate(_stream: &mut TerminateStream) {
    std::future::pending::<()>().await
}
