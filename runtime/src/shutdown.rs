//! Process signals and their exit codes.
//!
//! - `SIGINT` (Ctrl+C): exit immediately with 130
//! - `SIGTERM`: drain, close connections, exit with 143

use std::io;
use tracing::info;

/// A termination signal received by the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// `SIGINT`
    Interrupt,
    /// `SIGTERM`
    Terminate,
}

impl Signal {
    /// Conventional exit code: 128 + signal number.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Interrupt => 130,
            Self::Terminate => 143,
        }
    }
}

/// Wait for `SIGINT` or `SIGTERM`.
///
/// # Errors
///
/// Returns an error if a signal handler cannot be installed.
pub async fn wait_for_signal() -> io::Result<Signal> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        let received = tokio::select! {
            _ = interrupt.recv() => Signal::Interrupt,
            _ = terminate.recv() => Signal::Terminate,
        };
        info!(signal = ?received, "Received shutdown signal");
        Ok(received)
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!(signal = ?Signal::Interrupt, "Received shutdown signal");
        Ok(Signal::Interrupt)
    }
}
