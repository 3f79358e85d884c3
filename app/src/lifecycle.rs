//! Process lifecycle: what stops a process, and how it stops.
//!
//! - `SIGINT` stops immediately, exit code 130
//! - `SIGTERM` stops accepting requests, drains in-flight ones (bounded by
//!   the shutdown timeout), then exits 143 after the caller closes its
//!   connections
//! - a fatal event bus error exits 1

use axum::Router;
use std::future::Future;
use std::io;
use std::process::ExitCode;
use std::time::Duration;
use todo_stats_core::event_bus::EventBusError;
use todo_stats_runtime::{Signal, wait_for_signal};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Why a process is stopping.
#[derive(Debug)]
pub enum Stop {
    /// `SIGINT`
    Interrupt,
    /// `SIGTERM`
    Terminate,
    /// The event bus connection became unusable.
    Fatal(EventBusError),
}

impl Stop {
    /// Process exit code for this stop.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Interrupt => ExitCode::from(Signal::Interrupt.exit_code()),
            Self::Terminate => ExitCode::from(Signal::Terminate.exit_code()),
            Self::Fatal(_) => ExitCode::FAILURE,
        }
    }

    /// Whether the process should drain and close connections first.
    #[must_use]
    pub const fn is_graceful(&self) -> bool {
        matches!(self, Self::Terminate)
    }
}

impl From<Signal> for Stop {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Interrupt => Self::Interrupt,
            Signal::Terminate => Self::Terminate,
        }
    }
}

/// Wait for a termination signal or for `fatal` to yield an error.
///
/// A `fatal` future resolving to `None` never stops the process.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
pub async fn wait_for_stop<F>(fatal: F) -> io::Result<Stop>
where
    F: Future<Output = Option<EventBusError>>,
{
    tokio::select! {
        signal = wait_for_signal() => Ok(Stop::from(signal?)),
        Some(error) = fatal => {
            error!(error = %error, "Fatal event bus error");
            Ok(Stop::Fatal(error))
        }
    }
}

/// Serve `router` until `stop` resolves.
///
/// On a graceful stop the listener is closed and in-flight requests get up
/// to `drain_timeout` to finish. On any other stop the server is abandoned.
///
/// # Errors
///
/// Returns an error if the server fails, or if `stop` does.
pub async fn serve_until<S>(
    listener: TcpListener,
    router: Router,
    stop: S,
    drain_timeout: Duration,
) -> io::Result<Stop>
where
    S: Future<Output = io::Result<Stop>>,
{
    let (trigger, triggered) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = triggered.await;
            })
            .await
    });

    let stop = tokio::select! {
        stop = stop => stop?,
        result = &mut server => {
            return Err(match result {
                Ok(Ok(())) => io::Error::other("HTTP server stopped unexpectedly"),
                Ok(Err(e)) => e,
                Err(e) => io::Error::other(e),
            });
        }
    };

    if stop.is_graceful() {
        info!(timeout_secs = drain_timeout.as_secs(), "Draining in-flight requests");
        let _ = trigger.send(());
        match tokio::time::timeout(drain_timeout, server).await {
            Ok(_) => info!("HTTP server drained"),
            Err(_) => warn!("Drain timed out, abandoning remaining requests"),
        }
    } else {
        server.abort();
    }

    Ok(stop)
}
