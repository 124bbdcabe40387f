//! Cancellation for Running Ingestions
//!
//! A [`ShutdownHandle`] is a cloneable watch channel. The pipeline checks it
//! before every wave and races it against the inter-wave sleep; waves
//! already in flight always run to completion.
//!
//! ## Usage
//!
//! ```ignore
//! use ledgerdex_client::shutdown::{ShutdownHandle, install_signal_handler};
//!
//! let handle = ShutdownHandle::new();
//! install_signal_handler(handle.clone());
//!
//! let pipeline = IngestPipeline::new(store, config).with_shutdown(handle);
//! let report = pipeline.ingest(records).await?;
//! if report.cancelled {
//!     println!("stopped after {} waves", report.waves_dispatched);
//! }
//! ```

use tokio::sync::watch;
use tracing::info;

/// Shutdown signal type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Received SIGINT (Ctrl+C)
    SigInt,
    /// Received SIGTERM
    SigTerm,
    /// Manual shutdown requested
    Manual,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SigInt => write!(f, "SIGINT (Ctrl+C)"),
            Self::SigTerm => write!(f, "SIGTERM"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Handle for triggering and observing cancellation
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: watch::Sender<Option<ShutdownSignal>>,
    receiver: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(None);
        Self { sender, receiver }
    }

    /// Trigger a manual shutdown
    pub fn shutdown(&self) {
        self.trigger(ShutdownSignal::Manual);
    }

    /// Trigger shutdown with a specific signal. The first signal wins.
    pub fn trigger(&self, signal: ShutdownSignal) {
        self.sender.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(signal);
                true
            } else {
                false
            }
        });
    }

    /// Wait for the shutdown signal
    pub async fn wait(&mut self) -> ShutdownSignal {
        loop {
            if let Some(signal) = *self.receiver.borrow() {
                return signal;
            }
            if self.receiver.changed().await.is_err() {
                return ShutdownSignal::Manual;
            }
        }
    }

    /// Check if shutdown has been signaled
    pub fn is_shutdown(&self) -> bool {
        self.receiver.borrow().is_some()
    }

    pub fn signal(&self) -> Option<ShutdownSignal> {
        *self.receiver.borrow()
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve when the process receives SIGINT or SIGTERM.
pub async fn shutdown_signal() -> ShutdownSignal {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        ShutdownSignal::SigInt
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
        ShutdownSignal::SigTerm
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ShutdownSignal>();

    tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    }
}

/// Forward process signals into `handle` from a background task.
pub fn install_signal_handler(handle: ShutdownHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        info!(%signal, "Received signal, finishing in-flight wave before stopping");
        handle.trigger(signal);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_signal_display() {
        assert_eq!(format!("{}", ShutdownSignal::SigInt), "SIGINT (Ctrl+C)");
        assert_eq!(format!("{}", ShutdownSignal::SigTerm), "SIGTERM");
        assert_eq!(format!("{}", ShutdownSignal::Manual), "manual");
    }

    #[test]
    fn test_shutdown_handle() {
        let handle = ShutdownHandle::new();
        assert!(!handle.is_shutdown());

        handle.shutdown();
        assert!(handle.is_shutdown());
        assert_eq!(handle.signal(), Some(ShutdownSignal::Manual));
    }

    #[test]
    fn test_first_signal_wins() {
        let handle = ShutdownHandle::new();
        handle.trigger(ShutdownSignal::SigTerm);
        handle.shutdown();
        assert_eq!(handle.signal(), Some(ShutdownSignal::SigTerm));
    }

    #[tokio::test]
    async fn test_clones_observe_trigger() {
        let handle = ShutdownHandle::new();
        let mut waiter = handle.clone();

        let task = tokio::spawn(async move { waiter.wait().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.shutdown();

        assert_eq!(task.await.unwrap(), ShutdownSignal::Manual);
    }
}
