//! Graceful shutdown.
//!
//! [`Shutdown`] listens for SIGTERM and SIGINT (Ctrl+C on Windows) and
//! cancels a [`CancellationToken`] that stops the HTTP server. Once the
//! server has stopped, [`Shutdown::drain`] settles every payment still in the
//! background queue.

use std::sync::Arc;

use paygate_http::server::{PaymentProcessor, SettlementStats};
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Stops the server on a signal, then drains pending settlements.
#[derive(Debug)]
pub struct Shutdown {
    token: CancellationToken,
    processor: Arc<PaymentProcessor>,
}

impl Shutdown {
    /// Installs the signal handlers. Must be called from within a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if signal registration fails.
    #[allow(clippy::unnecessary_wraps)] // Result needed on Unix for signal registration
    pub fn install(processor: Arc<PaymentProcessor>) -> Result<Self, std::io::Error> {
        let token = CancellationToken::new();
        let inner = token.clone();

        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
                    _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
                    () = inner.cancelled() => return,
                }
                inner.cancel();
            });
        }

        #[cfg(windows)]
        {
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl-C, shutting down"),
                    () = inner.cancelled() => return,
                }
                inner.cancel();
            });
        }

        Ok(Self::with_token(processor, token))
    }

    /// Uses `token` instead of process signals.
    #[must_use]
    pub const fn with_token(processor: Arc<PaymentProcessor>, token: CancellationToken) -> Self {
        Self { token, processor }
    }

    /// Token cancelled when shutdown begins.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolves once shutdown has begun.
    pub async fn signalled(&self) {
        self.token.cancelled().await;
    }

    /// Begins shutdown if it has not begun, then waits for queued
    /// settlements and returns the final counters.
    pub async fn drain(&self) -> Option<SettlementStats> {
        self.token.cancel();
        tracing::info!("Draining settlement queue");
        self.processor.shutdown().await;

        let stats = self.processor.settlement_stats();
        if let Some(stats) = &stats {
            tracing::info!(
                submitted = stats.submitted,
                settled = stats.settled,
                failed = stats.failed,
                rejected = stats.rejected,
                "Settlement queue drained"
            );
        }
        stats
    }
}
