//! Idle session sweeper.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info};

use gembridge_core::channel::ChatTransport;
use gembridge_core::manager::SessionManager;

/// Background task that closes sessions idle past the timeout.
///
/// Runs on a fixed cadence. Each pass deactivates every expired session
/// in one store write, then tells the affected users their session ended.
pub struct IdleSweeper {
    shutdown_tx: mpsc::Sender<()>,
}

impl IdleSweeper {
    /// Spawn the sweeper loop. The first pass runs immediately.
    pub fn start(
        manager: Arc<SessionManager>,
        transport: Arc<dyn ChatTransport>,
        idle_timeout_secs: u64,
        sweep_interval_secs: u64,
        notice: String,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let idle_timeout = chrono::Duration::seconds(idle_timeout_secs as i64);

        tokio::spawn(async move {
            info!(
                "🧹 Idle sweeper running every {}s (timeout {}s)",
                sweep_interval_secs, idle_timeout_secs
            );

            loop {
                if shutdown_rx.try_recv().is_ok() {
                    info!("Idle sweeper shutting down...");
                    break;
                }

                match manager.sweep_idle(Utc::now(), idle_timeout).await {
                    Ok(expired) => {
                        for user_id in expired {
                            if let Err(e) = transport.send_text(&user_id, &notice).await {
                                error!("Failed to notify {} about expiry: {}", user_id, e);
                            }
                        }
                    }
                    Err(e) => error!("Idle sweep failed: {}", e),
                }

                tokio::time::sleep(Duration::from_secs(sweep_interval_secs)).await;
            }
        });

        Self { shutdown_tx }
    }

    /// Stop the sweeper.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
