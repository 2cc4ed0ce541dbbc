//! Periodic stale-state sweep with an owned lifecycle.
//!
//! Whatever process owns the registry creates one [`SweepTask`] and stops
//! it on shutdown; there is no global timer. Each tick asks the registry
//! to report inactivity and evict timed-out client states.

use std::sync::Arc;

use tokio::sync::watch;

use crate::core::config::SweepConfig;
use crate::core::time::Clock;
use crate::delivery::registry::StateRegistry;
use crate::delivery::transmit::SweepHooks;

/// Handle on the background sweep loop.
pub struct SweepTask {
    shutdown: watch::Sender<bool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl SweepTask {
    /// Spawn the sweep loop on the current tokio runtime.
    pub fn start<C: Clock>(
        registry: Arc<StateRegistry<C>>,
        hooks: SweepHooks,
        config: &SweepConfig,
        clock: C,
    ) -> Self {
        let interval = config.interval();
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tracing::debug!(?interval, "stale-state sweep started");
            loop {
                tokio::select! {
                    () = clock.sleep(interval) => {
                        registry.time_out_stale_states(clock.now(), &hooks);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("stale-state sweep stopped");
        });
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signal the loop to exit. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal the loop to exit and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SweepTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
