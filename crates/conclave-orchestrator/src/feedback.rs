//! Periodic trust and performance maintenance.

use crate::tracker::AgentTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Intervals and decay amount for the background feedback tasks.
#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    /// How often performance scores are recomputed from samples.
    pub performance_interval: Duration,
    /// How often load decay is applied.
    pub decay_interval: Duration,
    /// Load removed from every agent per decay tick.
    pub decay_amount: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            performance_interval: Duration::from_secs(60),
            decay_interval: Duration::from_secs(30),
            decay_amount: 0.05,
        }
    }
}

/// Spawns the two periodic feedback tasks over a shared tracker.
///
/// Trust deltas from collaborations are applied synchronously by the
/// engine; this loop only refreshes performance scores and decays load.
pub struct FeedbackLoop;

impl FeedbackLoop {
    /// Starts the background tasks and returns a handle that stops them.
    pub fn spawn(tracker: Arc<AgentTracker>, config: FeedbackConfig) -> FeedbackHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let perf_tracker = tracker.clone();
        let mut perf_shutdown = shutdown_rx.clone();
        let performance_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.performance_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first interval tick fires immediately; consume it so the
            // first refresh happens one full interval after spawn.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("Feedback: refreshing performance scores");
                        perf_tracker.refresh_all_performance().await;
                    }
                    _ = perf_shutdown.changed() => {
                        info!("Feedback: performance task stopping");
                        break;
                    }
                }
            }
        });

        let decay_tracker = tracker;
        let mut decay_shutdown = shutdown_rx;
        let decay_amount = config.decay_amount;
        let decay_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.decay_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!(amount = decay_amount, "Feedback: decaying load");
                        decay_tracker.decay_load(decay_amount).await;
                    }
                    _ = decay_shutdown.changed() => {
                        info!("Feedback: decay task stopping");
                        break;
                    }
                }
            }
        });

        FeedbackHandle {
            shutdown: shutdown_tx,
            tasks: vec![performance_task, decay_task],
        }
    }
}

/// Handle for stopping the feedback tasks.
pub struct FeedbackHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl FeedbackHandle {
    /// Signals both tasks to stop and waits until they have exited.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }

    /// Whether any task is still running.
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }
}
