//! Background decay engine.
//!
//! Runs a decay sweep over a [`KnowledgeGraph`] on a fixed interval until
//! its cancellation token fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cairn_config::DecayConfig;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::graph::KnowledgeGraph;

/// Longest sweep interval honored; longer requests are clamped to this.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Spawns periodic decay sweeps.
pub struct DecayEngine;

impl DecayEngine {
    /// Start sweeping `graph` every `interval`.
    ///
    /// The first sweep happens one full interval after spawning. The interval
    /// is clamped to between one millisecond and [`MAX_SWEEP_INTERVAL`]. Must
    /// be called from within a tokio runtime.
    pub fn spawn(graph: KnowledgeGraph, interval: Duration, token: CancellationToken) -> DecayHandle {
        let interval = interval.clamp(Duration::from_millis(1), MAX_SWEEP_INTERVAL);
        let sweeps = Arc::new(AtomicU64::new(0));
        let task_sweeps = Arc::clone(&sweeps);
        let task_token = token.clone();

        info!(interval_secs = interval.as_secs_f64(), "Starting decay engine");

        let task = tokio::spawn(async move {
            let now = tokio::time::Instant::now();
            let start = now.checked_add(interval).unwrap_or(now);
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("Decay engine cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = graph.decay_sweep();
                        let count = task_sweeps.fetch_add(1, Ordering::Relaxed) + 1;
                        debug!(
                            sweep = count,
                            pruned = report.pruned_count(),
                            "Background decay sweep"
                        );
                    }
                }
            }
        });

        DecayHandle {
            token,
            task,
            sweeps,
        }
    }

    /// Start sweeping on the interval configured in `config`.
    pub fn spawn_from_config(
        graph: KnowledgeGraph,
        config: &DecayConfig,
        token: CancellationToken,
    ) -> DecayHandle {
        Self::spawn(graph, Duration::from_secs(config.sweep_interval_secs), token)
    }
}

/// Handle to a running decay engine.
pub struct DecayHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
    sweeps: Arc<AtomicU64>,
}

impl DecayHandle {
    /// Number of sweeps completed so far.
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// The token that stops the engine.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the engine and wait for the task to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Decay engine task failed");
        }
        info!(sweeps = self.sweeps.load(Ordering::Relaxed), "Decay engine stopped");
    }
}
