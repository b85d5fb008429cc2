//! Staggered fleet of worker lifelines.
//!
//! Lifeline `k + 1` starts a random stagger after lifeline `k`; each lifeline
//! then runs its cycles sequentially with a random pause between them. All
//! lifelines live in one `JoinSet` and are joined before `run` returns.

use crate::executor::{DelayRange, TaskExecutor};
use crate::pool::EndpointPool;
use crate::status::StatusAggregator;
use futures::FutureExt;
use log::{error, info, warn};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Pause between launching consecutive lifelines.
    pub launch_stagger: DelayRange,
    /// Pause between two cycles of the same lifeline.
    pub cycle_pause: DelayRange,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            launch_stagger: DelayRange::new(Duration::from_secs(1), Duration::from_secs(3)),
            cycle_pause: DelayRange::new(Duration::from_secs(10), Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub launched: usize,
    pub completed_cycles: usize,
    pub failed_cycles: usize,
    pub panicked_lifelines: usize,
    /// A shutdown was requested before every lifeline ran all its cycles.
    pub drained: bool,
}

#[derive(Default)]
struct Tally {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

pub struct Orchestrator {
    executor: Arc<dyn TaskExecutor>,
    pool: EndpointPool,
    status: Arc<StatusAggregator>,
    config: OrchestratorConfig,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        pool: EndpointPool,
        status: Arc<StatusAggregator>,
    ) -> Self {
        Self {
            executor,
            pool,
            status,
            config: OrchestratorConfig::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Cancelling `token` drains the fleet: no new lifelines or cycles start,
    /// cycles already running finish.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn status(&self) -> &Arc<StatusAggregator> {
        &self.status
    }

    /// Runs `total_workers` lifelines of `cycles_per_worker` cycles each and
    /// waits for all of them.
    pub async fn run(&self, total_workers: usize, cycles_per_worker: usize) -> RunSummary {
        self.status.reset(total_workers);
        info!(
            "starting {} workers with {} cycles each ({} total)",
            total_workers,
            cycles_per_worker,
            total_workers.saturating_mul(cycles_per_worker)
        );

        let tally = Arc::new(Tally::default());
        let mut lifelines = JoinSet::new();
        let mut summary = RunSummary::default();

        for id in 1..=total_workers {
            if self.shutdown.is_cancelled() {
                break;
            }

            let lifeline = Lifeline {
                id,
                cycles: cycles_per_worker,
                executor: self.executor.clone(),
                pool: self.pool.clone(),
                status: self.status.clone(),
                pause: self.config.cycle_pause,
                shutdown: self.shutdown.clone(),
                tally: tally.clone(),
            };
            lifelines.spawn(lifeline.run());
            summary.launched += 1;

            if id < total_workers {
                let delay = self.config.launch_stagger.sample();
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        while let Some(res) = lifelines.join_next().await {
            if let Err(e) = res {
                summary.panicked_lifelines += 1;
                error!("worker lifeline aborted: {}", e);
            }
        }

        summary.completed_cycles = tally.completed.load(Ordering::Acquire);
        summary.failed_cycles = tally.failed.load(Ordering::Acquire);
        summary.drained = self.shutdown.is_cancelled();
        if summary.drained {
            self.status.request_shutdown();
        }
        self.status.finish();

        info!(
            "all {} workers finished: {} cycles completed, {} failed",
            summary.launched, summary.completed_cycles, summary.failed_cycles
        );
        summary
    }
}

struct Lifeline {
    id: usize,
    cycles: usize,
    executor: Arc<dyn TaskExecutor>,
    pool: EndpointPool,
    status: Arc<StatusAggregator>,
    pause: DelayRange,
    shutdown: CancellationToken,
    tally: Arc<Tally>,
}

impl Lifeline {
    async fn run(self) {
        for cycle in 1..=self.cycles {
            if self.shutdown.is_cancelled() {
                info!("worker #{} stopping before cycle {}", self.id, cycle);
                return;
            }

            let endpoint = self.pool.pick();
            info!(
                "worker #{} starting cycle {}/{} via {}",
                self.id,
                cycle,
                self.cycles,
                endpoint.unwrap_or("direct")
            );

            if self.run_cycle(endpoint).await {
                self.tally.completed.fetch_add(1, Ordering::AcqRel);
                self.status.add_completed(1);
            } else {
                self.tally.failed.fetch_add(1, Ordering::AcqRel);
                warn!("worker #{} cycle {} failed", self.id, cycle);
            }

            if cycle < self.cycles {
                let delay = self.pause.sample();
                tokio::select! {
                    _ = self.shutdown.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    /// A panicking executor counts as a failed cycle.
    async fn run_cycle(&self, endpoint: Option<&str>) -> bool {
        let _active = self.status.enter_cycle();
        match AssertUnwindSafe(self.executor.run_cycle(self.id, endpoint))
            .catch_unwind()
            .await
        {
            Ok(ok) => ok,
            Err(_) => {
                error!("worker #{} executor panicked", self.id);
                false
            }
        }
    }
}
