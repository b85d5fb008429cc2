use async_trait::async_trait;
use log::info;
use rand::Rng;
use std::time::Duration;

/// Runs one task cycle, optionally routed through `endpoint`.
///
/// Implementations report failure by returning `false`; they must not panic
/// for expected errors. A panic is contained to the calling lifeline.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn run_cycle(&self, lifeline: usize, endpoint: Option<&str>) -> bool;
}

/// Random inclusive duration range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn fixed(d: Duration) -> Self {
        Self { min: d, max: d }
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

/// Stand-in executor that only waits out a simulated cycle.
#[derive(Debug, Clone)]
pub struct DryRunExecutor {
    duration: DelayRange,
}

impl DryRunExecutor {
    pub fn new(duration: DelayRange) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl TaskExecutor for DryRunExecutor {
    async fn run_cycle(&self, lifeline: usize, endpoint: Option<&str>) -> bool {
        let hold = self.duration.sample();
        info!(
            "worker #{} dry-run cycle via {} for {}s",
            lifeline,
            endpoint.unwrap_or("direct"),
            hold.as_secs()
        );
        tokio::time::sleep(hold).await;
        true
    }
}
