//! Time-bounded concurrent vetting of candidate proxies.
//!
//! Candidates are deduplicated, then probed through a bounded pool. When the
//! run's deadline passes, no further probes are issued and probes still in
//! flight are cancelled and their results dropped.

use crate::endpoint::{dedup_candidates, VerifiedEndpoint, VerifiedSet};
use crate::error::Result;
use crate::store::EndpointStore;
use crate::verification::Prober;
use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONCURRENCY: usize = 50;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(1200);

#[derive(Debug, Clone)]
pub struct VettingReport {
    pub verified: VerifiedSet,
    /// Unique candidates after normalization.
    pub candidates: usize,
    /// Probes that finished, successfully or not, before the run ended.
    pub probed: usize,
    pub elapsed: Duration,
    /// The run stopped because the time budget (or an external cancel) cut it short.
    pub deadline_hit: bool,
}

impl VettingReport {
    pub fn is_empty(&self) -> bool {
        self.verified.is_empty()
    }
}

pub struct Vetter {
    prober: Arc<dyn Prober>,
    concurrency: usize,
    probe_timeout: Duration,
    shutdown: CancellationToken,
}

impl Vetter {
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self {
            prober,
            concurrency: DEFAULT_CONCURRENCY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Ends any run in progress early when `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn vet<I, S>(&self, candidates: I, budget: Duration) -> VettingReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = Instant::now();
        let candidates = dedup_candidates(candidates);
        let total = candidates.len();

        if total == 0 {
            return VettingReport {
                verified: VerifiedSet::default(),
                candidates: 0,
                probed: 0,
                elapsed: start.elapsed(),
                deadline_hit: false,
            };
        }

        info!("testing {} proxies with {}s time limit", total, budget.as_secs());

        let run = self.shutdown.child_token();
        let prober = self.prober.clone();
        let probe_timeout = self.probe_timeout;

        let mut probes = stream::iter(candidates)
            .map(|candidate| {
                let prober = prober.clone();
                let run = run.clone();
                async move {
                    let latency = tokio::select! {
                        biased;
                        _ = run.cancelled() => return None,
                        res = tokio::time::timeout(probe_timeout, prober.probe(&candidate)) => {
                            res.ok().flatten()
                        }
                    };
                    Some((candidate, latency))
                }
            })
            .buffer_unordered(self.concurrency);

        let mut working = Vec::new();
        let mut probed = 0;
        let mut deadline_hit = false;
        // `sleep` clamps budgets past the clock's range instead of overflowing.
        let sleep = tokio::time::sleep(budget.saturating_sub(start.elapsed()));
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                _ = &mut sleep => {
                    warn!("time limit of {}s reached, stopping proxy testing", budget.as_secs());
                    deadline_hit = true;
                    break;
                }
                _ = run.cancelled() => {
                    warn!("proxy testing cancelled");
                    deadline_hit = true;
                    break;
                }
                next = probes.next() => match next {
                    Some(Some((candidate, latency))) => {
                        probed += 1;
                        if let Some(latency) = latency {
                            working.push(VerifiedEndpoint::probed(candidate, latency));
                        }
                    }
                    Some(None) => {}
                    None => break,
                }
            }
        }

        run.cancel();
        drop(probes);

        let verified = VerifiedSet::from_probes(working);
        let elapsed = start.elapsed();
        if verified.is_empty() {
            warn!(
                "no working proxies found after testing {} proxies in {:.2}s",
                probed,
                elapsed.as_secs_f64()
            );
        } else {
            info!(
                "found {} working proxies out of {} tested in {:.2}s",
                verified.len(),
                probed,
                elapsed.as_secs_f64()
            );
        }

        VettingReport {
            verified,
            candidates: total,
            probed,
            elapsed,
            deadline_hit,
        }
    }

    /// Vets and writes the result to `store`. Returns the report and whether
    /// the store was replaced; an empty result keeps the previous store.
    pub async fn vet_and_persist<I, S>(
        &self,
        candidates: I,
        budget: Duration,
        store: &EndpointStore,
    ) -> Result<(VettingReport, bool)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let report = self.vet(candidates, budget).await;
        let written = store.save(&report.verified).await?;
        Ok((report, written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedProber {
        latencies: HashMap<String, Duration>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProber {
        fn new(entries: &[(&str, u64)]) -> Self {
            Self {
                latencies: entries
                    .iter()
                    .map(|(c, ms)| (c.to_string(), Duration::from_millis(*ms)))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, candidate: &str) -> Option<Duration> {
            self.calls.lock().unwrap().push(candidate.to_string());
            let latency = *self.latencies.get(candidate)?;
            tokio::time::sleep(latency).await;
            Some(latency)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_candidates_are_discarded() {
        let prober = Arc::new(ScriptedProber::new(&[("a:1", 100)]));
        let report = Vetter::new(prober).vet(["a:1", "b:2"], Duration::from_secs(60)).await;
        assert_eq!(report.verified.addrs().collect::<Vec<_>>(), vec!["a:1"]);
        assert_eq!(report.probed, 2);
        assert!(!report.deadline_hit);
    }

    #[tokio::test(start_paused = true)]
    async fn external_cancel_stops_run() {
        let prober = Arc::new(ScriptedProber::new(&[("a:1", 5_000)]));
        let token = CancellationToken::new();
        let vetter = Vetter::new(prober).with_shutdown(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });
        let report = vetter.vet(["a:1"], Duration::from_secs(60)).await;
        canceller.await.unwrap();

        assert!(report.deadline_hit);
        assert!(report.verified.is_empty());
        assert!(report.elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_width_bounds_in_flight_probes() {
        let entries: Vec<(String, u64)> = (0..10).map(|i| (format!("h{}:1", i), 1_000)).collect();
        let refs: Vec<(&str, u64)> = entries.iter().map(|(c, ms)| (c.as_str(), *ms)).collect();
        let prober = Arc::new(ScriptedProber::new(&refs));

        let report = Vetter::new(prober)
            .with_concurrency(2)
            .vet(entries.iter().map(|(c, _)| c.as_str()), Duration::from_secs(60))
            .await;

        assert_eq!(report.verified.len(), 10);
        // ten 1s probes, two at a time
        assert!(report.elapsed >= Duration::from_secs(5));
    }
}
