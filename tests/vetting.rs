use async_trait::async_trait;
use proxyfleet::{EndpointStore, Prober, Vetter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Candidates listed with a latency answer after that long; `None` never answers.
struct FakeProber {
    script: HashMap<String, Option<Duration>>,
    calls: Mutex<Vec<String>>,
}

impl FakeProber {
    fn new(script: &[(&str, Option<u64>)]) -> Arc<Self> {
        Arc::new(Self {
            script: script
                .iter()
                .map(|(c, ms)| (c.to_string(), ms.map(Duration::from_millis)))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, candidate: &str) -> Option<Duration> {
        self.calls.lock().unwrap().push(candidate.to_string());
        match self.script.get(candidate) {
            Some(Some(latency)) => {
                tokio::time::sleep(*latency).await;
                Some(*latency)
            }
            Some(None) => {
                std::future::pending::<()>().await;
                None
            }
            None => None,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn duplicate_candidates_are_probed_once() {
    let prober = FakeProber::new(&[("a:1", Some(100)), ("b:2", Some(200))]);
    let report = Vetter::new(prober.clone())
        .vet(["a:1", " a:1", "a:1  ", "\tb:2\n", "b:2", "", "   "], Duration::from_secs(60))
        .await;

    let mut calls = prober.calls();
    calls.sort();
    assert_eq!(calls, vec!["a:1", "b:2"]);
    assert_eq!(report.candidates, 2);
    assert_eq!(report.verified.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn verified_set_is_sorted_by_latency() {
    let prober = FakeProber::new(&[("A", Some(900)), ("B", Some(200)), ("C", Some(500))]);
    let report = Vetter::new(prober).vet(["A", "B", "C"], Duration::from_secs(60)).await;

    assert_eq!(report.verified.addrs().collect::<Vec<_>>(), vec!["B", "C", "A"]);
    let latencies: Vec<_> = report.verified.iter().map(|e| e.latency.unwrap()).collect();
    assert!(latencies.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn empty_input_issues_no_probes_and_keeps_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("working_proxies.txt");
    std::fs::write(&path, "old:1\n").unwrap();
    let store = EndpointStore::new(&path);

    let prober = FakeProber::new(&[]);
    let start = Instant::now();
    let (report, written) = Vetter::new(prober.clone())
        .vet_and_persist(Vec::<String>::new(), Duration::from_secs(60), &store)
        .await
        .unwrap();

    assert!(report.is_empty());
    assert!(!written);
    assert_eq!(report.probed, 0);
    assert!(prober.calls().is_empty());
    assert!(start.elapsed() < Duration::from_millis(10));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "old:1\n");
}

#[tokio::test(start_paused = true)]
async fn no_successes_keeps_previous_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("working_proxies.txt");
    std::fs::write(&path, "old:1\n").unwrap();
    let store = EndpointStore::new(&path);

    let prober = FakeProber::new(&[]);
    let (report, written) = Vetter::new(prober.clone())
        .vet_and_persist(["x:1", "y:2"], Duration::from_secs(60), &store)
        .await
        .unwrap();

    assert!(report.is_empty());
    assert!(!written);
    assert_eq!(report.probed, 2);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "old:1\n");
}

#[tokio::test(start_paused = true)]
async fn run_stops_at_time_budget() {
    let names: Vec<String> = (0..100).map(|i| format!("10.0.0.{}:80", i)).collect();
    let script: Vec<(&str, Option<u64>)> = names.iter().map(|n| (n.as_str(), Some(5_000))).collect();
    let prober = FakeProber::new(&script);

    let budget = Duration::from_secs(12);
    let probe_timeout = Duration::from_secs(10);
    let start = Instant::now();
    let report = Vetter::new(prober.clone())
        .with_concurrency(10)
        .with_probe_timeout(probe_timeout)
        .vet(&names, budget)
        .await;

    assert!(start.elapsed() <= budget + probe_timeout);
    assert!(report.deadline_hit);
    assert!(report.verified.len() <= names.len());
    assert!(report.verified.len() < names.len());
    // unstarted probes were never issued
    assert!(prober.calls().len() < names.len());
}

#[tokio::test(start_paused = true)]
async fn zero_budget_issues_no_probes() {
    let prober = FakeProber::new(&[("a:1", Some(10))]);
    let report = Vetter::new(prober.clone()).vet(["a:1"], Duration::ZERO).await;
    assert!(report.is_empty());
    assert!(report.deadline_hit);
    assert!(prober.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unbounded_budget_runs_to_completion() {
    let prober = FakeProber::new(&[("a:1", Some(10)), ("b:2", Some(20))]);
    let report = Vetter::new(prober)
        .vet(["a:1", "b:2"], Duration::from_secs(u64::MAX))
        .await;
    assert_eq!(report.verified.addrs().collect::<Vec<_>>(), vec!["a:1", "b:2"]);
    assert!(!report.deadline_hit);
}

#[tokio::test(start_paused = true)]
async fn end_to_end_two_of_three() {
    let dir = tempfile::tempdir().unwrap();
    let store = EndpointStore::new(dir.path().join("working_proxies.txt"));
    let prober = FakeProber::new(&[
        ("candidateA:80", Some(1_000)),
        ("candidateB:80", Some(300)),
        ("candidateC:80", None),
    ]);

    let (report, written) = Vetter::new(prober)
        .with_probe_timeout(Duration::from_secs(10))
        .vet_and_persist(
            ["candidateA:80", "candidateB:80", "candidateC:80"],
            Duration::from_secs(10),
            &store,
        )
        .await
        .unwrap();

    let got: Vec<_> = report
        .verified
        .iter()
        .map(|e| (e.addr.as_str(), e.latency.unwrap()))
        .collect();
    assert_eq!(
        got,
        vec![
            ("candidateB:80", Duration::from_millis(300)),
            ("candidateA:80", Duration::from_millis(1_000)),
        ]
    );
    assert!(written);
    assert_eq!(
        std::fs::read_to_string(store.path()).unwrap(),
        "candidateB:80\ncandidateA:80\n"
    );
}

#[tokio::test(start_paused = true)]
async fn hanging_probe_is_bounded_by_probe_timeout() {
    let prober = FakeProber::new(&[("slow:1", None), ("fast:1", Some(50))]);
    let start = Instant::now();
    let report = Vetter::new(prober)
        .with_probe_timeout(Duration::from_secs(2))
        .vet(["slow:1", "fast:1"], Duration::from_secs(60))
        .await;

    assert!(!report.deadline_hit);
    assert_eq!(report.probed, 2);
    assert_eq!(report.verified.addrs().collect::<Vec<_>>(), vec!["fast:1"]);
    assert!(start.elapsed() < Duration::from_secs(3));
}
