//! Process-wide progress counters shared by every worker lifeline.

use log::info;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub is_running: bool,
    pub shutting_down: bool,
    pub total_workers: usize,
    pub active_workers: usize,
    pub completed_cycles: usize,
    pub start_time: Option<SystemTime>,
    pub last_update: SystemTime,
}

impl StatusSnapshot {
    pub fn uptime(&self) -> Option<Duration> {
        let start = self.start_time?;
        SystemTime::now().duration_since(start).ok()
    }
}

/// Lock-free counter set. Each field is its own atomic, so concurrent
/// increments never get lost and a snapshot never sees a torn value.
#[derive(Debug, Default)]
pub struct StatusAggregator {
    is_running: AtomicBool,
    shutting_down: AtomicBool,
    total_workers: AtomicUsize,
    active_workers: AtomicUsize,
    completed_cycles: AtomicUsize,
    // millis since the epoch; 0 = unset
    start_time: AtomicU64,
    last_update: AtomicU64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn from_millis(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(&self) {
        self.last_update.store(now_millis(), Ordering::Release);
    }

    /// Zeroes the counters and marks a new run as started.
    pub fn reset(&self, total_workers: usize) {
        self.total_workers.store(total_workers, Ordering::Release);
        self.active_workers.store(0, Ordering::Release);
        self.completed_cycles.store(0, Ordering::Release);
        self.shutting_down.store(false, Ordering::Release);
        self.start_time.store(now_millis(), Ordering::Release);
        self.is_running.store(true, Ordering::Release);
        self.touch();
    }

    /// Absolute set, clamped to `total_workers`. Lifelines use
    /// [`enter_cycle`](Self::enter_cycle) instead.
    ///
    /// Do not call this while [`ActiveGuard`]s are outstanding: the store
    /// overwrites their increments, and their later drops stop at zero, so
    /// the count ends up below the number of cycles actually running.
    pub fn set_active(&self, n: usize) {
        let cap = self.total_workers.load(Ordering::Acquire);
        self.active_workers.store(n.min(cap), Ordering::Release);
        self.touch();
    }

    pub fn add_completed(&self, n: usize) {
        self.completed_cycles.fetch_add(n, Ordering::AcqRel);
        self.touch();
    }

    /// Marks one lifeline as inside a cycle until the guard drops.
    pub fn enter_cycle(self: &Arc<Self>) -> ActiveGuard {
        self.active_workers.fetch_add(1, Ordering::AcqRel);
        self.touch();
        ActiveGuard {
            status: Arc::clone(self),
        }
    }

    fn exit_cycle(&self) {
        let _ = self
            .active_workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        self.touch();
    }

    pub fn request_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.touch();
    }

    /// Freezes the run: not running, nobody active.
    pub fn finish(&self) {
        self.active_workers.store(0, Ordering::Release);
        self.is_running.store(false, Ordering::Release);
        self.touch();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let total_workers = self.total_workers.load(Ordering::Acquire);
        let start = self.start_time.load(Ordering::Acquire);
        StatusSnapshot {
            is_running: self.is_running.load(Ordering::Acquire),
            shutting_down: self.shutting_down.load(Ordering::Acquire),
            total_workers,
            active_workers: self.active_workers.load(Ordering::Acquire).min(total_workers),
            completed_cycles: self.completed_cycles.load(Ordering::Acquire),
            start_time: (start != 0).then(|| from_millis(start)),
            last_update: from_millis(self.last_update.load(Ordering::Acquire)),
        }
    }
}

/// Decrements the active count on drop, including during a panic unwind.
#[derive(Debug)]
pub struct ActiveGuard {
    status: Arc<StatusAggregator>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.status.exit_cycle();
    }
}

/// Consumer of status snapshots, e.g. a dashboard or a log line.
pub trait StatusSink: Send + Sync {
    fn publish(&self, snapshot: &StatusSnapshot);
}

#[derive(Debug, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn publish(&self, s: &StatusSnapshot) {
        let uptime = s.uptime().map(|d| d.as_secs()).unwrap_or(0);
        info!(
            "status: {} | workers {}/{} active | {} cycles completed | uptime {}h {}m {}s",
            if s.is_running { "running" } else { "idle" },
            s.active_workers,
            s.total_workers,
            s.completed_cycles,
            uptime / 3600,
            (uptime % 3600) / 60,
            uptime % 60
        );
    }
}

/// Whether a status sink is attached, decided once at startup.
#[derive(Clone, Default)]
pub enum StatusReporter {
    #[default]
    Absent,
    Present {
        sink: Arc<dyn StatusSink>,
        interval: Duration,
    },
}

impl StatusReporter {
    pub fn from_interval(sink: Arc<dyn StatusSink>, interval: Duration) -> Self {
        if interval.is_zero() {
            StatusReporter::Absent
        } else {
            StatusReporter::Present { sink, interval }
        }
    }

    /// Publishes periodically until `stop` is cancelled, then once more.
    pub fn spawn(
        &self,
        status: Arc<StatusAggregator>,
        stop: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let StatusReporter::Present { sink, interval } = self else {
            return None;
        };
        let sink = sink.clone();
        let interval = *interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => sink.publish(&status.snapshot()),
                }
            }
            sink.publish(&status.snapshot());
        }))
    }
}
