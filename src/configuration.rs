//! Settings: built-in defaults, then an optional `config.toml`, then the
//! environment (including a `.env` file).

use crate::error::{Error, Result};
use crate::executor::DelayRange;
use crate::orchestrator::OrchestratorConfig;
use crate::verification::DEFAULT_PROBE_URL;
use crate::vetting::{DEFAULT_CONCURRENCY, DEFAULT_PROBE_TIMEOUT, DEFAULT_TIME_BUDGET};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on the vetting time budget: one week.
pub const MAX_TIME_LIMIT_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub use_proxies: bool,
    pub scan_proxies: bool,
    /// Continue without proxies when none could be vetted.
    pub allow_direct: bool,
    pub num_workers: usize,
    pub cycles_per_worker: usize,
    /// Seconds between status reports; 0 disables reporting.
    pub status_interval_secs: u64,
    pub vetting: VettingSettings,
    pub workers: WorkerSettings,
    pub storage: StorageSettings,
    pub providers: Providers,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VettingSettings {
    pub time_limit_secs: u64,
    pub concurrency: usize,
    pub probe_timeout_secs: u64,
    pub probe_url: String,
    pub allow_private: bool,
    /// Skip a fresh scan when the store already holds this many endpoints.
    pub reuse_threshold: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub launch_delay_min_ms: u64,
    pub launch_delay_max_ms: u64,
    pub cycle_delay_min_secs: u64,
    pub cycle_delay_max_secs: u64,
    pub cycle_duration_min_secs: u64,
    pub cycle_duration_max_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub raw_path: PathBuf,
    pub verified_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Providers {
    pub proxyscrape: ProviderConfig,
    pub free_proxy_list: ProviderConfig,
    pub geonode: ProviderConfig,
    pub cool_proxy: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for Providers {
    fn default() -> Self {
        Self {
            proxyscrape: ProviderConfig::default(),
            free_proxy_list: ProviderConfig::default(),
            geonode: ProviderConfig::default(),
            cool_proxy: ProviderConfig::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_proxies: true,
            scan_proxies: true,
            allow_direct: true,
            num_workers: 100,
            cycles_per_worker: 5,
            status_interval_secs: 60,
            vetting: VettingSettings::default(),
            workers: WorkerSettings::default(),
            storage: StorageSettings::default(),
            providers: Providers::default(),
        }
    }
}

impl Default for VettingSettings {
    fn default() -> Self {
        Self {
            time_limit_secs: DEFAULT_TIME_BUDGET.as_secs(),
            concurrency: DEFAULT_CONCURRENCY,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
            probe_url: DEFAULT_PROBE_URL.to_string(),
            allow_private: false,
            reuse_threshold: None,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            launch_delay_min_ms: 1_000,
            launch_delay_max_ms: 3_000,
            cycle_delay_min_secs: 10,
            cycle_delay_max_secs: 30,
            cycle_duration_min_secs: 30,
            cycle_duration_max_secs: 180,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            raw_path: PathBuf::from("proxies.txt"),
            verified_path: PathBuf::from("working_proxies.txt"),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{} expects a boolean, got {:?}", key, value))),
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} expects a number, got {:?}", key, value)))
}

impl Settings {
    /// Loads `path` (or `config.toml` when `None`), then applies the process
    /// environment. A missing file falls back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let path = path.unwrap_or_else(|| Path::new("config.toml"));
        let mut settings = match std::fs::read_to_string(path) {
            Ok(data) => Self::from_toml(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    /// Overrides fields from environment-style keys looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        macro_rules! env_bool {
            ($key:literal, $field:expr) => {
                if let Some(v) = var($key) {
                    $field = parse_bool($key, &v)?;
                }
            };
        }
        macro_rules! env_num {
            ($key:literal, $field:expr) => {
                if let Some(v) = var($key) {
                    $field = parse_num($key, &v)?;
                }
            };
        }

        env_bool!("USE_PROXIES", self.use_proxies);
        env_bool!("SCAN_PROXIES", self.scan_proxies);
        env_bool!("ALLOW_DIRECT", self.allow_direct);
        env_num!("NUM_BOTS", self.num_workers);
        env_num!("VIEWS_PER_BOT", self.cycles_per_worker);
        env_num!("STATUS_INTERVAL_SECS", self.status_interval_secs);

        env_num!("PROXY_TEST_TIME_LIMIT", self.vetting.time_limit_secs);
        env_num!("PROXY_TEST_CONCURRENCY", self.vetting.concurrency);
        env_num!("PROXY_TEST_TIMEOUT", self.vetting.probe_timeout_secs);
        env_bool!("PROXY_ALLOW_PRIVATE", self.vetting.allow_private);
        if let Some(v) = var("PROXY_TEST_URL") {
            self.vetting.probe_url = v;
        }
        if let Some(v) = var("PROXY_REUSE_THRESHOLD") {
            self.vetting.reuse_threshold = Some(parse_num("PROXY_REUSE_THRESHOLD", &v)?);
        }

        env_num!("LAUNCH_DELAY_MIN_MS", self.workers.launch_delay_min_ms);
        env_num!("LAUNCH_DELAY_MAX_MS", self.workers.launch_delay_max_ms);
        env_num!("CYCLE_DELAY_MIN_SECS", self.workers.cycle_delay_min_secs);
        env_num!("CYCLE_DELAY_MAX_SECS", self.workers.cycle_delay_max_secs);
        env_num!("CYCLE_DURATION_MIN_SECS", self.workers.cycle_duration_min_secs);
        env_num!("CYCLE_DURATION_MAX_SECS", self.workers.cycle_duration_max_secs);

        if let Some(v) = var("RAW_PROXIES_FILE") {
            self.storage.raw_path = PathBuf::from(v);
        }
        if let Some(v) = var("WORKING_PROXIES_FILE") {
            self.storage.verified_path = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(Error::Config("NUM_BOTS must be at least 1".into()));
        }
        if self.cycles_per_worker == 0 {
            return Err(Error::Config("VIEWS_PER_BOT must be at least 1".into()));
        }
        if self.vetting.time_limit_secs > MAX_TIME_LIMIT_SECS {
            return Err(Error::Config(format!(
                "PROXY_TEST_TIME_LIMIT must be at most {} seconds",
                MAX_TIME_LIMIT_SECS
            )));
        }
        if self.vetting.concurrency == 0 {
            return Err(Error::Config("PROXY_TEST_CONCURRENCY must be at least 1".into()));
        }
        let w = &self.workers;
        let ranges = [
            ("launch delay", w.launch_delay_min_ms, w.launch_delay_max_ms),
            ("cycle delay", w.cycle_delay_min_secs, w.cycle_delay_max_secs),
            ("cycle duration", w.cycle_duration_min_secs, w.cycle_duration_max_secs),
        ];
        for (name, min, max) in ranges {
            if min > max {
                return Err(Error::Config(format!("{} range is inverted: {} > {}", name, min, max)));
            }
        }
        Ok(())
    }

    /// Overrides the fleet size and re-checks it.
    pub fn with_fleet_size(mut self, workers: Option<usize>, cycles: Option<usize>) -> Result<Self> {
        if let Some(workers) = workers {
            self.num_workers = workers;
        }
        if let Some(cycles) = cycles {
            self.cycles_per_worker = cycles;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.vetting.time_limit_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.vetting.probe_timeout_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        let w = &self.workers;
        OrchestratorConfig {
            launch_stagger: DelayRange::new(
                Duration::from_millis(w.launch_delay_min_ms),
                Duration::from_millis(w.launch_delay_max_ms),
            ),
            cycle_pause: DelayRange::new(
                Duration::from_secs(w.cycle_delay_min_secs),
                Duration::from_secs(w.cycle_delay_max_secs),
            ),
        }
    }

    pub fn cycle_duration(&self) -> DelayRange {
        DelayRange::new(
            Duration::from_secs(self.workers.cycle_duration_min_secs),
            Duration::from_secs(self.workers.cycle_duration_max_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert!(s.use_proxies && s.scan_proxies);
        assert_eq!(s.num_workers, 100);
        assert_eq!(s.cycles_per_worker, 5);
        assert_eq!(s.time_budget(), Duration::from_secs(1200));
        assert_eq!(s.vetting.concurrency, 50);
        assert_eq!(s.probe_timeout(), Duration::from_secs(10));
        assert_eq!(s.vetting.reuse_threshold, None);
        s.validate().unwrap();
    }

    #[test]
    fn env_overrides() {
        let mut s = Settings::default();
        s.apply_env(env(&[
            ("USE_PROXIES", "False"),
            ("SCAN_PROXIES", "0"),
            ("NUM_BOTS", "7"),
            ("VIEWS_PER_BOT", " 2 "),
            ("PROXY_TEST_TIME_LIMIT", "30"),
            ("PROXY_REUSE_THRESHOLD", "20"),
            ("WORKING_PROXIES_FILE", "/tmp/ok.txt"),
        ]))
        .unwrap();

        assert!(!s.use_proxies);
        assert!(!s.scan_proxies);
        assert_eq!(s.num_workers, 7);
        assert_eq!(s.cycles_per_worker, 2);
        assert_eq!(s.time_budget(), Duration::from_secs(30));
        assert_eq!(s.vetting.reuse_threshold, Some(20));
        assert_eq!(s.storage.verified_path, PathBuf::from("/tmp/ok.txt"));
    }

    #[test]
    fn bad_values_name_the_key() {
        let mut s = Settings::default();
        let err = s.apply_env(env(&[("NUM_BOTS", "many")])).unwrap_err();
        assert!(err.to_string().contains("NUM_BOTS"));

        let err = s.apply_env(env(&[("USE_PROXIES", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("USE_PROXIES"));
    }

    #[test]
    fn toml_partial_file() {
        let s = Settings::from_toml(
            r#"
            num_workers = 3

            [vetting]
            concurrency = 8

            [providers.cool_proxy]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(s.num_workers, 3);
        assert_eq!(s.cycles_per_worker, 5);
        assert_eq!(s.vetting.concurrency, 8);
        assert_eq!(s.vetting.probe_timeout_secs, 10);
        assert!(!s.providers.cool_proxy.enabled);
        assert!(s.providers.proxyscrape.enabled);
    }

    #[test]
    fn validation_rejects_zero_and_inverted() {
        let mut s = Settings::default();
        s.num_workers = 0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.workers.cycle_delay_min_secs = 40;
        assert!(s.validate().is_err());
    }

    #[test]
    fn oversized_time_limit_is_rejected() {
        let mut s = Settings::default();
        s.apply_env(env(&[("PROXY_TEST_TIME_LIMIT", "18446744073709551615")]))
            .unwrap();
        let err = s.validate().unwrap_err().to_string();
        assert!(err.contains("PROXY_TEST_TIME_LIMIT"), "{}", err);

        s.vetting.time_limit_secs = MAX_TIME_LIMIT_SECS;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn fleet_size_overrides_are_validated() {
        let s = Settings::default().with_fleet_size(Some(3), None).unwrap();
        assert_eq!(s.num_workers, 3);
        assert_eq!(s.cycles_per_worker, Settings::default().cycles_per_worker);

        let err = Settings::default()
            .with_fleet_size(Some(0), None)
            .unwrap_err()
            .to_string();
        assert!(err.contains("NUM_BOTS"), "{}", err);
        assert!(Settings::default().with_fleet_size(None, Some(0)).is_err());
    }
}
