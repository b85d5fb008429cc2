use crate::endpoint::dedup_candidates;
use crate::provider::Provider;
use crate::providers::new_client;
use crate::store::write_atomic;
use log::{error, info};
use moka::future::Cache;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const PROVIDER_TTL: Duration = Duration::from_secs(20 * 60);

/// Gathers raw candidates from every registered provider.
///
/// A failing provider is logged and skipped. Listings are cached per
/// registered provider (by position, not name) for twenty minutes.
pub struct EndpointSource {
    providers: Vec<Arc<dyn Provider>>,
    client: Client,
    cache: Cache<usize, Arc<Vec<String>>>,
    pause: Duration,
    last: Vec<String>,
}

impl EndpointSource {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self::with_client(new_client()?))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            providers: Vec::new(),
            client,
            cache: Cache::builder().time_to_live(PROVIDER_TTL).build(),
            pause: Duration::from_secs(2),
            last: Vec::new(),
        }
    }

    pub fn add_provider<P: Provider + 'static>(&mut self, provider: P) {
        self.providers.push(Arc::new(provider));
    }

    /// Delay between consecutive providers.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    async fn list_one(&self, slot: usize, provider: &Arc<dyn Provider>) -> Option<Arc<Vec<String>>> {
        if let Some(cached) = self.cache.get(&slot).await {
            return Some(cached);
        }
        match provider.list(&self.client).await {
            Ok(ips) => {
                info!("{} found ips {}", provider.name(), ips.len());
                let ips = Arc::new(ips);
                self.cache.insert(slot, ips.clone()).await;
                Some(ips)
            }
            Err(e) => {
                error!("cannot load list of proxy {} err:{}", provider.name(), e);
                None
            }
        }
    }

    /// Unique, trimmed candidates from all providers in first-seen order.
    pub async fn scrape_all_sources(&mut self) -> Vec<String> {
        let mut raw = Vec::new();
        for (i, provider) in self.providers.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            if let Some(ips) = self.list_one(i, provider).await {
                raw.extend(ips.iter().cloned());
            }
        }

        self.last = dedup_candidates(raw);
        info!("scraped {} unique proxies from all sources", self.last.len());
        self.last.clone()
    }

    /// Dumps the last scrape, one candidate per line.
    pub async fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        let mut body = self.last.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        write_atomic(path, body.as_bytes()).await?;
        info!("saved {} proxies to {}", self.last.len(), path.display());
        Ok(())
    }
}
