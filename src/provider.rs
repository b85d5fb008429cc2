use async_trait::async_trait;
use reqwest::Client;

/// A place candidate proxies can be listed from.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Raw `host:port` strings, possibly with duplicates or blanks.
    async fn list(&self, client: &Client) -> anyhow::Result<Vec<String>>;
    fn name(&self) -> &'static str;
}
