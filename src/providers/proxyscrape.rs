use super::parse_plain_list;
use crate::provider::Provider;
use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;

const PROXYSCRAPE_URL: &str = "https://api.proxyscrape.com/v2/?request=getproxies&protocol=http&timeout=10000&country=all&ssl=all&anonymity=all";

/// Plain-text HTTP proxy list from the ProxyScrape API.
#[derive(Debug, Default)]
pub struct ProxyScrape;

impl ProxyScrape {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for ProxyScrape {
    async fn list(&self, client: &Client) -> Result<Vec<String>> {
        let resp = client.get(PROXYSCRAPE_URL).send().await?;
        if !resp.status().is_success() {
            bail!("status code {}", resp.status());
        }
        Ok(parse_plain_list(&resp.text().await?))
    }

    fn name(&self) -> &'static str {
        "api.proxyscrape.com"
    }
}
