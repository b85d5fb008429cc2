use crate::provider::Provider;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};

const FREE_PROXY_LIST_URL: &str = "https://free-proxy-list.net/";

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("bad selector {}: {}", css, e))
}

/// Reads `ip:port` pairs out of the first two columns of the listing table.
fn parse_table(body: &str) -> Result<Vec<String>> {
    let doc = Html::parse_document(body);
    let td = selector("td")?;

    let mut rows: Vec<_> = doc.select(&selector("#list table tbody tr")?).collect();
    if rows.is_empty() {
        rows = doc.select(&selector("table tbody tr")?).collect();
    }

    let mut result = Vec::new();
    for row in rows {
        let cols: Vec<String> = row
            .select(&td)
            .take(2)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .collect();
        if let [ip, port] = cols.as_slice() {
            if !ip.is_empty() && !port.is_empty() {
                result.push(format!("{}:{}", ip, port));
            }
        }
    }

    if result.is_empty() {
        bail!("proxies not found");
    }
    Ok(result)
}

pub struct FreeProxyList;

impl FreeProxyList {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FreeProxyList {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for FreeProxyList {
    async fn list(&self, client: &Client) -> Result<Vec<String>> {
        let resp = client
            .get(FREE_PROXY_LIST_URL)
            .header("Accept-Language", "en-US,en;q=0.8")
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("status code {}", resp.status());
        }
        parse_table(&resp.text().await?)
    }

    fn name(&self) -> &'static str {
        "free-proxy-list.net"
    }
}
