use crate::provider::Provider;
use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const GEONODE_URL: &str = "https://proxylist.geonode.com/api/proxy-list?limit=100&page=1&sort_by=lastChecked&sort_type=desc";

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    data: Vec<Entry>,
}

#[derive(Deserialize)]
struct Entry {
    ip: Option<String>,
    port: Option<serde_json::Value>,
}

pub struct Geonode;

impl Geonode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Geonode {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_listing(listing: Listing) -> Vec<String> {
    listing
        .data
        .into_iter()
        .filter_map(|e| {
            let ip = e.ip.filter(|ip| !ip.is_empty())?;
            // the API has served the port both as a string and as a number
            let port = match e.port? {
                serde_json::Value::String(s) if !s.is_empty() => s,
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some(format!("{}:{}", ip, port))
        })
        .collect()
}

#[async_trait]
impl Provider for Geonode {
    async fn list(&self, client: &Client) -> Result<Vec<String>> {
        let resp = client.get(GEONODE_URL).send().await?;
        if !resp.status().is_success() {
            bail!("status code {}", resp.status());
        }
        Ok(parse_listing(resp.json().await?))
    }

    fn name(&self) -> &'static str {
        "proxylist.geonode.com"
    }
}
