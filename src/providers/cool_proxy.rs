use crate::provider::Provider;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};

const COOL_PROXY_URL: &str = "https://www.cool-proxy.net/proxies/http_proxy_list/sort:score/direction:desc";

/// cool-proxy.net hides each IP as a rot13'd base64 string inside a script tag.
pub struct CoolProxy;

impl CoolProxy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CoolProxy {
    fn default() -> Self {
        Self::new()
    }
}

fn rot13(c: char) -> char {
    match c {
        'A'..='Z' => ((c as u8 - b'A' + 13) % 26 + b'A') as char,
        'a'..='z' => ((c as u8 - b'a' + 13) % 26 + b'a') as char,
        _ => c,
    }
}

fn decode_ip(encoded: &str) -> Option<String> {
    let rotated: String = encoded.chars().map(rot13).collect();
    let bytes = general_purpose::STANDARD.decode(rotated).ok()?;
    String::from_utf8(bytes).ok()
}

fn parse_page(body: &str) -> Result<Vec<String>> {
    let doc = Html::parse_document(body);
    let ip_selector = Selector::parse("#main table tr td:nth-child(1):not([colspan]) script")
        .map_err(|e| anyhow!("bad ip selector: {}", e))?;
    let port_selector = Selector::parse("#main table tr td:nth-child(2)")
        .map_err(|e| anyhow!("bad port selector: {}", e))?;

    let scripts: Vec<String> = doc.select(&ip_selector).map(|e| e.inner_html()).collect();
    let ports: Vec<String> = doc
        .select(&port_selector)
        .map(|e| e.text().collect::<String>().trim().to_string())
        .collect();

    if scripts.is_empty() {
        bail!("ip not found");
    }
    if scripts.len() != ports.len() {
        bail!("found {} ips but {} ports", scripts.len(), ports.len());
    }

    let quoted = Regex::new(r#""(.*?[^\\])""#)?;
    Ok(scripts
        .iter()
        .zip(ports)
        .filter_map(|(script, port)| {
            let encoded = quoted.captures(script)?.get(1)?;
            decode_ip(encoded.as_str()).map(|ip| format!("{}:{}", ip, port))
        })
        .collect())
}

#[async_trait]
impl Provider for CoolProxy {
    async fn list(&self, client: &Client) -> Result<Vec<String>> {
        let resp = client.get(COOL_PROXY_URL).send().await?;
        if !resp.status().is_success() {
            bail!("status code {}", resp.status());
        }
        parse_page(&resp.text().await?)
    }

    fn name(&self) -> &'static str {
        "www.cool-proxy.net"
    }
}
