pub mod cool_proxy;
pub mod file;
pub mod free_proxy_list;
pub mod geonode;
pub mod proxyscrape;

use reqwest::Client;
use std::time::Duration;

pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36";

/// Client used to fetch provider listings.
pub fn new_client() -> anyhow::Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent(BROWSER_USER_AGENT)
        .build()?)
}

/// Keeps lines that look like `host:port`.
pub(crate) fn parse_plain_list(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.contains(':'))
        .map(str::to_string)
        .collect()
}
