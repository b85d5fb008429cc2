use super::parse_plain_list;
use crate::provider::Provider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;

/// Candidates kept in a local newline-delimited file.
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Provider for FileProvider {
    async fn list(&self, _client: &Client) -> Result<Vec<String>> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("cannot read {}", self.path.display()))?;
        Ok(parse_plain_list(&body))
    }

    fn name(&self) -> &'static str {
        "local file"
    }
}
