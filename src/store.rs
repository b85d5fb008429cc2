use crate::endpoint::VerifiedSet;
use crate::error::Result;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Newline-delimited file holding the addresses of the last successful
/// vetting run, fastest first.
#[derive(Debug, Clone)]
pub struct EndpointStore {
    path: PathBuf,
}

impl EndpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the store with `set`. An empty set leaves the file untouched
    /// and returns `false`.
    pub async fn save(&self, set: &VerifiedSet) -> Result<bool> {
        if set.is_empty() {
            return Ok(false);
        }

        let mut body = String::new();
        for addr in set.addrs() {
            body.push_str(addr);
            body.push('\n');
        }
        write_atomic(&self.path, body.as_bytes()).await?;
        info!("saved {} working proxies to {}", set.len(), self.path.display());
        Ok(true)
    }

    /// Reads the store back. A missing or unreadable file yields an empty set.
    pub async fn load(&self) -> VerifiedSet {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(body) => {
                let set = VerifiedSet::from_stored(body.lines());
                info!("loaded {} proxies from {}", set.len(), self.path.display());
                set
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VerifiedSet::default(),
            Err(e) => {
                warn!("cannot read proxy store {}: {}", self.path.display(), e);
                VerifiedSet::default()
            }
        }
    }
}

/// Writes next to the target and renames over it.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
