use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Trims a raw candidate, returning `None` when nothing is left.
pub fn normalize(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Normalizes and deduplicates candidates by exact string equality,
/// keeping first-seen order.
pub fn dedup_candidates<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in raw {
        if let Some(candidate) = normalize(item.as_ref()) {
            if seen.insert(candidate.to_string()) {
                out.push(candidate.to_string());
            }
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedEndpoint {
    pub addr: String,
    /// Round-trip time of the successful probe. `None` when the endpoint was
    /// carried over from a persisted store, which does not keep latencies.
    pub latency: Option<Duration>,
}

impl VerifiedEndpoint {
    pub fn probed(addr: impl Into<String>, latency: Duration) -> Self {
        Self {
            addr: addr.into(),
            latency: Some(latency),
        }
    }

    pub fn carried_over(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            latency: None,
        }
    }
}

impl fmt::Display for VerifiedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.latency {
            Some(latency) => write!(f, "{} - {:.2}s", self.addr, latency.as_secs_f64()),
            None => write!(f, "{} - stored", self.addr),
        }
    }
}

/// Verified endpoints ordered by ascending latency, unique by address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedSet {
    endpoints: Vec<VerifiedEndpoint>,
}

impl VerifiedSet {
    /// Builds a set from probe results in any order. Duplicate addresses keep
    /// their lowest latency; ties keep the earlier entry.
    pub fn from_probes(mut probes: Vec<VerifiedEndpoint>) -> Self {
        probes.sort_by_key(|e| e.latency);
        let mut seen = HashSet::new();
        probes.retain(|e| seen.insert(e.addr.clone()));
        Self { endpoints: probes }
    }

    /// Wraps endpoints read back from a store, keeping their stored order.
    pub fn from_stored<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = dedup_candidates(addrs)
            .into_iter()
            .map(VerifiedEndpoint::carried_over)
            .collect();
        Self { endpoints }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VerifiedEndpoint> {
        self.endpoints.iter()
    }

    pub fn addrs(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|e| e.addr.as_str())
    }

    /// The `k` fastest endpoints.
    pub fn top(&self, k: usize) -> &[VerifiedEndpoint] {
        &self.endpoints[..k.min(self.endpoints.len())]
    }

    pub fn into_vec(self) -> Vec<VerifiedEndpoint> {
        self.endpoints
    }
}

impl<'a> IntoIterator for &'a VerifiedSet {
    type Item = &'a VerifiedEndpoint;
    type IntoIter = std::slice::Iter<'a, VerifiedEndpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.endpoints.iter()
    }
}
