use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client, StatusCode};
use std::net::IpAddr;
use std::time::{Duration, Instant};

pub const DEFAULT_PROBE_URL: &str = "http://httpbin.org/ip";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// One reachability check of a candidate.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Returns the round-trip latency when the candidate works, `None` otherwise.
    async fn probe(&self, candidate: &str) -> Option<Duration>;
}

fn is_public_ip(ip: IpAddr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() {
        return false;
    }

    match ip {
        IpAddr::V4(ipv4) => {
            !(ipv4.is_private() || ipv4.is_link_local() || ipv4.is_broadcast())
        }
        IpAddr::V6(ipv6) => {
            let head = ipv6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link-local
            (head & 0xfe00) != 0xfc00 && (head & 0xffc0) != 0xfe80
        }
    }
}

/// Probes a candidate by sending a plain HTTP GET through it as a forward
/// proxy and waiting for a `200 OK`.
#[derive(Debug, Clone)]
pub struct HttpProber {
    url: String,
    timeout: Duration,
    allow_private: bool,
}

impl HttpProber {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            allow_private: false,
        }
    }

    /// Accept candidates resolving to loopback or private ranges.
    pub fn allow_private(mut self, allow: bool) -> Self {
        self.allow_private = allow;
        self
    }

    async fn resolve_allowed(&self, candidate: &str) -> bool {
        let addr = match tokio::net::lookup_host(candidate).await {
            Ok(mut addrs) => match addrs.next() {
                Some(a) => a,
                None => {
                    debug!("cannot resolve proxy address {}", candidate);
                    return false;
                }
            },
            Err(e) => {
                debug!("cannot parse proxy address {}: {}", candidate, e);
                return false;
            }
        };

        if !self.allow_private && !is_public_ip(addr.ip()) {
            debug!("non-public proxy ip refused: {}", addr.ip());
            return false;
        }
        true
    }

    fn client_for(&self, candidate: &str) -> Option<Client> {
        let proxy = match reqwest::Proxy::all(format!("http://{}", candidate)) {
            Ok(p) => p,
            Err(e) => {
                debug!("cannot parse proxy {}: {}", candidate, e);
                return None;
            }
        };

        match Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .pool_max_idle_per_host(0)
            .build()
        {
            Ok(client) => Some(client),
            Err(e) => {
                error!("cannot build client for probe {}: {}", candidate, e);
                None
            }
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, candidate: &str) -> Option<Duration> {
        if !self.resolve_allowed(candidate).await {
            return None;
        }
        let client = self.client_for(candidate)?;

        let start = Instant::now();
        let resp = match client
            .get(&self.url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                debug!("proxy {} failed: {}", candidate, e);
                return None;
            }
        };
        let latency = start.elapsed();

        if resp.status() != StatusCode::OK {
            debug!("proxy {} returned status {}", candidate, resp.status());
            return None;
        }
        debug!("proxy {} working, response time {:.2}s", candidate, latency.as_secs_f64());
        Some(latency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal forward proxy answering every request with `status_line`.
    async fn fake_proxy(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let resp = format!("{}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok", status_line);
                    let _ = socket.write_all(resp.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr.to_string()
    }

    #[test]
    fn public_ip_classification() {
        assert!(!is_public_ip("127.0.0.1".parse().unwrap()));
        assert!(!is_public_ip("10.1.2.3".parse().unwrap()));
        assert!(!is_public_ip("172.20.0.1".parse().unwrap()));
        assert!(!is_public_ip("192.168.1.1".parse().unwrap()));
        assert!(!is_public_ip("169.254.0.5".parse().unwrap()));
        assert!(!is_public_ip("fe80::1".parse().unwrap()));
        assert!(!is_public_ip("fd00::1".parse().unwrap()));
        assert!(is_public_ip("8.8.8.8".parse().unwrap()));
        assert!(is_public_ip("2001:4860:4860::8888".parse().unwrap()));
    }

    #[tokio::test]
    async fn probe_succeeds_on_200() {
        let proxy = fake_proxy("HTTP/1.1 200 OK").await;
        let prober = HttpProber::new("http://probe.invalid/ip", Duration::from_secs(5)).allow_private(true);
        assert!(prober.probe(&proxy).await.is_some());
    }

    #[tokio::test]
    async fn probe_fails_on_non_200() {
        let proxy = fake_proxy("HTTP/1.1 403 Forbidden").await;
        let prober = HttpProber::new("http://probe.invalid/ip", Duration::from_secs(5)).allow_private(true);
        assert!(prober.probe(&proxy).await.is_none());
    }

    #[tokio::test]
    async fn loopback_refused_by_default() {
        let proxy = fake_proxy("HTTP/1.1 200 OK").await;
        let prober = HttpProber::new("http://probe.invalid/ip", Duration::from_secs(5));
        assert!(prober.probe(&proxy).await.is_none());
    }

    #[tokio::test]
    async fn garbage_candidate_fails() {
        let prober = HttpProber::new(DEFAULT_PROBE_URL, Duration::from_secs(1));
        assert!(prober.probe("not a proxy").await.is_none());
    }
}
