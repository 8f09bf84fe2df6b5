//! Whole-cache flush backends: the object cache and the third-party CDN.
//!
//! Both are best effort. Failures are logged and swallowed so they never stop
//! the path-scoped purge.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub const DEFAULT_CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

const MEMCACHED_TIMEOUT: Duration = Duration::from_secs(2);

/// In-process object cache with no path granularity.
#[async_trait]
pub trait ObjectCache: Send + Sync {
    async fn flush(&self);
}

/// Third-party edge cache that can only be flushed as a whole.
#[async_trait]
pub trait CdnPurge: Send + Sync {
    async fn purge_everything(&self);
}

/// Used when no object cache is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObjectCache;

#[async_trait]
impl ObjectCache for NoopObjectCache {
    async fn flush(&self) {
        debug!("Object cache flush skipped: no backend configured");
    }
}

/// Used when the CDN integration is not configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCdn;

#[async_trait]
impl CdnPurge for NoopCdn {
    async fn purge_everything(&self) {
        debug!("CDN purge skipped: no zone configured");
    }
}

/// Flushes a memcached instance with the text-protocol `flush_all` command.
#[derive(Debug, Clone)]
pub struct MemcachedFlusher {
    addr: SocketAddr,
}

impl MemcachedFlusher {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    async fn send_flush_all(&self) -> std::io::Result<String> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(b"flush_all\r\n").await?;
        stream.flush().await?;

        let mut reply = String::new();
        BufReader::new(stream).read_line(&mut reply).await?;
        Ok(reply.trim_end().to_string())
    }
}

#[async_trait]
impl ObjectCache for MemcachedFlusher {
    async fn flush(&self) {
        match timeout(MEMCACHED_TIMEOUT, self.send_flush_all()).await {
            Ok(Ok(reply)) if reply == "OK" => {
                info!(addr = %self.addr, "Object cache flushed");
            }
            Ok(Ok(reply)) => {
                warn!(addr = %self.addr, reply = %reply, "Object cache flush rejected");
            }
            Ok(Err(err)) => {
                warn!(addr = %self.addr, error = %err, "Object cache flush failed");
            }
            Err(_) => {
                warn!(addr = %self.addr, "Object cache flush timed out");
            }
        }
    }
}

/// Purges an entire Cloudflare zone through the v4 API.
#[derive(Debug, Clone)]
pub struct CloudflareFlusher {
    client: Client,
    api_base: String,
    zone_id: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct CloudflareResponse {
    success: bool,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

impl CloudflareFlusher {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        zone_id: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            zone_id: zone_id.into(),
            api_token: api_token.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/zones/{}/purge_cache",
            self.api_base.trim_end_matches('/'),
            self.zone_id
        )
    }

    async fn send(&self) -> Result<CloudflareResponse, reqwest::Error> {
        self.client
            .post(self.endpoint())
            .bearer_auth(&self.api_token)
            .json(&json!({ "purge_everything": true }))
            .send()
            .await?
            .json::<CloudflareResponse>()
            .await
    }
}

#[async_trait]
impl CdnPurge for CloudflareFlusher {
    async fn purge_everything(&self) {
        match self.send().await {
            Ok(body) if body.success => {
                info!(zone_id = %self.zone_id, "CDN cache purged");
            }
            Ok(body) => {
                warn!(
                    zone_id = %self.zone_id,
                    errors = ?body.errors,
                    "CDN purge rejected"
                );
            }
            Err(err) => {
                warn!(zone_id = %self.zone_id, error = %err, "CDN purge failed");
            }
        }
    }
}
