//! Cache probe.
//!
//! Fetches a URL and reports whether the response was served from cache,
//! judged by the proxy or CDN cache-status header.

use std::fmt;

use globset::{Glob, GlobSet, GlobSetBuilder};
use metrics::counter;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use super::orchestrator::InvalidationRequest;

/// Cache-status header set by the reverse proxy.
pub const PROXY_CACHE_HEADER: &str = "x-proxy-cache";
/// Cache-status header set by the CDN.
pub const CDN_CACHE_HEADER: &str = "cf-cache-status";

const HIT: &str = "HIT";
const METRIC_PROBE_TOTAL: &str = "purgeline_probe_total";

/// What a single probe concluded. Only [`ProbeResult::Hit`] counts as cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Hit,
    /// Header present with a value other than `HIT`.
    Miss(String),
    HeaderAbsent,
    /// Matched the exclusion list; nothing was fetched.
    Excluded,
    EmptyUrl,
    InvalidUrl(String),
    TransportError(String),
}

impl ProbeResult {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss(_) => "miss",
            Self::HeaderAbsent => "header_absent",
            Self::Excluded => "excluded",
            Self::EmptyUrl => "empty_url",
            Self::InvalidUrl(_) => "invalid_url",
            Self::TransportError(_) => "transport_error",
        }
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Miss(value) => write!(f, "miss ({value})"),
            Self::InvalidUrl(err) => write!(f, "invalid url ({err})"),
            Self::TransportError(err) => write!(f, "transport error ({err})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Final verdict plus the number of HTTP fetches it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub result: ProbeResult,
    pub attempts: u32,
}

/// Rejected exclusion pattern.
#[derive(Debug, Error)]
pub enum ExclusionError {
    #[error("invalid exclusion pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("failed to compile exclusion patterns: {0}")]
    Compile(#[source] globset::Error),
}

/// URL exclusion list of glob patterns matched against the URL path;
/// `*` matches any run of characters, including `/`.
#[derive(Debug, Clone, Default)]
pub struct UrlExclusions {
    globs: Option<GlobSet>,
}

impl UrlExclusions {
    pub fn new<I, S>(patterns: I) -> Result<Self, ExclusionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut empty = true;
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            let glob = Glob::new(&normalize_path(pattern)).map_err(|source| {
                ExclusionError::Pattern {
                    pattern: pattern.to_string(),
                    source,
                }
            })?;
            builder.add(glob);
            empty = false;
        }

        if empty {
            return Ok(Self::default());
        }
        let globs = builder.build().map_err(ExclusionError::Compile)?;
        Ok(Self { globs: Some(globs) })
    }

    /// Whether the path of `url` matches any exclusion pattern.
    pub fn is_excluded(&self, url: &Url) -> bool {
        self.globs
            .as_ref()
            .is_some_and(|globs| globs.is_match(normalize_path(url.path())))
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') || trimmed.starts_with('*') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Verifies whether URLs are currently served from cache.
#[derive(Debug, Clone)]
pub struct CacheProbe {
    client: Client,
    exclusions: UrlExclusions,
}

impl CacheProbe {
    pub fn new(client: Client, exclusions: UrlExclusions) -> Self {
        Self { client, exclusions }
    }

    /// Boolean surface: `true` only for a confirmed hit.
    pub async fn test_cache(&self, url: &str, maybe_dynamic: bool, is_cloudflare_check: bool) -> bool {
        self.probe(url, maybe_dynamic, is_cloudflare_check)
            .await
            .result
            .is_hit()
    }

    /// Check whether a purged URL is still served from cache, reading the
    /// CDN header when the request asks for a CDN check.
    pub async fn verify(&self, request: &InvalidationRequest, maybe_dynamic: bool) -> ProbeReport {
        self.probe(
            &request.target_url,
            maybe_dynamic,
            request.is_cloudflare_check,
        )
        .await
    }

    /// Probe `url`. When the first fetch is not a hit and `maybe_dynamic` is
    /// set, the URL is fetched exactly once more as a static page.
    #[instrument(skip(self))]
    pub async fn probe(
        &self,
        url: &str,
        maybe_dynamic: bool,
        is_cloudflare_check: bool,
    ) -> ProbeReport {
        let report = self.run(url, maybe_dynamic, is_cloudflare_check).await;
        counter!(METRIC_PROBE_TOTAL, "result" => report.result.label()).increment(1);
        debug!(result = %report.result, attempts = report.attempts, "Cache probe finished");
        report
    }

    async fn run(&self, url: &str, maybe_dynamic: bool, is_cloudflare_check: bool) -> ProbeReport {
        let url = url.trim();
        if url.is_empty() {
            return ProbeReport {
                result: ProbeResult::EmptyUrl,
                attempts: 0,
            };
        }

        let target = match with_trailing_slash(url) {
            Ok(target) => target,
            Err(err) => {
                return ProbeReport {
                    result: ProbeResult::InvalidUrl(err.to_string()),
                    attempts: 0,
                };
            }
        };

        if !is_cloudflare_check && self.exclusions.is_excluded(&target) {
            return ProbeReport {
                result: ProbeResult::Excluded,
                attempts: 0,
            };
        }

        let header = if is_cloudflare_check {
            CDN_CACHE_HEADER
        } else {
            PROXY_CACHE_HEADER
        };

        let mut attempts = 0;
        let mut dynamic = maybe_dynamic;
        loop {
            attempts += 1;
            let result = self.fetch_once(&target, header).await;
            let retry = dynamic && matches!(result, ProbeResult::Miss(_) | ProbeResult::HeaderAbsent);
            if !retry {
                return ProbeReport { result, attempts };
            }
            dynamic = false;
        }
    }

    async fn fetch_once(&self, target: &Url, header: &str) -> ProbeResult {
        let response = match self.client.get(target.clone()).send().await {
            Ok(response) => response,
            Err(err) => return ProbeResult::TransportError(err.to_string()),
        };

        match response.headers().get(header) {
            None => ProbeResult::HeaderAbsent,
            Some(value) => {
                let value = String::from_utf8_lossy(value.as_bytes()).trim().to_string();
                if value.eq_ignore_ascii_case(HIT) {
                    ProbeResult::Hit
                } else {
                    ProbeResult::Miss(value)
                }
            }
        }
    }
}

fn with_trailing_slash(url: &str) -> Result<Url, url::ParseError> {
    let mut parsed = Url::parse(url)?;
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    Ok(parsed)
}
