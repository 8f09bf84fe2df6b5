//! Invalidation orchestrator.
//!
//! Routes purge requests through scope resolution to the three independent
//! backends: the path purge command, the object cache, and the CDN.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::backends::{CdnPurge, NoopCdn, NoopObjectCache, ObjectCache};
use super::config::PurgeConfig;
use super::events::NotificationLog;
use super::purge::{PurgeCommand, PurgeError};
use super::scope::{self, Scope, ScopeError, SuppressReason};

/// Identifier of a piece of content known to the event source.
pub type ContentId = u64;

/// A single purge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRequest {
    pub target_url: String,
    /// Purge the path and everything below it.
    pub recursive: bool,
    /// Verification of this request targets the CDN rather than the proxy.
    pub is_cloudflare_check: bool,
}

impl InvalidationRequest {
    pub fn new(target_url: impl Into<String>, recursive: bool) -> Self {
        Self {
            target_url: target_url.into(),
            recursive,
            is_cloudflare_check: false,
        }
    }
}

/// Resolves canonical URLs for content identifiers.
pub trait Permalinks: Send + Sync {
    fn permalink(&self, id: ContentId) -> Option<String>;
}

/// Builds permalinks from a template with `{home}` and `{id}` placeholders.
#[derive(Debug, Clone)]
pub struct TemplatePermalinks {
    template: String,
    home: String,
}

pub const DEFAULT_PERMALINK_TEMPLATE: &str = "{home}posts/{id}";

impl TemplatePermalinks {
    pub fn new(template: impl Into<String>, home: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            home: home.into(),
        }
    }
}

impl Permalinks for TemplatePermalinks {
    fn permalink(&self, id: ContentId) -> Option<String> {
        let home = self.home.trim_end_matches('/');
        let rendered = self
            .template
            .replace("{home}", &format!("{home}/"))
            .replace("{id}", &id.to_string());
        // `{home}/path` would otherwise render a double slash.
        Some(rendered.replacen(&format!("{home}//"), &format!("{home}/"), 1))
    }
}

#[derive(Debug, Error)]
pub enum PurgeFailure {
    #[error(transparent)]
    InvalidUrl(#[from] ScopeError),
    #[error(transparent)]
    Launch(#[from] PurgeError),
    #[error("purge command exited with status {exit_status:?}")]
    NonZeroExit { exit_status: Option<i32> },
}

/// Result of a purge operation.
///
/// `Suppressed` and `Failed` both mean the cache state is unchanged and the
/// purge may be retried; [`PurgeStatus::succeeded`] collapses them to `false`.
#[derive(Debug)]
pub enum PurgeStatus {
    Succeeded,
    Suppressed(SuppressReason),
    Failed(PurgeFailure),
}

impl PurgeStatus {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed(_))
    }
}

impl From<PurgeStatus> for bool {
    fn from(status: PurgeStatus) -> Self {
        status.succeeded()
    }
}

impl fmt::Display for PurgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Suppressed(reason) => write!(f, "suppressed: {reason}"),
            Self::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Process-wide invalidation façade, shared as `Arc<Invalidator>`.
pub struct Invalidator {
    config: PurgeConfig,
    command: Arc<dyn PurgeCommand>,
    object_cache: Arc<dyn ObjectCache>,
    cdn: Arc<dyn CdnPurge>,
    permalinks: Arc<dyn Permalinks>,
    notifications: Arc<NotificationLog>,
}

impl Invalidator {
    /// Create an orchestrator with no object cache and no CDN backend.
    pub fn new(config: PurgeConfig, command: Arc<dyn PurgeCommand>) -> Self {
        let permalinks = Arc::new(TemplatePermalinks::new(
            DEFAULT_PERMALINK_TEMPLATE,
            config.site.home_url(),
        ));
        Self {
            config,
            command,
            object_cache: Arc::new(NoopObjectCache),
            cdn: Arc::new(NoopCdn),
            permalinks,
            notifications: Arc::new(NotificationLog::new()),
        }
    }

    pub fn with_object_cache(mut self, object_cache: Arc<dyn ObjectCache>) -> Self {
        self.object_cache = object_cache;
        self
    }

    pub fn with_cdn(mut self, cdn: Arc<dyn CdnPurge>) -> Self {
        self.cdn = cdn;
        self
    }

    pub fn with_permalinks(mut self, permalinks: Arc<dyn Permalinks>) -> Self {
        self.permalinks = permalinks;
        self
    }

    pub fn with_notifications(mut self, notifications: Arc<NotificationLog>) -> Self {
        self.notifications = notifications;
        self
    }

    /// Purge the site root and everything below it.
    pub async fn purge_everything(&self) -> PurgeStatus {
        self.purge_url(&self.config.site.home_url(), true).await
    }

    /// Purge only the site root page.
    pub async fn purge_index(&self) -> PurgeStatus {
        self.purge_url(&self.config.site.home_url(), false).await
    }

    /// Purge the REST API root and everything below it.
    pub async fn purge_rest_representation(&self) -> PurgeStatus {
        self.purge_url(&self.config.rest_url, true).await
    }

    /// Purge the REST representation, then the content's own URL tree.
    ///
    /// Returns the status of the content purge; the REST purge is logged only.
    pub async fn purge_content_and_dependents(&self, id: ContentId) -> PurgeStatus {
        let rest = self.purge_rest_representation().await;
        debug!(content_id = id, status = %rest, "REST representation purge finished");

        let permalink = self.permalinks.permalink(id).unwrap_or_default();
        self.purge_url(&permalink, true).await
    }

    /// Flush the object cache. Best effort.
    pub async fn flush_object_cache(&self) {
        self.object_cache.flush().await;
    }

    /// Purge `url`, optionally with its descendants.
    pub async fn purge_url(&self, url: &str, recursive: bool) -> PurgeStatus {
        self.purge(&InvalidationRequest::new(url, recursive)).await
    }

    /// Execute one invalidation request.
    ///
    /// The CDN is flushed first when enabled, regardless of what happens to
    /// the path purge. At most one purge command is issued.
    #[instrument(skip(self), fields(url = %request.target_url, recursive = request.recursive))]
    pub async fn purge(&self, request: &InvalidationRequest) -> PurgeStatus {
        if self.config.cdn_enabled {
            self.cdn.purge_everything().await;
        }

        let target = match scope::resolve(&self.config.site, &request.target_url, request.recursive)
        {
            Ok(Scope::Purge(target)) => target,
            Ok(Scope::Suppressed(reason)) => {
                debug!(%reason, "Purge suppressed");
                return PurgeStatus::Suppressed(reason);
            }
            Err(err) => {
                warn!(error = %err, "Purge target could not be resolved");
                return PurgeStatus::Failed(err.into());
            }
        };

        match self.command.purge(&target).await {
            Ok(outcome) if outcome.succeeded => {
                info!(
                    hostname = %target.hostname,
                    pattern = %target.pattern,
                    "Purge succeeded"
                );
                self.notifications.publish(&request.target_url);
                PurgeStatus::Succeeded
            }
            Ok(outcome) => PurgeStatus::Failed(PurgeFailure::NonZeroExit {
                exit_status: outcome.exit_status,
            }),
            Err(err) => {
                warn!(error = %err, "Purge command could not be launched");
                PurgeStatus::Failed(err.into())
            }
        }
    }

    pub fn config(&self) -> &PurgeConfig {
        &self.config
    }

    pub fn notifications(&self) -> &Arc<NotificationLog> {
        &self.notifications
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::purge::PurgeOutcome;
    use crate::cache::scope::PurgeTarget;

    /// Records issued purges and answers with a fixed exit code.
    pub(crate) struct RecordingCommand {
        pub(crate) calls: Mutex<Vec<PurgeTarget>>,
        exit_code: i32,
    }

    impl RecordingCommand {
        pub(crate) fn exiting(exit_code: i32) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                exit_code,
            })
        }

        pub(crate) fn patterns(&self) -> Vec<String> {
            self.calls
                .lock()
                .expect("calls lock")
                .iter()
                .map(|target| target.pattern.to_string())
                .collect()
        }
    }

    #[async_trait]
    impl PurgeCommand for RecordingCommand {
        async fn purge(&self, target: &PurgeTarget) -> Result<PurgeOutcome, PurgeError> {
            self.calls.lock().expect("calls lock").push(target.clone());
            Ok(PurgeOutcome::from_exit_code(Some(self.exit_code)))
        }
    }

    #[derive(Default)]
    pub(crate) struct CountingBackend {
        pub(crate) calls: AtomicUsize,
    }

    impl CountingBackend {
        pub(crate) fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CdnPurge for CountingBackend {
        async fn purge_everything(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ObjectCache for CountingBackend {
        async fn flush(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn invalidator(command: Arc<RecordingCommand>) -> Invalidator {
        let config = PurgeConfig::new("https://example.com").expect("valid home url");
        Invalidator::new(config, command).with_permalinks(Arc::new(TemplatePermalinks::new(
            "{home}posts/{id}",
            "https://example.com/",
        )))
    }
}
