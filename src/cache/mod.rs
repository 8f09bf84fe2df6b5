//! Purgeline cache invalidation.
//!
//! Turns content-lifecycle events into purges of three independent caches:
//!
//! - **Proxy cache**: purged by path through an external command
//! - **Object cache**: flushed as a whole
//! - **CDN**: flushed as a whole, when enabled
//!
//! ## Configuration
//!
//! Invalidation is controlled via `purgeline.toml`:
//!
//! ```toml
//! [site]
//! home_url = "https://example.com/"
//!
//! [cache]
//! autoflush = true
//! purge_tool = "site-tools-client"
//! content_saved_scope = "content"
//!
//! [cdn]
//! enabled = false
//! ```

mod backends;
mod config;
mod entities;
mod events;
pub mod guards;
mod lock;
mod orchestrator;
mod probe;
mod purge;
mod schedule;
mod scope;
mod sweeper;
mod triggers;

pub use backends::{
    CdnPurge, CloudflareFlusher, DEFAULT_CLOUDFLARE_API_BASE, MemcachedFlusher, NoopCdn,
    NoopObjectCache, ObjectCache,
};
pub use config::{ContentSavedScope, PurgeConfig};
pub use entities::EntityChange;
pub use events::{FlushNotification, NotificationLog, Sequence};
pub use guards::{RequestGuard, RequestSignals};
pub use orchestrator::{
    ContentId, DEFAULT_PERMALINK_TEMPLATE, InvalidationRequest, Invalidator, Permalinks,
    PurgeFailure, PurgeStatus, TemplatePermalinks,
};
pub use probe::{
    CDN_CACHE_HEADER, CacheProbe, ExclusionError, PROXY_CACHE_HEADER, ProbeReport, ProbeResult,
    UrlExclusions,
};
pub use purge::{DEFAULT_PURGE_TOOL, ProcessPurgeCommand, PurgeCommand, PurgeError, PurgeOutcome};
pub use schedule::{
    DEFAULT_SWEEP_INTERVAL, EVERY_TWO_DAYS, MAINTENANCE_JOB, MaintenanceReport, ScheduleEntry,
    Scheduler, run_maintenance, spawn_maintenance,
};
pub use scope::{
    PathPattern, PurgeTarget, RECURSIVE_SUFFIX, Scope, ScopeError, SiteRoot, SuppressReason,
    resolve,
};
pub use sweeper::{AssetSweeper, SweepError, SweepReport, sweep_dir};
pub use triggers::{HOOKS, HookRegistry, Trigger, TriggerOutcome, TriggerParseError};
