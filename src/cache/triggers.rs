//! Trigger subscriptions.
//!
//! The event source hands [`Trigger`] values to [`HookRegistry::dispatch`].
//! Each trigger is routed to an invalidation action, but only after the
//! registry has subscribed to it.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info};

use super::config::ContentSavedScope;
use super::lock::mutex_lock;
use super::orchestrator::{ContentId, Invalidator, PurgeStatus};
use super::sweeper::{AssetSweeper, SweepReport};

const SOURCE: &str = "cache::triggers";

/// Lifecycle events that invalidate cached pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    ContentSaved { id: ContentId },
    /// A translated copy of a piece of content was saved.
    TranslationSaved { id: ContentId },
    ContentTrashed { id: ContentId },
    CoreUpdated,
    AutomaticUpdatesComplete,
    PermalinkStructureChanged,
    TagBaseChanged,
    CategoryBaseChanged,
    NavigationUpdated,
    /// One of the cache's own options changed.
    CacheOptionChanged,
    LoginFormLoggedIn,
    WidgetsReordered,
    WidgetSaved,
    RefundCreated,
    BulkDeleted,
    ThemePluginFileEdited,
    /// The asset-combination option changed; generated assets are stale.
    AssetOptionChanged,
}

impl Trigger {
    /// Stable subscription name.
    pub fn hook(&self) -> &'static str {
        match self {
            Self::ContentSaved { .. } => "content_saved",
            Self::TranslationSaved { .. } => "translation_saved",
            Self::ContentTrashed { .. } => "content_trashed",
            Self::CoreUpdated => "core_updated",
            Self::AutomaticUpdatesComplete => "automatic_updates_complete",
            Self::PermalinkStructureChanged => "permalink_structure_changed",
            Self::TagBaseChanged => "tag_base_changed",
            Self::CategoryBaseChanged => "category_base_changed",
            Self::NavigationUpdated => "navigation_updated",
            Self::CacheOptionChanged => "cache_option_changed",
            Self::LoginFormLoggedIn => "login_form_logged_in",
            Self::WidgetsReordered => "widgets_reordered",
            Self::WidgetSaved => "widget_saved",
            Self::RefundCreated => "refund_created",
            Self::BulkDeleted => "bulk_deleted",
            Self::ThemePluginFileEdited => "theme_plugin_file_edited",
            Self::AssetOptionChanged => "asset_option_changed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerParseError {
    #[error("unknown trigger `{0}`")]
    Unknown(String),
    #[error("trigger `{0}` requires a content id")]
    MissingId(&'static str),
    #[error("trigger `{hook}` takes no content id")]
    UnexpectedId { hook: &'static str },
    #[error("invalid content id `{0}`")]
    InvalidId(String),
}

/// Parses `hook` or `hook:id`, e.g. `core_updated` or `content_saved:5`.
impl FromStr for Trigger {
    type Err = TriggerParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (hook, id) = match raw.trim().split_once(':') {
            Some((hook, id)) => (hook.trim(), Some(id.trim())),
            None => (raw.trim(), None),
        };
        let id = id
            .map(|id| {
                id.parse::<ContentId>()
                    .map_err(|_| TriggerParseError::InvalidId(id.to_string()))
            })
            .transpose()?;

        let with_id = |hook: &'static str, build: fn(ContentId) -> Trigger| {
            id.map(build).ok_or(TriggerParseError::MissingId(hook))
        };

        let trigger = match hook {
            "content_saved" => return with_id("content_saved", |id| Self::ContentSaved { id }),
            "translation_saved" => {
                return with_id("translation_saved", |id| Self::TranslationSaved { id });
            }
            "content_trashed" => {
                return with_id("content_trashed", |id| Self::ContentTrashed { id });
            }
            "core_updated" => Self::CoreUpdated,
            "automatic_updates_complete" => Self::AutomaticUpdatesComplete,
            "permalink_structure_changed" => Self::PermalinkStructureChanged,
            "tag_base_changed" => Self::TagBaseChanged,
            "category_base_changed" => Self::CategoryBaseChanged,
            "navigation_updated" => Self::NavigationUpdated,
            "cache_option_changed" => Self::CacheOptionChanged,
            "login_form_logged_in" => Self::LoginFormLoggedIn,
            "widgets_reordered" => Self::WidgetsReordered,
            "widget_saved" => Self::WidgetSaved,
            "refund_created" => Self::RefundCreated,
            "bulk_deleted" => Self::BulkDeleted,
            "theme_plugin_file_edited" => Self::ThemePluginFileEdited,
            "asset_option_changed" => Self::AssetOptionChanged,
            other => return Err(TriggerParseError::Unknown(other.to_string())),
        };

        match id {
            Some(_) => Err(TriggerParseError::UnexpectedId {
                hook: trigger.hook(),
            }),
            None => Ok(trigger),
        }
    }
}

/// Every subscription made by [`HookRegistry::register`].
pub const HOOKS: &[&str] = &[
    "content_saved",
    "translation_saved",
    "content_trashed",
    "core_updated",
    "automatic_updates_complete",
    "permalink_structure_changed",
    "tag_base_changed",
    "category_base_changed",
    "navigation_updated",
    "cache_option_changed",
    "login_form_logged_in",
    "widgets_reordered",
    "widget_saved",
    "refund_created",
    "bulk_deleted",
    "theme_plugin_file_edited",
    "asset_option_changed",
];

/// What a dispatched trigger did.
#[derive(Debug)]
pub enum TriggerOutcome {
    Purged(PurgeStatus),
    /// Whole-site purge plus an object-cache flush.
    PurgedAndFlushed(PurgeStatus),
    Swept(SweepReport),
}

pub struct HookRegistry {
    invalidator: Arc<Invalidator>,
    sweeper: AssetSweeper,
    hooks: Mutex<HashSet<&'static str>>,
}

impl HookRegistry {
    pub fn new(invalidator: Arc<Invalidator>, sweeper: AssetSweeper) -> Self {
        Self {
            invalidator,
            sweeper,
            hooks: Mutex::new(HashSet::new()),
        }
    }

    /// Subscribe to every trigger. Does nothing when autoflush is disabled.
    ///
    /// Returns the number of new subscriptions; a second call returns zero.
    pub fn register(&self) -> usize {
        if !self.invalidator.config().autoflush {
            debug!("Trigger registration skipped: autoflush disabled");
            return 0;
        }

        let mut hooks = mutex_lock(&self.hooks, SOURCE, "register");
        let added = HOOKS.iter().copied().filter(|hook| hooks.insert(*hook)).count();
        if added > 0 {
            info!(hooks = added, "Purge triggers registered");
        }
        added
    }

    pub fn is_registered(&self, hook: &str) -> bool {
        mutex_lock(&self.hooks, SOURCE, "is_registered").contains(hook)
    }

    /// Route `trigger` to its action. Returns `None` for unsubscribed triggers.
    pub async fn dispatch(&self, trigger: Trigger) -> Option<TriggerOutcome> {
        if !self.is_registered(trigger.hook()) {
            debug!(hook = trigger.hook(), "Trigger ignored: not registered");
            return None;
        }

        let invalidator = &self.invalidator;
        let outcome = match trigger {
            Trigger::ContentSaved { id } => match invalidator.config().content_saved_scope {
                ContentSavedScope::Content => {
                    TriggerOutcome::Purged(invalidator.purge_content_and_dependents(id).await)
                }
                ContentSavedScope::Everything => {
                    TriggerOutcome::Purged(invalidator.purge_everything().await)
                }
            },
            Trigger::TranslationSaved { .. } => {
                let status = invalidator.purge_everything().await;
                invalidator.flush_object_cache().await;
                TriggerOutcome::PurgedAndFlushed(status)
            }
            Trigger::AssetOptionChanged => TriggerOutcome::Swept(self.sweeper.sweep().await),
            _ => TriggerOutcome::Purged(invalidator.purge_everything().await),
        };

        debug!(hook = trigger.hook(), outcome = ?outcome, "Trigger dispatched");
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::orchestrator::testing::{CountingBackend, RecordingCommand, invalidator};

    fn registry(invalidator: Invalidator) -> HookRegistry {
        HookRegistry::new(Arc::new(invalidator), AssetSweeper::new("does-not-exist"))
    }

    #[test]
    fn hook_list_covers_every_trigger() {
        let triggers = [
            Trigger::ContentSaved { id: 1 },
            Trigger::TranslationSaved { id: 1 },
            Trigger::ContentTrashed { id: 1 },
            Trigger::CoreUpdated,
            Trigger::AutomaticUpdatesComplete,
            Trigger::PermalinkStructureChanged,
            Trigger::TagBaseChanged,
            Trigger::CategoryBaseChanged,
            Trigger::NavigationUpdated,
            Trigger::CacheOptionChanged,
            Trigger::LoginFormLoggedIn,
            Trigger::WidgetsReordered,
            Trigger::WidgetSaved,
            Trigger::RefundCreated,
            Trigger::BulkDeleted,
            Trigger::ThemePluginFileEdited,
            Trigger::AssetOptionChanged,
        ];
        assert_eq!(triggers.len(), HOOKS.len());
        for trigger in triggers {
            assert!(HOOKS.contains(&trigger.hook()), "{trigger:?}");
        }
    }

    #[test]
    fn parse_trigger_lines() {
        assert_eq!(
            "content_saved:5".parse::<Trigger>(),
            Ok(Trigger::ContentSaved { id: 5 })
        );
        assert_eq!(" core_updated ".parse::<Trigger>(), Ok(Trigger::CoreUpdated));
        assert_eq!(
            "content_saved".parse::<Trigger>(),
            Err(TriggerParseError::MissingId("content_saved"))
        );
        assert_eq!(
            "widget_saved:3".parse::<Trigger>(),
            Err(TriggerParseError::UnexpectedId {
                hook: "widget_saved"
            })
        );
        assert_eq!(
            "content_saved:x".parse::<Trigger>(),
            Err(TriggerParseError::InvalidId("x".to_string()))
        );
        assert!(matches!(
            "reboot".parse::<Trigger>(),
            Err(TriggerParseError::Unknown(_))
        ));
    }

    #[test]
    fn every_hook_name_parses() {
        for hook in HOOKS {
            let line = match *hook {
                "content_saved" | "translation_saved" | "content_trashed" => format!("{hook}:1"),
                other => other.to_string(),
            };
            let trigger: Trigger = line.parse().expect("known hook");
            assert_eq!(trigger.hook(), *hook);
        }
    }

    #[test]
    fn register_is_idempotent() {
        let registry = registry(invalidator(RecordingCommand::exiting(0)));

        assert_eq!(registry.register(), HOOKS.len());
        assert_eq!(registry.register(), 0);
        assert!(registry.is_registered("content_saved"));
    }

    #[tokio::test]
    async fn autoflush_disabled_registers_nothing() {
        let command = RecordingCommand::exiting(0);
        let mut config = invalidator(command.clone()).config().clone();
        config.autoflush = false;
        let registry = registry(Invalidator::new(config, command.clone()));

        assert_eq!(registry.register(), 0);
        assert!(registry.dispatch(Trigger::CoreUpdated).await.is_none());
        assert!(command.patterns().is_empty());
    }

    #[tokio::test]
    async fn content_saved_purges_rest_and_content() {
        let command = RecordingCommand::exiting(0);
        let registry = registry(invalidator(command.clone()));
        registry.register();

        let outcome = registry.dispatch(Trigger::ContentSaved { id: 5 }).await;

        assert!(matches!(outcome, Some(TriggerOutcome::Purged(status)) if status.succeeded()));
        assert_eq!(command.patterns(), vec!["/wp-json/(.*)", "/posts/5(.*)"]);
    }

    #[tokio::test]
    async fn content_saved_can_purge_everything() {
        let command = RecordingCommand::exiting(0);
        let mut config = invalidator(command.clone()).config().clone();
        config.content_saved_scope = ContentSavedScope::Everything;
        let registry = registry(Invalidator::new(config, command.clone()));
        registry.register();

        registry.dispatch(Trigger::ContentSaved { id: 5 }).await;
        assert_eq!(command.patterns(), vec!["/(.*)"]);
    }

    #[tokio::test]
    async fn translation_saved_also_flushes_object_cache() {
        let command = RecordingCommand::exiting(0);
        let cache = Arc::new(CountingBackend::default());
        let registry = registry(invalidator(command.clone()).with_object_cache(cache.clone()));
        registry.register();

        let outcome = registry.dispatch(Trigger::TranslationSaved { id: 3 }).await;

        assert!(matches!(outcome, Some(TriggerOutcome::PurgedAndFlushed(_))));
        assert_eq!(command.patterns(), vec!["/(.*)"]);
        assert_eq!(cache.count(), 1);
    }

    #[tokio::test]
    async fn lifecycle_triggers_purge_everything() {
        let command = RecordingCommand::exiting(0);
        let registry = registry(invalidator(command.clone()));
        registry.register();

        registry.dispatch(Trigger::WidgetSaved).await;
        registry.dispatch(Trigger::ContentTrashed { id: 2 }).await;
        assert_eq!(command.patterns(), vec!["/(.*)", "/(.*)"]);
    }

    #[tokio::test]
    async fn asset_option_change_sweeps_without_purging() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("combined.css"), b"x").expect("write asset");

        let command = RecordingCommand::exiting(0);
        let registry = HookRegistry::new(
            Arc::new(invalidator(command.clone())),
            AssetSweeper::new(dir.path()),
        );
        registry.register();

        let outcome = registry.dispatch(Trigger::AssetOptionChanged).await;

        assert!(matches!(outcome, Some(TriggerOutcome::Swept(report)) if report.files_removed == 1));
        assert!(command.patterns().is_empty());
    }
}
