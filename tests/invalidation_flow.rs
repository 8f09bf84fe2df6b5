//! End-to-end invalidation flows through the public API.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use purgeline::application::feed::{FeedSummary, dispatch_lines};
use purgeline::cache::{
    AssetSweeper, EntityChange, HookRegistry, Invalidator, PurgeCommand, PurgeConfig, PurgeError,
    PurgeOutcome, PurgeTarget, RequestGuard, RequestSignals, TemplatePermalinks, Trigger,
    TriggerOutcome, guards,
};

#[derive(Default)]
struct RecordingCommand {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingCommand {
    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl PurgeCommand for RecordingCommand {
    async fn purge(&self, target: &PurgeTarget) -> Result<PurgeOutcome, PurgeError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((target.hostname.clone(), target.pattern.to_string()));
        Ok(PurgeOutcome::from_exit_code(Some(0)))
    }
}

fn invalidator(command: Arc<RecordingCommand>) -> Arc<Invalidator> {
    let config = PurgeConfig::new("https://example.com/").expect("valid home url");
    Arc::new(
        Invalidator::new(config, command).with_permalinks(Arc::new(TemplatePermalinks::new(
            "{home}posts/{id}",
            "https://example.com/",
        ))),
    )
}

fn registry(invalidator: Arc<Invalidator>) -> HookRegistry {
    let registry = HookRegistry::new(invalidator, AssetSweeper::new("no-such-assets"));
    registry.register();
    registry
}

#[tokio::test]
async fn content_saved_purges_rest_root_then_content_tree() {
    let command = Arc::new(RecordingCommand::default());
    let invalidator = invalidator(command.clone());
    let hooks = registry(invalidator.clone());

    let outcome = hooks.dispatch(Trigger::ContentSaved { id: 5 }).await;

    assert!(matches!(outcome, Some(TriggerOutcome::Purged(status)) if status.succeeded()));
    assert_eq!(
        command.calls(),
        vec![
            ("example.com".to_string(), "/wp-json/(.*)".to_string()),
            ("example.com".to_string(), "/posts/5(.*)".to_string()),
        ]
    );

    let notifications = invalidator.notifications().drain(10);
    let urls: Vec<_> = notifications.iter().map(|n| n.url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["https://example.com/wp-json/", "https://example.com/posts/5"]
    );
}

#[tokio::test]
async fn settings_guard_with_unrelated_field_purges_once() {
    let command = Arc::new(RecordingCommand::default());
    let invalidator = invalidator(command.clone());
    let signals = RequestSignals::new()
        .with_field("action", "update")
        .with_field("option_page", "reading")
        .with_field("posts_per_page", "10");

    let results = guards::evaluate(&invalidator, &signals).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, RequestGuard::SettingsSaved);
    assert_eq!(
        command.calls(),
        vec![("example.com".to_string(), "/(.*)".to_string())]
    );
}

#[tokio::test]
async fn feed_dispatches_parsed_lines() {
    let command = Arc::new(RecordingCommand::default());
    let hooks = registry(invalidator(command.clone()));
    let input = b"# maintenance window\ncore_updated\n\ncontent_saved:7\nreboot\ncontent_saved\n";

    let summary = dispatch_lines(&input[..], &hooks).await.expect("feed");

    assert_eq!(
        summary,
        FeedSummary {
            dispatched: 2,
            ignored: 0,
            rejected: 2,
        }
    );
    let patterns: Vec<_> = command.calls().into_iter().map(|(_, p)| p).collect();
    assert_eq!(patterns, vec!["/(.*)", "/wp-json/(.*)", "/posts/7(.*)"]);
}

#[tokio::test]
async fn feed_ignores_triggers_when_autoflush_is_off() {
    let command = Arc::new(RecordingCommand::default());
    let mut config = PurgeConfig::new("https://example.com/").expect("valid home url");
    config.autoflush = false;
    let hooks = registry(Arc::new(Invalidator::new(config, command.clone())));

    let summary = dispatch_lines(&b"core_updated\n"[..], &hooks)
        .await
        .expect("feed");

    assert_eq!(summary.ignored, 1);
    assert!(command.calls().is_empty());
}

#[tokio::test]
async fn subdirectory_install_scopes_purges_to_its_root() {
    let command = Arc::new(RecordingCommand::default());
    let config = PurgeConfig::new("https://www.example.com/blog/").expect("valid home url");
    let invalidator = Invalidator::new(config, command.clone());

    assert!(invalidator.purge_everything().await.succeeded());
    assert!(
        invalidator
            .purge_url("https://www.example.com/blog/?p=3", false)
            .await
            .is_suppressed()
    );
    // Root of the domain is outside the install, so a query there is allowed.
    assert!(
        invalidator
            .purge_url("https://www.example.com/?p=3", false)
            .await
            .succeeded()
    );

    assert_eq!(
        command.calls(),
        vec![
            ("example.com".to_string(), "/blog/(.*)".to_string()),
            ("example.com".to_string(), "/".to_string()),
        ]
    );
}

#[tokio::test]
async fn term_change_purges_archive_and_index() {
    let command = Arc::new(RecordingCommand::default());
    let invalidator = invalidator(command.clone());

    let statuses = EntityChange::Term {
        archive_url: "/category/news/".to_string(),
    }
    .invalidate(&invalidator)
    .await;

    assert_eq!(statuses.len(), 2);
    let patterns: Vec<_> = command.calls().into_iter().map(|(_, p)| p).collect();
    assert_eq!(patterns, vec!["/category/news/(.*)", "/"]);
}
