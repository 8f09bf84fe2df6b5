//! Request-scoped purge guards.
//!
//! Some admin actions are only visible as submitted form fields. Each inbound
//! request is inspected once and every matching guard purges the whole site.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use super::orchestrator::{Invalidator, PurgeStatus};

const MEDIA_EDIT_FIELDS: &[&str] = &[
    "save-header-options",
    "removeheader",
    "skip-cropping",
    "remove-background",
    "save-background-options",
];

const MEDIA_SUBMIT_VALUES: &[&str] = &["Crop and Publish", "Upload"];

/// Form fields submitted with an inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSignals {
    fields: HashMap<String, String>,
}

impl RequestSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }
}

impl<K, V> FromIterator<(K, V)> for RequestSignals
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestGuard {
    /// An options page was saved.
    SettingsSaved,
    /// Header, background, or crop editing in the media tools.
    MediaEdited,
}

impl RequestGuard {
    pub const ALL: [RequestGuard; 2] = [RequestGuard::SettingsSaved, RequestGuard::MediaEdited];

    pub fn matches(self, signals: &RequestSignals) -> bool {
        match self {
            Self::SettingsSaved => {
                signals.field("action") == Some("update") && signals.has_field("option_page")
            }
            Self::MediaEdited => {
                MEDIA_EDIT_FIELDS.iter().any(|key| signals.has_field(key))
                    || signals
                        .field("submit")
                        .is_some_and(|value| MEDIA_SUBMIT_VALUES.contains(&value))
            }
        }
    }
}

impl fmt::Display for RequestGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SettingsSaved => "settings_saved",
            Self::MediaEdited => "media_edited",
        })
    }
}

/// Guards that fire for `signals`, in evaluation order.
pub fn triggered(signals: &RequestSignals) -> Vec<RequestGuard> {
    RequestGuard::ALL
        .into_iter()
        .filter(|guard| guard.matches(signals))
        .collect()
}

/// Evaluate every guard once and purge the whole site for each one that fires.
pub async fn evaluate(
    invalidator: &Invalidator,
    signals: &RequestSignals,
) -> Vec<(RequestGuard, PurgeStatus)> {
    let mut results = Vec::new();
    for guard in triggered(signals) {
        debug!(%guard, "Request guard triggered");
        let status = invalidator.purge_everything().await;
        results.push((guard, status));
    }
    results
}
