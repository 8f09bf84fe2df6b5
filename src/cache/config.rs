//! Invalidation configuration.
//!
//! Derived from the `[site]`, `[cache]`, and `[cdn]` sections of
//! `purgeline.toml`.

use std::path::PathBuf;

use serde::Deserialize;

use super::purge::DEFAULT_PURGE_TOOL;
use super::scope::{ScopeError, SiteRoot};

const DEFAULT_REST_PATH: &str = "wp-json/";

/// How a plain content save is invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSavedScope {
    /// The REST representation plus the content's own URL and descendants.
    #[default]
    Content,
    /// The whole site.
    Everything,
}

/// Settings the orchestrator needs at runtime.
#[derive(Debug, Clone)]
pub struct PurgeConfig {
    pub site: SiteRoot,
    /// REST API root purged alongside content changes.
    pub rest_url: String,
    pub purge_tool: PathBuf,
    /// Register trigger subscriptions at startup.
    pub autoflush: bool,
    /// Flush the CDN before every path purge.
    pub cdn_enabled: bool,
    pub content_saved_scope: ContentSavedScope,
}

impl PurgeConfig {
    /// Defaults for `home_url`: autoflush on, CDN off, REST root under `wp-json/`.
    pub fn new(home_url: &str) -> Result<Self, ScopeError> {
        let site = SiteRoot::parse(home_url)?;
        let rest_url = format!("{}{DEFAULT_REST_PATH}", site.home_url());
        Ok(Self {
            site,
            rest_url,
            purge_tool: PathBuf::from(DEFAULT_PURGE_TOOL),
            autoflush: true,
            cdn_enabled: false,
            content_saved_scope: ContentSavedScope::default(),
        })
    }
}

impl TryFrom<&crate::config::Settings> for PurgeConfig {
    type Error = crate::config::LoadError;

    fn try_from(settings: &crate::config::Settings) -> Result<Self, Self::Error> {
        let home_url = settings.site.require_home_url()?;
        let mut config = Self::new(home_url).map_err(|err| {
            crate::config::LoadError::Invalid {
                key: "site.home_url",
                reason: err.to_string(),
            }
        })?;
        if let Some(rest_url) = settings.site.rest_url.as_ref() {
            config.rest_url = rest_url.clone();
        }
        config.purge_tool = settings.cache.purge_tool.clone();
        config.autoflush = settings.cache.autoflush;
        config.cdn_enabled = settings.cdn.enabled;
        config.content_saved_scope = settings.cache.content_saved_scope;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = PurgeConfig::new("https://www.example.com").expect("valid url");
        assert_eq!(config.site.hostname(), "example.com");
        assert_eq!(config.rest_url, "https://www.example.com/wp-json/");
        assert_eq!(config.purge_tool, PathBuf::from("site-tools-client"));
        assert!(config.autoflush);
        assert!(!config.cdn_enabled);
        assert_eq!(config.content_saved_scope, ContentSavedScope::Content);
    }

    #[test]
    fn rest_root_follows_subdirectory_install() {
        let config = PurgeConfig::new("https://example.com/blog").expect("valid url");
        assert_eq!(config.rest_url, "https://example.com/blog/wp-json/");
    }

    #[test]
    fn invalid_home_url_is_rejected() {
        assert!(PurgeConfig::new("not a url").is_err());
    }
}
