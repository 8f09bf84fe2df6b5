//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{
    ContentSavedScope, DEFAULT_CLOUDFLARE_API_BASE, DEFAULT_PERMALINK_TEMPLATE,
    DEFAULT_PURGE_TOOL, SiteRoot, UrlExclusions,
};

mod cli;

pub use cli::*;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "purgeline";
const ENV_PREFIX: &str = "PURGELINE";
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ASSETS_DIR: &str = "assets";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 172_800;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub site: SiteSettings,
    pub cache: CacheSettings,
    pub object_cache: ObjectCacheSettings,
    pub cdn: CdnSettings,
    pub probe: ProbeSettings,
    pub assets: AssetSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    /// Validated home URL. Optional until a purge needs it.
    pub home_url: Option<String>,
    pub rest_url: Option<String>,
    pub permalink_template: String,
}

impl SiteSettings {
    /// The home URL, or an error naming the missing key.
    pub fn require_home_url(&self) -> Result<&str, LoadError> {
        self.home_url
            .as_deref()
            .ok_or_else(|| LoadError::invalid("site.home_url", "required for purge operations"))
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub autoflush: bool,
    pub purge_tool: PathBuf,
    pub content_saved_scope: ContentSavedScope,
}

#[derive(Debug, Clone)]
pub struct ObjectCacheSettings {
    pub memcached_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct CdnSettings {
    pub enabled: bool,
    pub zone_id: Option<String>,
    pub api_token: Option<String>,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub exclusions: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AssetSettings {
    pub directory: PathBuf,
    pub sweep_interval: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("probe.exclusions")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_global_overrides(&cli.overrides);
    if let Some(Command::Run(args)) = cli.command.as_ref() {
        raw.apply_run_overrides(args);
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    site: RawSiteSettings,
    cache: RawCacheSettings,
    object_cache: RawObjectCacheSettings,
    cdn: RawCdnSettings,
    probe: RawProbeSettings,
    assets: RawAssetSettings,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.home_url.as_ref() {
            self.site.home_url = Some(url.clone());
        }
        if let Some(tool) = overrides.purge_tool.as_ref() {
            self.cache.purge_tool = Some(tool.clone());
        }
        if let Some(autoflush) = overrides.autoflush {
            self.cache.autoflush = Some(autoflush);
        }
        if let Some(enabled) = overrides.cdn_enabled {
            self.cdn.enabled = Some(enabled);
        }
        if let Some(addr) = overrides.memcached_addr.as_ref() {
            self.object_cache.memcached_addr = Some(addr.clone());
        }
    }

    fn apply_run_overrides(&mut self, overrides: &RunArgs) {
        if let Some(seconds) = overrides.sweep_interval_seconds {
            self.assets.sweep_interval_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            site,
            cache,
            object_cache,
            cdn,
            probe,
            assets,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let site = build_site_settings(site)?;
        let cache = build_cache_settings(cache)?;
        let object_cache = build_object_cache_settings(object_cache)?;
        let cdn = build_cdn_settings(cdn)?;
        let probe = build_probe_settings(probe)?;
        let assets = build_asset_settings(assets)?;

        Ok(Self {
            logging,
            site,
            cache,
            object_cache,
            cdn,
            probe,
            assets,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let home_url = non_empty(site.home_url);
    if let Some(url) = home_url.as_deref() {
        SiteRoot::parse(url).map_err(|err| LoadError::invalid("site.home_url", err.to_string()))?;
    }

    let rest_url = non_empty(site.rest_url);
    if let Some(url) = rest_url.as_deref() {
        url::Url::parse(url)
            .map_err(|err| LoadError::invalid("site.rest_url", format!("invalid url: {err}")))?;
    }

    let permalink_template = non_empty(site.permalink_template)
        .unwrap_or_else(|| DEFAULT_PERMALINK_TEMPLATE.to_string());
    if !permalink_template.contains("{id}") {
        return Err(LoadError::invalid(
            "site.permalink_template",
            "template must contain `{id}`",
        ));
    }

    Ok(SiteSettings {
        home_url,
        rest_url,
        permalink_template,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let purge_tool = cache
        .purge_tool
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PURGE_TOOL));
    if purge_tool.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.purge_tool",
            "path must not be empty",
        ));
    }

    Ok(CacheSettings {
        autoflush: cache.autoflush.unwrap_or(true),
        purge_tool,
        content_saved_scope: cache.content_saved_scope.unwrap_or_default(),
    })
}

fn build_object_cache_settings(
    object_cache: RawObjectCacheSettings,
) -> Result<ObjectCacheSettings, LoadError> {
    let memcached_addr = non_empty(object_cache.memcached_addr)
        .map(|addr| {
            addr.parse::<SocketAddr>().map_err(|err| {
                LoadError::invalid(
                    "object_cache.memcached_addr",
                    format!("invalid address `{addr}`: {err}"),
                )
            })
        })
        .transpose()?;

    Ok(ObjectCacheSettings { memcached_addr })
}

fn build_cdn_settings(cdn: RawCdnSettings) -> Result<CdnSettings, LoadError> {
    let enabled = cdn.enabled.unwrap_or(false);
    let zone_id = non_empty(cdn.zone_id);
    let api_token = non_empty(cdn.api_token);

    if enabled && zone_id.is_none() {
        return Err(LoadError::invalid(
            "cdn.zone_id",
            "required when the CDN purge is enabled",
        ));
    }
    if enabled && api_token.is_none() {
        return Err(LoadError::invalid(
            "cdn.api_token",
            "required when the CDN purge is enabled",
        ));
    }

    let api_base =
        non_empty(cdn.api_base).unwrap_or_else(|| DEFAULT_CLOUDFLARE_API_BASE.to_string());

    Ok(CdnSettings {
        enabled,
        zone_id,
        api_token,
        api_base,
    })
}

fn build_probe_settings(probe: RawProbeSettings) -> Result<ProbeSettings, LoadError> {
    let timeout_seconds = probe.timeout_seconds.unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "probe.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let exclusions = probe.exclusions.unwrap_or_default();
    UrlExclusions::new(&exclusions)
        .map_err(|err| LoadError::invalid("probe.exclusions", err.to_string()))?;

    Ok(ProbeSettings {
        exclusions,
        timeout: Duration::from_secs(timeout_seconds),
    })
}

fn build_asset_settings(assets: RawAssetSettings) -> Result<AssetSettings, LoadError> {
    let directory = assets
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "assets.directory",
            "path must not be empty",
        ));
    }

    let interval_seconds = assets
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    if interval_seconds == 0 {
        return Err(LoadError::invalid(
            "assets.sweep_interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(AssetSettings {
        directory,
        sweep_interval: Duration::from_secs(interval_seconds),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    home_url: Option<String>,
    rest_url: Option<String>,
    permalink_template: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    autoflush: Option<bool>,
    purge_tool: Option<PathBuf>,
    content_saved_scope: Option<ContentSavedScope>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawObjectCacheSettings {
    memcached_addr: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCdnSettings {
    enabled: Option<bool>,
    zone_id: Option<String>,
    api_token: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawProbeSettings {
    exclusions: Option<Vec<String>>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAssetSettings {
    directory: Option<PathBuf>,
    sweep_interval_seconds: Option<u64>,
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
