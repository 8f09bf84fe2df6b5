use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Purgeline binary.
#[derive(Debug, Parser)]
#[command(name = "purgeline", version, about = "Cache invalidation orchestrator")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PURGELINE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Register triggers and the maintenance schedule, then dispatch triggers read from stdin.
    Run(RunArgs),
    /// Purge one scope immediately.
    Purge(PurgeArgs),
    /// Check whether a URL is served from cache.
    Probe(ProbeArgs),
    /// Delete generated assets.
    Sweep(SweepArgs),
    /// Evaluate request guards against submitted form fields.
    Guard(GuardArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the site home URL.
    #[arg(long = "home-url", value_name = "URL", global = true)]
    pub home_url: Option<String>,

    /// Override the purge tool executable.
    #[arg(
        long = "purge-tool",
        value_name = "PATH",
        value_hint = ValueHint::ExecutablePath,
        global = true
    )]
    pub purge_tool: Option<PathBuf>,

    /// Toggle automatic purging on lifecycle triggers.
    #[arg(
        long = "autoflush",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub autoflush: Option<bool>,

    /// Toggle the CDN purge.
    #[arg(
        long = "cdn-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cdn_enabled: Option<bool>,

    /// Override the memcached address used for object-cache flushes.
    #[arg(long = "memcached-addr", value_name = "HOST:PORT", global = true)]
    pub memcached_addr: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RunArgs {
    /// Override the maintenance interval.
    #[arg(long = "sweep-interval-seconds", value_name = "SECONDS")]
    pub sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct PurgeArgs {
    #[command(subcommand)]
    pub scope: PurgeScope,
}

#[derive(Debug, Subcommand, Clone)]
pub enum PurgeScope {
    /// The site root and everything below it.
    Everything,
    /// The site root page only.
    Index,
    /// The REST API root and everything below it.
    Rest,
    /// A single URL, recursively unless `--exact` is given.
    Url {
        #[arg(value_name = "URL")]
        url: String,
        /// Purge only the exact path.
        #[arg(long, action = clap::ArgAction::SetTrue)]
        exact: bool,
    },
    /// A piece of content, its REST representation, and its descendants.
    Content {
        #[arg(value_name = "ID")]
        id: u64,
    },
}

#[derive(Debug, Args, Clone)]
pub struct ProbeArgs {
    #[arg(value_name = "URL")]
    pub url: String,

    /// Treat the URL as static; never retry.
    #[arg(long = "static", action = clap::ArgAction::SetTrue)]
    pub static_page: bool,

    /// Check the CDN cache-status header instead of the proxy's.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub cdn: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SweepArgs {
    /// Directory to sweep; defaults to the configured assets directory.
    #[arg(value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct GuardArgs {
    /// Submitted form field as `key=value`; may be repeated.
    #[arg(long = "field", value_name = "KEY=VALUE", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("missing field name in `{raw}`")),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Ok((raw.to_string(), String::new())),
    }
}
