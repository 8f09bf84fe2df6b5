//! Backend construction from resolved settings.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::info;

use crate::cache::{
    CacheProbe, CdnPurge, CloudflareFlusher, Invalidator, MemcachedFlusher, NoopCdn,
    NoopObjectCache, NotificationLog, ObjectCache, ProcessPurgeCommand, PurgeConfig,
    TemplatePermalinks, UrlExclusions,
};
use crate::config::{CdnSettings, ObjectCacheSettings, Settings};

use super::error::InfraError;

const USER_AGENT: &str = concat!("purgeline/", env!("CARGO_PKG_VERSION"));

pub fn http_client(timeout: Duration) -> Result<Client, InfraError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|err| InfraError::http_client(format!("failed to build client: {err}")))
}

pub fn object_cache(settings: &ObjectCacheSettings) -> Arc<dyn ObjectCache> {
    match settings.memcached_addr {
        Some(addr) => {
            info!(%addr, "Object cache flushes go to memcached");
            Arc::new(MemcachedFlusher::new(addr))
        }
        None => Arc::new(NoopObjectCache),
    }
}

pub fn cdn(settings: &CdnSettings, client: Client) -> Arc<dyn CdnPurge> {
    match (settings.enabled, &settings.zone_id, &settings.api_token) {
        (true, Some(zone_id), Some(api_token)) => Arc::new(CloudflareFlusher::new(
            client,
            settings.api_base.clone(),
            zone_id.clone(),
            api_token.clone(),
        )),
        _ => Arc::new(NoopCdn),
    }
}

/// Build the process-wide orchestrator with every configured backend.
pub fn invalidator(
    settings: &Settings,
    notifications: Arc<NotificationLog>,
) -> Result<Invalidator, InfraError> {
    let config =
        PurgeConfig::try_from(settings).map_err(|err| InfraError::configuration(err.to_string()))?;
    let client = http_client(settings.probe.timeout)?;
    let permalinks = TemplatePermalinks::new(
        settings.site.permalink_template.clone(),
        config.site.home_url(),
    );
    let command = ProcessPurgeCommand::new(config.purge_tool.clone());

    Ok(Invalidator::new(config, Arc::new(command))
        .with_object_cache(object_cache(&settings.object_cache))
        .with_cdn(cdn(&settings.cdn, client))
        .with_permalinks(Arc::new(permalinks))
        .with_notifications(notifications))
}

pub fn probe(settings: &Settings) -> Result<CacheProbe, InfraError> {
    let client = http_client(settings.probe.timeout)?;
    let exclusions = UrlExclusions::new(&settings.probe.exclusions)
        .map_err(|err| InfraError::configuration(err.to_string()))?;
    Ok(CacheProbe::new(client, exclusions))
}
