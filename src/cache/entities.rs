//! Entity-specific invalidation.

use super::orchestrator::{ContentId, Invalidator, PurgeStatus};

/// A changed entity whose cached pages must be purged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityChange {
    Theme,
    Plugin,
    /// A taxonomy term; its archive page lists every tagged item.
    Term { archive_url: String },
    /// A comment shown on the content it belongs to.
    Comment { content_id: ContentId },
}

impl EntityChange {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Theme => "theme",
            Self::Plugin => "plugin",
            Self::Term { .. } => "term",
            Self::Comment { .. } => "comment",
        }
    }

    /// Purge everything that renders this entity, in order.
    pub async fn invalidate(&self, invalidator: &Invalidator) -> Vec<PurgeStatus> {
        match self {
            Self::Theme | Self::Plugin => vec![invalidator.purge_everything().await],
            Self::Term { archive_url } => vec![
                invalidator.purge_url(archive_url, true).await,
                invalidator.purge_index().await,
            ],
            Self::Comment { content_id } => {
                vec![invalidator.purge_content_and_dependents(*content_id).await]
            }
        }
    }
}
