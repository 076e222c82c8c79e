//! Outbound chat notifications for newly admitted items.
//!
//! Idempotency comes from the caller: the pipeline only ever passes the items
//! admitted in the current cycle, so nothing is announced twice.

pub mod discord;
pub mod slack;

use std::sync::Arc;

use anyhow::Result;

use crate::config::NotifyCfg;
use crate::metrics as feed_metrics;
use crate::model::NormalizedItem;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, items: &[NormalizedItem]) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Fans out to every configured channel. A failing channel is logged and
/// does not stop the others.
#[derive(Clone, Default)]
pub struct NotifierMux {
    channels: Vec<Arc<dyn Notifier>>,
    max_per_cycle: usize,
}

impl NotifierMux {
    pub fn new(channels: Vec<Arc<dyn Notifier>>, max_per_cycle: usize) -> Self {
        Self {
            channels,
            max_per_cycle,
        }
    }

    pub fn from_config(cfg: &NotifyCfg) -> Self {
        let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
        if let Some(url) = cfg.discord_webhook.clone() {
            channels.push(Arc::new(discord::DiscordNotifier::new(url)));
        }
        if let Some(url) = cfg.slack_webhook.clone() {
            channels.push(Arc::new(slack::SlackNotifier::new(url)));
        }
        Self::new(channels, cfg.max_per_cycle)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Newest `max_per_cycle` items, presented oldest first so a chat channel
    /// reads chronologically.
    pub fn select<'a>(&self, admitted: &'a [NormalizedItem]) -> Vec<&'a NormalizedItem> {
        let mut picked: Vec<&NormalizedItem> = admitted.iter().collect();
        picked.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if self.max_per_cycle > 0 {
            picked.truncate(self.max_per_cycle);
        }
        picked.reverse();
        picked
    }

    /// Returns the number of channels that failed.
    pub async fn notify(&self, admitted: &[NormalizedItem]) -> usize {
        if admitted.is_empty() || self.channels.is_empty() {
            return 0;
        }
        let picked: Vec<NormalizedItem> = self.select(admitted).into_iter().cloned().collect();
        if picked.len() < admitted.len() {
            tracing::info!(
                target: "notify",
                admitted = admitted.len(),
                announced = picked.len(),
                "notification cap applied"
            );
        }

        let mut failures = 0usize;
        for ch in &self.channels {
            if let Err(e) = ch.send(&picked).await {
                failures += 1;
                feed_metrics::sink_error("notify");
                tracing::warn!(target: "notify", channel = ch.name(), "notify failed: {e:#}");
            }
        }
        failures
    }
}

/// Short single-line preview used by chat channels.
pub(crate) fn preview(item: &NormalizedItem, max_chars: usize) -> String {
    let text = item.content.replace('\n', " ");
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
