use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{preview, Notifier};
use crate::model::NormalizedItem;

/// Discord caps a webhook message at 10 embeds.
const EMBEDS_PER_MESSAGE: usize = 10;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    async fn post(&self, payload: &DiscordWebhookPayload) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Discord webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, items: &[NormalizedItem]) -> Result<()> {
        for chunk in items.chunks(EMBEDS_PER_MESSAGE) {
            let payload = DiscordWebhookPayload {
                content: None,
                embeds: chunk.iter().map(DiscordEmbed::from_item).collect(),
            };
            self.post(&payload).await?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[derive(Serialize)]
struct DiscordAuthor {
    name: String,
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    timestamp: String,
    author: DiscordAuthor,
}

impl DiscordEmbed {
    fn from_item(it: &NormalizedItem) -> Self {
        Self {
            title: format!("New {} post", it.source),
            description: preview(it, 300),
            url: it.url.clone(),
            timestamp: it.timestamp.to_rfc3339(),
            author: DiscordAuthor {
                name: it.author.clone(),
            },
        }
    }
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}
