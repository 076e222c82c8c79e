use anyhow::{Context, Result};
use reqwest::Client;

use super::{preview, Notifier};
use crate::model::NormalizedItem;

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            client: Client::new(),
        }
    }

    fn render(items: &[NormalizedItem]) -> String {
        let mut text = format!("*{} new post(s)*", items.len());
        for it in items {
            let link = it.url.as_deref().unwrap_or("");
            text.push_str(&format!(
                "\n• [{}] *{}*: {} {}",
                it.source,
                it.author,
                preview(it, 200),
                link
            ));
        }
        text
    }
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, items: &[NormalizedItem]) -> Result<()> {
        let body = serde_json::json!({ "text": Self::render(items) });

        self.client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}
