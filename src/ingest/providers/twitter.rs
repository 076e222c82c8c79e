use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::apify::ApifyClient;
use super::{first_str, first_timestamp, first_u64};
use crate::config::TwitterCfg;
use crate::ingest::types::SourceProvider;
use crate::model::{normalize_content, NormalizedItem, Source, CONVERSATION_ID_KEY};

#[derive(Debug, Serialize)]
struct TweetScraperInput<'a> {
    #[serde(rename = "searchTerms")]
    search_terms: &'a [String],
    #[serde(rename = "maxItems")]
    max_items: u32,
    sort: &'static str,
}

/// Tweets via an Apify scraper actor. Threaded: replies carry the id of the
/// conversation root, so the thread filter applies.
pub struct TwitterProvider {
    client: Option<ApifyClient>,
    actor_id: String,
    search_terms: Vec<String>,
    max_items: u32,
    content_max_chars: usize,
}

impl TwitterProvider {
    pub fn from_config(cfg: &TwitterCfg, content_max_chars: usize) -> Self {
        let client = cfg.api_token.clone().map(|t| {
            ApifyClient::new(t).with_max_wait(Duration::from_secs(cfg.max_wait_secs.max(1)))
        });
        Self {
            client,
            actor_id: cfg.actor_id.clone(),
            search_terms: cfg.search_terms.clone(),
            max_items: cfg.max_items,
            content_max_chars,
        }
    }

    /// Map raw scraper records. Records without an id or a parseable
    /// timestamp are skipped.
    pub fn parse_records(records: &[Value], content_max_chars: usize) -> Vec<NormalizedItem> {
        let mut out = Vec::with_capacity(records.len());
        for rec in records {
            // Some actors emit a placeholder record when a search has no results.
            if rec.get("noResults").and_then(Value::as_bool) == Some(true) {
                continue;
            }
            let Some(native_id) = first_str(rec, &["id", "id_str", "tweetId", "rest_id"]) else {
                tracing::debug!(target: "ingest", "tweet without id skipped");
                continue;
            };
            let Some(ts) = first_timestamp(rec, &["createdAt", "created_at", "timestamp"]) else {
                tracing::debug!(target: "ingest", native_id = %native_id, "tweet without timestamp skipped");
                continue;
            };
            let author = first_str(
                rec,
                &["author.userName", "author.username", "user.screen_name", "username", "screen_name"],
            )
            .unwrap_or_default();
            let text = first_str(rec, &["fullText", "full_text", "text"]).unwrap_or_default();
            let url = first_str(rec, &["url", "twitterUrl", "tweetUrl"]).or_else(|| {
                (!author.is_empty()).then(|| format!("https://x.com/{author}/status/{native_id}"))
            });

            let mut item = NormalizedItem::new(
                Source::Twitter,
                &native_id,
                &author,
                normalize_content(&text, content_max_chars),
                ts,
            )
            .with_url(url);

            if let Some(conv) = first_str(rec, &["conversationId", "conversation_id", "conversation_id_str"]) {
                item = item.with_meta(CONVERSATION_ID_KEY, conv);
            }
            for (key, paths) in [
                ("likes", &["likeCount", "favorite_count"][..]),
                ("retweets", &["retweetCount", "retweet_count"][..]),
                ("replies", &["replyCount", "reply_count"][..]),
            ] {
                if let Some(n) = first_u64(rec, paths) {
                    item = item.with_meta(key, n);
                }
            }
            out.push(item);
        }
        out
    }
}

#[async_trait]
impl SourceProvider for TwitterProvider {
    async fn fetch_latest(&self) -> Result<Vec<NormalizedItem>> {
        if self.search_terms.is_empty() {
            return Ok(Vec::new());
        }
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| anyhow!("twitter: APIFY_TOKEN not configured"))?;

        let input = TweetScraperInput {
            search_terms: &self.search_terms,
            max_items: self.max_items,
            sort: "Latest",
        };
        let records: Vec<Value> = client
            .run_actor(&self.actor_id, &input)
            .await
            .context("twitter scrape via apify")?;

        Ok(Self::parse_records(&records, self.content_max_chars))
    }

    fn name(&self) -> &'static str {
        "twitter"
    }

    fn threaded(&self) -> bool {
        true
    }
}
