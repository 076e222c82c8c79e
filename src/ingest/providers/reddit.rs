use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{first_str, first_timestamp, first_u64};
use crate::config::RedditCfg;
use crate::ingest::types::SourceProvider;
use crate::model::{normalize_content, NormalizedItem, Source};

const BASE_URL: &str = "https://www.reddit.com";

/// Public Reddit search (`/search.json`), optionally scoped per subreddit.
pub struct RedditProvider {
    client: Client,
    base_url: String,
    queries: Vec<String>,
    subreddits: Vec<String>,
    limit: u32,
    user_agent: String,
    content_max_chars: usize,
}

impl RedditProvider {
    pub fn from_config(cfg: &RedditCfg, content_max_chars: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: BASE_URL.to_string(),
            queries: cfg.queries.clone(),
            subreddits: cfg.subreddits.clone(),
            limit: cfg.limit.clamp(1, 100),
            user_agent: cfg.user_agent.clone(),
            content_max_chars,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn search_urls(&self) -> Vec<(String, Vec<(&'static str, String)>)> {
        let mut out = Vec::new();
        for q in &self.queries {
            let mut params = vec![
                ("q", q.clone()),
                ("sort", "new".to_string()),
                ("limit", self.limit.to_string()),
                ("t", "week".to_string()),
                ("raw_json", "1".to_string()),
            ];
            if self.subreddits.is_empty() {
                out.push((format!("{}/search.json", self.base_url), params));
            } else {
                params.push(("restrict_sr", "1".to_string()));
                for sub in &self.subreddits {
                    let sub = sub.trim_start_matches("r/");
                    out.push((format!("{}/r/{}/search.json", self.base_url, sub), params.clone()));
                }
            }
        }
        out
    }

    /// Map a listing (`{"data":{"children":[{"kind":"t3","data":{..}}]}}`).
    pub fn parse_listing(body: &Value, content_max_chars: usize) -> Vec<NormalizedItem> {
        let Some(children) = body.pointer("/data/children").and_then(Value::as_array) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(children.len());
        for child in children {
            let d = child.get("data").unwrap_or(child);
            let Some(native_id) = first_str(d, &["id", "name"]) else {
                continue;
            };
            let Some(ts) = first_timestamp(d, &["created_utc", "created"]) else {
                continue;
            };
            let author = first_str(d, &["author"]).unwrap_or_default();
            let title = first_str(d, &["title"]).unwrap_or_default();
            let body_text = first_str(d, &["selftext", "body"]).unwrap_or_default();
            let text = if body_text.is_empty() {
                title
            } else {
                format!("{title}\n\n{body_text}")
            };
            let url = first_str(d, &["permalink"])
                .map(|p| {
                    if p.starts_with("http") {
                        p
                    } else {
                        format!("https://www.reddit.com{p}")
                    }
                })
                .or_else(|| first_str(d, &["url"]));

            let mut item = NormalizedItem::new(
                Source::Reddit,
                &native_id,
                &author,
                normalize_content(&text, content_max_chars),
                ts,
            )
            .with_url(url);
            if let Some(n) = first_u64(d, &["score", "ups"]) {
                item = item.with_meta("score", n);
            }
            if let Some(n) = first_u64(d, &["num_comments"]) {
                item = item.with_meta("comments", n);
            }
            if let Some(s) = first_str(d, &["subreddit"]) {
                item = item.with_meta("subreddit", s);
            }
            out.push(item);
        }
        out
    }

    async fn fetch_one(&self, url: &str, params: &[(&'static str, String)]) -> Result<Vec<NormalizedItem>> {
        let body: Value = self
            .client
            .get(url)
            .query(params)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .context("reddit get()")?
            .error_for_status()
            .context("reddit non-2xx")?
            .json()
            .await
            .context("reddit .json()")?;
        Ok(Self::parse_listing(&body, self.content_max_chars))
    }
}

#[async_trait]
impl SourceProvider for RedditProvider {
    /// Individual query failures are logged; the source only fails when every
    /// query failed.
    async fn fetch_latest(&self) -> Result<Vec<NormalizedItem>> {
        let searches = self.search_urls();
        if searches.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let mut last_err = None;
        let mut ok = 0usize;
        for (url, params) in &searches {
            match self.fetch_one(url, params).await {
                Ok(mut v) => {
                    ok += 1;
                    out.append(&mut v);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", error = ?e, url = %url, "reddit query failed");
                    last_err = Some(e);
                }
            }
        }
        if ok == 0 {
            return Err(last_err.unwrap_or_else(|| anyhow!("reddit: no query succeeded")));
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}
