use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde_json::{json, Value};

use super::{first_str, first_timestamp, first_u64};
use crate::config::GithubCfg;
use crate::ingest::types::SourceProvider;
use crate::model::{normalize_content, NormalizedItem, Source};

const API_URL: &str = "https://api.github.com";

const DISCUSSION_QUERY: &str = r#"
query($q: String!, $n: Int!) {
  search(query: $q, type: DISCUSSION, first: $n) {
    nodes {
      ... on Discussion {
        id
        number
        title
        body
        url
        createdAt
        author { login }
        repository { nameWithOwner }
        comments { totalCount }
        category { name }
      }
    }
  }
}"#;

/// GitHub issues/PRs via the REST search API, and discussions via GraphQL
/// when a token is configured.
pub struct GithubProvider {
    client: Client,
    api_url: String,
    queries: Vec<String>,
    per_page: u32,
    token: Option<String>,
    include_discussions: bool,
    content_max_chars: usize,
}

impl GithubProvider {
    pub fn from_config(cfg: &GithubCfg, content_max_chars: usize) -> Self {
        Self {
            client: Client::new(),
            api_url: API_URL.to_string(),
            queries: cfg.queries.clone(),
            per_page: cfg.per_page.clamp(1, 100),
            token: cfg.token.clone(),
            include_discussions: cfg.include_discussions,
            content_max_chars,
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn authed(&self, rb: RequestBuilder) -> RequestBuilder {
        let rb = rb
            .header(header::USER_AGENT, concat!("social-feed/", env!("CARGO_PKG_VERSION")))
            .header(header::ACCEPT, "application/vnd.github+json");
        match &self.token {
            Some(t) => rb.bearer_auth(t),
            None => rb,
        }
    }

    /// Map `/search/issues` results.
    pub fn parse_issues(body: &Value, content_max_chars: usize) -> Vec<NormalizedItem> {
        let Some(items) = body.get("items").and_then(Value::as_array) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(items.len());
        for it in items {
            let Some(native_id) = first_str(it, &["id", "node_id"]) else {
                continue;
            };
            let Some(ts) = first_timestamp(it, &["created_at"]) else {
                continue;
            };
            let author = first_str(it, &["user.login"]).unwrap_or_default();
            let text = compose(
                first_str(it, &["title"]).unwrap_or_default(),
                first_str(it, &["body"]).unwrap_or_default(),
            );
            let kind = if it.get("pull_request").is_some() {
                "pull_request"
            } else {
                "issue"
            };

            let mut item = NormalizedItem::new(
                Source::Github,
                &native_id,
                &author,
                normalize_content(&text, content_max_chars),
                ts,
            )
            .with_url(first_str(it, &["html_url"]))
            .with_meta("kind", kind);
            if let Some(s) = first_str(it, &["state"]) {
                item = item.with_meta("state", s);
            }
            if let Some(n) = first_u64(it, &["comments"]) {
                item = item.with_meta("comments", n);
            }
            if let Some(repo) = first_str(it, &["repository_url"]).and_then(|u| repo_from_api_url(&u)) {
                item = item.with_meta("repository", repo);
            }
            let labels: Vec<Value> = it
                .get("labels")
                .and_then(Value::as_array)
                .map(|ls| {
                    ls.iter()
                        .filter_map(|l| first_str(l, &["name"]))
                        .map(Value::String)
                        .collect()
                })
                .unwrap_or_default();
            if !labels.is_empty() {
                item = item.with_meta("labels", labels);
            }
            out.push(item);
        }
        out
    }

    /// Map the GraphQL discussion search response.
    pub fn parse_discussions(body: &Value, content_max_chars: usize) -> Vec<NormalizedItem> {
        let Some(nodes) = body.pointer("/data/search/nodes").and_then(Value::as_array) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(nodes.len());
        for n in nodes {
            let Some(native_id) = first_str(n, &["id"]) else {
                continue;
            };
            let Some(ts) = first_timestamp(n, &["createdAt"]) else {
                continue;
            };
            let author = first_str(n, &["author.login"]).unwrap_or_default();
            let text = compose(
                first_str(n, &["title"]).unwrap_or_default(),
                first_str(n, &["body"]).unwrap_or_default(),
            );
            let mut item = NormalizedItem::new(
                Source::Github,
                &native_id,
                &author,
                normalize_content(&text, content_max_chars),
                ts,
            )
            .with_url(first_str(n, &["url"]))
            .with_meta("kind", "discussion");
            if let Some(repo) = first_str(n, &["repository.nameWithOwner"]) {
                item = item.with_meta("repository", repo);
            }
            if let Some(c) = first_u64(n, &["comments.totalCount"]) {
                item = item.with_meta("comments", c);
            }
            if let Some(cat) = first_str(n, &["category.name"]) {
                item = item.with_meta("discussion_category", cat);
            }
            out.push(item);
        }
        out
    }

    async fn search_issues(&self, q: &str) -> Result<Vec<NormalizedItem>> {
        let url = format!("{}/search/issues", self.api_url);
        let rb = self.client.get(&url).query(&[
            ("q", q.to_string()),
            ("sort", "created".to_string()),
            ("order", "desc".to_string()),
            ("per_page", self.per_page.to_string()),
        ]);
        let body: Value = self
            .authed(rb)
            .send()
            .await
            .context("github search get()")?
            .error_for_status()
            .context("github search non-2xx")?
            .json()
            .await
            .context("github search .json()")?;
        Ok(Self::parse_issues(&body, self.content_max_chars))
    }

    async fn search_discussions(&self, q: &str) -> Result<Vec<NormalizedItem>> {
        let url = format!("{}/graphql", self.api_url);
        let payload = json!({
            "query": DISCUSSION_QUERY,
            "variables": { "q": q, "n": self.per_page },
        });
        let body: Value = self
            .authed(self.client.post(&url).json(&payload))
            .send()
            .await
            .context("github graphql post()")?
            .error_for_status()
            .context("github graphql non-2xx")?
            .json()
            .await
            .context("github graphql .json()")?;
        if let Some(errs) = body.get("errors").filter(|e| !e.is_null()) {
            return Err(anyhow!("github graphql errors: {errs}"));
        }
        Ok(Self::parse_discussions(&body, self.content_max_chars))
    }
}

fn compose(title: String, body: String) -> String {
    if body.is_empty() {
        title
    } else {
        format!("{title}\n\n{body}")
    }
}

/// `https://api.github.com/repos/owner/name` -> `owner/name`
fn repo_from_api_url(u: &str) -> Option<String> {
    let (_, rest) = u.split_once("/repos/")?;
    let rest = rest.trim_end_matches('/');
    (!rest.is_empty()).then(|| rest.to_string())
}

#[async_trait]
impl SourceProvider for GithubProvider {
    async fn fetch_latest(&self) -> Result<Vec<NormalizedItem>> {
        let mut out = Vec::new();
        let mut attempts = 0usize;
        let mut last_err = None;

        for q in &self.queries {
            attempts += 1;
            match self.search_issues(q).await {
                Ok(mut v) => out.append(&mut v),
                Err(e) => {
                    tracing::warn!(target: "ingest", error = ?e, query = %q, "github issue search failed");
                    last_err = Some(e);
                }
            }
            if self.include_discussions && self.token.is_some() {
                attempts += 1;
                match self.search_discussions(q).await {
                    Ok(mut v) => out.append(&mut v),
                    Err(e) => {
                        tracing::warn!(target: "ingest", error = ?e, query = %q, "github discussion search failed");
                        last_err = Some(e);
                    }
                }
            }
        }

        match last_err {
            Some(e) if out.is_empty() && attempts > 0 => Err(e),
            _ => Ok(out),
        }
    }

    fn name(&self) -> &'static str {
        "github"
    }
}
