// src/config/mod.rs
//! Application configuration.
//!
//! Resolution order:
//! 1) $FEED_CONFIG_PATH (must exist if set)
//! 2) config/feed.toml
//! 3) built-in defaults
//!
//! Secrets and deployment paths are then overridden from the environment
//! (`.env` is loaded by the binaries via dotenvy).

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::merge::DEFAULT_MAX_ITEMS;
use crate::store::{DEFAULT_CONVERSATION_CAP, DEFAULT_SEEN_CAP};

pub const ENV_CONFIG_PATH: &str = "FEED_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/feed.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedCfg,
    pub schedule: ScheduleCfg,
    pub twitter: TwitterCfg,
    pub reddit: RedditCfg,
    pub github: GithubCfg,
    pub notify: NotifyCfg,
    pub mirror: MirrorCfg,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedCfg {
    pub path: PathBuf,
    pub seen_path: PathBuf,
    pub max_items: usize,
    pub seen_cap: usize,
    pub conversation_cap: usize,
    /// Authors suppressed by the thread filter (e.g. our own account).
    pub excluded_authors: Vec<String>,
    pub content_max_chars: usize,
}

impl Default for FeedCfg {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/feed.json"),
            seen_path: PathBuf::from("data/seen.json"),
            max_items: DEFAULT_MAX_ITEMS,
            seen_cap: DEFAULT_SEEN_CAP,
            conversation_cap: DEFAULT_CONVERSATION_CAP,
            excluded_authors: Vec::new(),
            content_max_chars: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleCfg {
    pub interval_secs: u64,
    pub manual_cooldown_secs: u64,
    pub run_on_start: bool,
}

impl Default for ScheduleCfg {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            manual_cooldown_secs: 30,
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TwitterCfg {
    pub enabled: bool,
    pub search_terms: Vec<String>,
    pub max_items: u32,
    pub actor_id: String,
    /// "ENV" (or unset) means: read APIFY_TOKEN.
    pub api_token: Option<String>,
    pub max_wait_secs: u64,
}

impl Default for TwitterCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            search_terms: Vec::new(),
            max_items: 50,
            actor_id: "apidojo~tweet-scraper".to_string(),
            api_token: None,
            max_wait_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditCfg {
    pub enabled: bool,
    pub queries: Vec<String>,
    /// When non-empty, each query is searched inside each subreddit.
    pub subreddits: Vec<String>,
    pub limit: u32,
    pub user_agent: String,
}

impl Default for RedditCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            queries: Vec::new(),
            subreddits: Vec::new(),
            limit: 25,
            user_agent: format!("social-feed/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubCfg {
    pub enabled: bool,
    pub queries: Vec<String>,
    pub per_page: u32,
    pub token: Option<String>,
    /// Discussion search needs GraphQL, which needs a token.
    pub include_discussions: bool,
}

impl Default for GithubCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            queries: Vec::new(),
            per_page: 30,
            token: None,
            include_discussions: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyCfg {
    pub discord_webhook: Option<String>,
    pub slack_webhook: Option<String>,
    /// Newest admitted items announced per cycle; 0 disables the cap.
    pub max_per_cycle: usize,
}

impl Default for NotifyCfg {
    fn default() -> Self {
        Self {
            discord_webhook: None,
            slack_webhook: None,
            max_per_cycle: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MirrorCfg {
    /// Base URL of a PostgREST endpoint (e.g. `https://x.supabase.co/rest/v1`).
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub table: String,
}

impl Default for MirrorCfg {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            table: "posts".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from an explicit TOML path, then apply env overrides + sanitization.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading feed config from {}", path.display()))?;
        let cfg = Self::from_toml_str(&content)
            .with_context(|| format!("parsing feed config at {}", path.display()))?;
        Ok(cfg.finish())
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            return Self::load_from(&fallback);
        }
        tracing::info!("no feed config found; using built-in defaults");
        Ok(Self::default().finish())
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    fn finish(mut self) -> Self {
        self.apply_env();
        self.sanitize();
        self
    }

    fn apply_env(&mut self) {
        fn env_nonempty(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.trim().is_empty())
        }

        if let Some(p) = env_nonempty("FEED_PATH") {
            self.feed.path = PathBuf::from(p);
        }
        if let Some(p) = env_nonempty("SEEN_PATH") {
            self.feed.seen_path = PathBuf::from(p);
        }

        let wants_env = |v: &Option<String>| {
            v.as_deref()
                .map_or(true, |s| s.trim().eq_ignore_ascii_case("env"))
        };
        if wants_env(&self.twitter.api_token) {
            self.twitter.api_token = env_nonempty("APIFY_TOKEN");
        }
        if wants_env(&self.github.token) {
            self.github.token = env_nonempty("GITHUB_TOKEN");
        }

        if let Some(v) = env_nonempty("DISCORD_WEBHOOK_URL") {
            self.notify.discord_webhook = Some(v);
        }
        if let Some(v) = env_nonempty("SLACK_WEBHOOK_URL") {
            self.notify.slack_webhook = Some(v);
        }
        if let Some(v) = env_nonempty("MIRROR_URL") {
            self.mirror.url = Some(v);
        }
        if let Some(v) = env_nonempty("MIRROR_API_KEY") {
            self.mirror.api_key = Some(v);
        }
    }

    fn sanitize(&mut self) {
        let f = &mut self.feed;
        if f.max_items == 0 {
            f.max_items = DEFAULT_MAX_ITEMS;
        }
        if f.seen_cap == 0 {
            f.seen_cap = DEFAULT_SEEN_CAP;
        }
        if f.conversation_cap == 0 {
            f.conversation_cap = DEFAULT_CONVERSATION_CAP;
        }
        // The ledger must outlive the feed window.
        if f.seen_cap < f.max_items {
            f.seen_cap = f.max_items;
        }
        f.excluded_authors = clean_list(std::mem::take(&mut f.excluded_authors));

        if self.schedule.interval_secs == 0 {
            self.schedule.interval_secs = ScheduleCfg::default().interval_secs;
        }
        self.twitter.search_terms = clean_list(std::mem::take(&mut self.twitter.search_terms));
        self.reddit.queries = clean_list(std::mem::take(&mut self.reddit.queries));
        self.reddit.subreddits = clean_list(std::mem::take(&mut self.reddit.subreddits));
        self.github.queries = clean_list(std::mem::take(&mut self.github.queries));
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}
