//! Minimal Apify REST client: start an actor run, long-poll until it finishes,
//! read the default dataset.

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const BASE_URL: &str = "https://api.apify.com/v2";

#[derive(Debug, Error)]
pub enum ApifyError {
    #[error("apify request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("apify API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("apify run ended with status {0}")]
    RunFailed(String),
    #[error("apify run {run_id} still {status} after {waited_secs}s")]
    Timeout {
        run_id: String,
        status: String,
        waited_secs: u64,
    },
}

pub type Result<T> = std::result::Result<T, ApifyError>;

#[derive(Debug, Clone, Deserialize)]
struct ApiResponse<T> {
    data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
}

#[derive(Clone)]
pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
    max_wait: Duration,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
            max_wait: Duration::from_secs(300),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    async fn check<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(resp.json().await?)
    }

    /// Start an actor run. Returns immediately with run metadata.
    pub async fn start_run<I: Serialize + ?Sized>(&self, actor_id: &str, input: &I) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs", self.base_url, actor_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;
        let api: ApiResponse<RunData> = Self::check(resp).await?;
        Ok(api.data)
    }

    /// Poll until a run completes. Uses `waitForFinish=60` for long-polling and
    /// gives up after `max_wait`.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        let started = Instant::now();
        loop {
            let url = format!("{}/actor-runs/{}?waitForFinish=60", self.base_url, run_id);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;
            let api: ApiResponse<RunData> = Self::check(resp).await?;
            match api.data.status.as_str() {
                "SUCCEEDED" => return Ok(api.data),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(ApifyError::RunFailed(api.data.status.clone()));
                }
                other => {
                    if started.elapsed() >= self.max_wait {
                        return Err(ApifyError::Timeout {
                            run_id: run_id.to_string(),
                            status: other.to_string(),
                            waited_secs: started.elapsed().as_secs(),
                        });
                    }
                    tracing::debug!(run_id, status = %other, "apify run still in progress");
                }
            }
        }
    }

    /// Fetch dataset items from a completed run.
    pub async fn dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let url = format!("{}/datasets/{}/items?format=json&clean=true", self.base_url, dataset_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(resp).await
    }

    /// Start, poll, fetch.
    pub async fn run_actor<I, T>(&self, actor_id: &str, input: &I) -> Result<Vec<T>>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let run = self.start_run(actor_id, input).await?;
        tracing::info!(actor_id, run_id = %run.id, "apify run started, polling for completion");

        let done = self.wait_for_run(&run.id).await?;
        tracing::debug!(run_id = %done.id, dataset_id = %done.default_dataset_id, "apify run completed");

        self.dataset_items(&done.default_dataset_id).await
    }
}
