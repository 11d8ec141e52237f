//! Shared HTTP client and the GET step

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use thiserror::Error;
use tracing::debug;

use crate::config::LoadConfig;
use crate::runner::{ScenarioContext, StepError};

/// Lower bound for idle pooled connections per host
const MIN_POOL_SIZE: usize = 100;
/// Idle pooled connections are dropped after this long
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const USER_AGENT: &str = concat!("loadtester/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Build the client shared by every HTTP worker
pub fn build_client(config: &LoadConfig) -> Result<Client, HttpClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
        .default_headers(headers)
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(config.http_copies.max(MIN_POOL_SIZE))
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .gzip(true)
        .deflate(true)
        .build()
        .map_err(HttpClientError::Build)
}

/// Issue one GET and reduce it to an outcome.
///
/// 2xx is success. Other statuses, transport faults and cancellation are
/// returned as errors; nothing is retried.
pub async fn http_get(ctx: &ScenarioContext, client: &Client, url: &str) -> Result<(), StepError> {
    let result = ctx
        .cancellable(async {
            let response = client.get(url).send().await?;
            let status = response.status();
            // Drain the body so the connection goes back to the pool
            response.bytes().await?;
            if status.is_success() {
                Ok::<(), StepError>(())
            } else {
                Err(StepError::Status(status.as_u16()))
            }
        })
        .await
        .and_then(|outcome| outcome);

    if let Err(ref e) = result {
        debug!("GET {} failed: {}", url, e);
    }
    result
}
