//! HTTP client + persistence seams for the Campo sheet sync.

use std::time::Duration;

use anyhow::Context;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

pub mod store;

pub use reqwest::Url;
pub use store::{MemoryProgramStore, PgProgramStore, ProgramStore, StoreError};

pub const CRATE_NAME: &str = "campo-storage";

/// Longest slice of an error response body kept in [`HttpError::HttpStatus`].
const ERROR_BODY_LIMIT: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

/// Retry budget for transient failures. The default budget is zero: a sync run
/// surfaces the first failure instead of retrying behind the caller's back.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}: {body}")]
    HttpStatus { status: u16, url: String, body: String },
    #[error("invalid response body from {url}: {message}")]
    Decode { url: String, message: String },
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Request(err) => err.status().map(|s| s.as_u16()),
            Self::Decode { .. } => None,
        }
    }
}

/// Thin JSON-over-HTTP client shared by the token exchange and the range reader.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    backoff: BackoffPolicy,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            backoff: config.backoff,
        })
    }

    /// GET `url` with an optional bearer token and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        bearer: Option<&str>,
    ) -> Result<T, HttpError> {
        let body = self
            .execute(Method::GET, url.clone(), |req| match bearer {
                Some(token) => req.bearer_auth(token),
                None => req,
            })
            .await?;
        decode_json(&url, &body)
    }

    /// POST an `application/x-www-form-urlencoded` body and decode the JSON reply.
    pub async fn post_form_json<T: DeserializeOwned>(
        &self,
        url: Url,
        form: &[(&str, &str)],
    ) -> Result<T, HttpError> {
        let body = self
            .execute(Method::POST, url.clone(), |req| req.form(form))
            .await?;
        decode_json(&url, &body)
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        prepare: impl Fn(RequestBuilder) -> RequestBuilder,
    ) -> Result<Vec<u8>, HttpError> {
        let span = info_span!("http_request", %method, host = url.host_str().unwrap_or_default());
        async move {
            let mut attempt = 0usize;
            loop {
                let request = prepare(self.client.request(method.clone(), url.clone()));
                match request.send().await {
                    Ok(resp) => {
                        let status = resp.status();
                        let final_url = resp.url().to_string();

                        if status.is_success() {
                            let body = resp.bytes().await?.to_vec();
                            debug!(status = status.as_u16(), bytes = body.len(), "http response");
                            return Ok(body);
                        }

                        if classify_status(status) == RetryDisposition::Retryable
                            && attempt < self.backoff.max_retries
                        {
                            tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                            attempt += 1;
                            continue;
                        }

                        let body = resp.text().await.unwrap_or_default();
                        return Err(HttpError::HttpStatus {
                            status: status.as_u16(),
                            url: final_url,
                            body: truncate_body(&body),
                        });
                    }
                    Err(err) => {
                        if classify_reqwest_error(&err) == RetryDisposition::Retryable
                            && attempt < self.backoff.max_retries
                        {
                            tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                            attempt += 1;
                            continue;
                        }
                        return Err(HttpError::Request(err));
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn decode_json<T: DeserializeOwned>(url: &Url, body: &[u8]) -> Result<T, HttpError> {
    serde_json::from_slice(body).map_err(|e| HttpError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
