use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{
    header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, LOCATION, RETRY_AFTER},
    redirect, Client, StatusCode,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::domain::models::FeedCache;
use crate::infrastructure::ssrf::{self, Mode, UrlError};

/// 10 MiB, per spec: bodies larger than this are rejected rather than
/// buffered in full.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const MAX_REDIRECTS: u32 = 5;
const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("URL scheme not allowed: {0}")]
    InvalidScheme(String),
    #[error("URL resolves to a private or loopback address")]
    PrivateIp,
    #[error("too many redirects (limit {MAX_REDIRECTS})")]
    TooManyRedirects,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("response body exceeds the {MAX_BODY_BYTES}-byte limit")]
    MaxSizeExceeded,
    #[error("unexpected HTTP status {status}")]
    HttpStatus {
        status: StatusCode,
        retry_after: Duration,
    },
    #[error("fetch cancelled")]
    Cancelled,
    #[error("exceeded {attempts} attempt(s), last error: {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl From<UrlError> for FetchError {
    fn from(e: UrlError) -> Self {
        match e {
            UrlError::InvalidUrl(m) => FetchError::InvalidUrl(m),
            UrlError::InvalidScheme(s) => FetchError::InvalidScheme(s),
            UrlError::PrivateIp => FetchError::PrivateIp,
        }
    }
}

impl FetchError {
    /// Never-retry classification per spec §4.2/§7.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::InvalidUrl(_)
            | FetchError::InvalidScheme(_)
            | FetchError::PrivateIp
            | FetchError::MaxSizeExceeded
            | FetchError::TooManyRedirects
            | FetchError::Cancelled
            | FetchError::MaxRetriesExceeded { .. } => false,
            FetchError::Transport(_) => true,
            FetchError::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

/// Outcome of a single fetch attempt.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub body: Vec<u8>,
    pub status: StatusCode,
    pub not_modified: bool,
    pub new_cache: FeedCache,
    pub final_url: String,
    pub permanent_redirect: bool,
    pub fetched_at: DateTime<Utc>,
    pub retry_after: Duration,
}

pub struct Fetcher {
    client: Client,
    mode: Mode,
}

impl Fetcher {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        Self::with_mode(user_agent, Mode::Strict)
    }

    /// Build a fetcher in [`Mode::Relaxed`], used only by integration tests
    /// that point at a local mock server.
    pub fn relaxed(user_agent: &str) -> Result<Self, FetchError> {
        Self::with_mode(user_agent, Mode::Relaxed)
    }

    fn with_mode(user_agent: &str, mode: Mode) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(redirect::Policy::none())
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, mode })
    }

    /// Perform one conditional GET, following up to [`MAX_REDIRECTS`]
    /// redirects manually so the permanent-redirect flag and final URL can
    /// be tracked precisely and each hop can be re-validated against the
    /// SSRF guard (defense against a redirect to a private address).
    pub async fn fetch(
        &self,
        url: &str,
        cache: &FeedCache,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError> {
        ssrf::validate_url(url, self.mode)?;

        let mut current = url.to_string();
        let mut permanent_redirect = false;

        for hop in 0..=MAX_REDIRECTS {
            if hop > 0 {
                ssrf::validate_url(&current, self.mode)?;
            }

            let mut req = self.client.get(&current);
            if let Some(etag) = &cache.etag {
                req = req.header(IF_NONE_MATCH, etag.as_str());
            }
            if let Some(last_modified) = &cache.last_modified {
                req = req.header(IF_MODIFIED_SINCE, last_modified.as_str());
            }

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = req.send() => result?,
            };

            let status = response.status();

            if status.is_redirection() {
                if hop == MAX_REDIRECTS {
                    return Err(FetchError::TooManyRedirects);
                }
                if matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::PERMANENT_REDIRECT)
                {
                    permanent_redirect = true;
                }
                let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                else {
                    return Err(FetchError::InvalidUrl(
                        "redirect response missing Location header".to_string(),
                    ));
                };
                let base = Url::parse(&current)
                    .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
                let next = base
                    .join(&location)
                    .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
                current = next.to_string();
                continue;
            }

            let fetched_at = Utc::now();

            if status == StatusCode::NOT_MODIFIED {
                return Ok(FetchResponse {
                    body: Vec::new(),
                    status,
                    not_modified: true,
                    new_cache: FeedCache {
                        etag: cache.etag.clone(),
                        last_modified: cache.last_modified.clone(),
                        last_fetched: Some(fetched_at),
                    },
                    final_url: current,
                    permanent_redirect,
                    fetched_at,
                    retry_after: Duration::ZERO,
                });
            }

            if !status.is_success() {
                let retry_after = parse_retry_after(
                    response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()),
                    fetched_at,
                );
                let retry_after = if matches!(status, StatusCode::TOO_MANY_REQUESTS)
                    || status == StatusCode::SERVICE_UNAVAILABLE
                {
                    retry_after
                } else {
                    Duration::ZERO
                };
                return Err(FetchError::HttpStatus { status, retry_after });
            }

            let new_etag = response
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let new_last_modified = response
                .headers()
                .get(LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .map(String::from);

            let body = read_body_capped(response, cancel).await?;

            return Ok(FetchResponse {
                body,
                status,
                not_modified: false,
                new_cache: FeedCache {
                    etag: new_etag,
                    last_modified: new_last_modified,
                    last_fetched: Some(fetched_at),
                },
                final_url: current,
                permanent_redirect,
                fetched_at,
                retry_after: Duration::ZERO,
            });
        }

        Err(FetchError::TooManyRedirects)
    }

    /// Retry wrapper per spec §4.2: up to `max_attempts + 1` total attempts,
    /// honoring `Retry-After` (capped) or exponential backoff with jitter
    /// between them.
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        cache: &FeedCache,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch(url, cache, cancel).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < max_attempts && err.is_retryable() => {
                    let wait = backoff_for(&err, attempt);
                    attempt += 1;
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                // A retryable failure on the very first attempt with
                // max_attempts = 0 never entered the retry loop above, so it
                // is reported exactly as a bare `fetch` would report it,
                // per spec §8's zero-attempt boundary case.
                Err(err) if err.is_retryable() && attempt == 0 => return Err(err),
                Err(err) if err.is_retryable() => {
                    return Err(FetchError::MaxRetriesExceeded {
                        attempts: attempt + 1,
                        source: Box::new(err),
                    })
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn backoff_for(err: &FetchError, attempt: u32) -> Duration {
    if let FetchError::HttpStatus { retry_after, .. } = err {
        if *retry_after > Duration::ZERO {
            return (*retry_after).min(MAX_RETRY_AFTER);
        }
    }
    let base_secs = 2u64.saturating_pow(attempt);
    let jitter = rand::thread_rng().gen_range(-0.1..=0.1);
    let secs = (base_secs as f64) * (1.0 + jitter);
    Duration::from_secs_f64(secs.max(0.0))
}

/// Parse a `Retry-After` header value: either delay-seconds (strictly
/// positive integer, capped at 86400) or an HTTP-date. Anything unparseable,
/// zero, negative, or in the past yields `Duration::ZERO`.
fn parse_retry_after(value: Option<&str>, now: DateTime<Utc>) -> Duration {
    let Some(value) = value else {
        return Duration::ZERO;
    };
    let value = value.trim();

    if let Ok(secs) = value.parse::<i64>() {
        return if secs > 0 && secs <= 86_400 {
            Duration::from_secs(secs as u64)
        } else {
            Duration::ZERO
        };
    }

    match DateTime::parse_from_rfc2822(value) {
        Ok(date) => {
            let date = date.with_timezone(&Utc);
            if date > now {
                (date - now).to_std().unwrap_or(Duration::ZERO)
            } else {
                Duration::ZERO
            }
        }
        Err(_) => Duration::ZERO,
    }
}

async fn read_body_capped(
    response: reqwest::Response,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, FetchError> {
    use futures::StreamExt;

    let mut stream = response.bytes_stream();
    let mut body = Vec::new();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk?;
        body.extend_from_slice(&chunk);
        if body.len() > MAX_BODY_BYTES {
            return Err(FetchError::MaxSizeExceeded);
        }
    }

    Ok(body)
}
