//! Rate-limited, retrying client for the code-host REST surface.
//!
//! List endpoints follow the `Link` header continuation until a page holds
//! nothing newer than the caller's `since`, bounded by a hard page cap.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{header, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use sentinel_common::config::GithubConfig;
use sentinel_common::time::parse_timestamp;
use sentinel_common::SentinelError;

use crate::models::{CommitItem, IssueItem, PullItem, ReleaseItem, RepoInfo};
use crate::rate_limit::TokenBucket;

pub const PER_PAGE: u32 = 50;

#[derive(Error, Debug)]
pub enum GithubError {
    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("platform rejected credentials")]
    Unauthorized,

    #[error("rate limit exhausted")]
    RateLimitExhausted,

    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),

    #[error("malformed platform response: {0}")]
    Malformed(String),
}

impl From<GithubError> for SentinelError {
    fn from(err: GithubError) -> Self {
        match err {
            GithubError::NotFound(r) => SentinelError::NotFound(r),
            GithubError::Unauthorized => {
                SentinelError::Unauthorized("platform token rejected".to_string())
            }
            GithubError::RateLimitExhausted => SentinelError::RateLimitExhausted,
            GithubError::TransientUpstream(m) => SentinelError::Upstream(m),
            GithubError::Malformed(m) => SentinelError::Upstream(m),
        }
    }
}

/// The platform surface the collector consumes. `GithubClient` is the real
/// implementation; tests substitute their own.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn get_repo(&self, repo_ref: &str) -> Result<RepoInfo, GithubError>;

    async fn list_commits(
        &self,
        repo_ref: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitItem>, GithubError>;

    async fn list_issues(
        &self,
        repo_ref: &str,
        since: DateTime<Utc>,
        states: &[String],
    ) -> Result<Vec<IssueItem>, GithubError>;

    async fn list_pulls(
        &self,
        repo_ref: &str,
        since_updated: DateTime<Utc>,
        states: &[String],
    ) -> Result<Vec<PullItem>, GithubError>;

    async fn list_releases(&self, repo_ref: &str, limit: u32)
        -> Result<Vec<ReleaseItem>, GithubError>;
}

pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    bucket: TokenBucket,
    retries: u32,
    base_delay: Duration,
    page_cap: u32,
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<Self, GithubError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static("repo-sentinel/0.3"),
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .map_err(|e| GithubError::TransientUpstream(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            bucket: TokenBucket::new(
                config.max_requests_per_hour,
                Duration::from_secs(config.rate_limit_wait_secs),
            ),
            retries: config.retries,
            base_delay: Duration::from_secs(config.delay_secs.max(1)),
            page_cap: config.page_cap.max(1),
        })
    }

    /// One HTTP GET with rate limiting and the retry policy: transient
    /// failures (network, 5xx, 429) back off exponentially with jitter,
    /// and a 429 `Retry-After` hint overrides the computed delay.
    async fn get_with_retry(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<Response, GithubError> {
        let mut attempt = 0u32;
        loop {
            self.bucket.acquire().await?;

            let mut request = self.http.get(url).query(query);
            if !self.token.is_empty() {
                request = request.header(header::AUTHORIZATION, format!("token {}", self.token));
            }

            let (reason, hint): (String, Option<Duration>) = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    match status {
                        StatusCode::NOT_FOUND => {
                            return Err(GithubError::NotFound(url.to_string()))
                        }
                        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                            return Err(GithubError::Unauthorized)
                        }
                        StatusCode::TOO_MANY_REQUESTS => {
                            (format!("429 from {url}"), retry_after(&response))
                        }
                        s if s.is_server_error() => (format!("{s} from {url}"), None),
                        s => {
                            return Err(GithubError::Malformed(format!(
                                "unexpected status {s} from {url}"
                            )))
                        }
                    }
                }
                Err(e) => (format!("request error: {e}"), None),
            };
            if attempt >= self.retries {
                return Err(GithubError::TransientUpstream(format!(
                    "{reason} (after {} attempts)",
                    attempt + 1
                )));
            }
            let delay = hint.unwrap_or_else(|| self.backoff(attempt));
            warn!(url, attempt, delay_ms = delay.as_millis() as u64, %reason, "retrying platform call");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay * 2u32.saturating_pow(attempt);
        let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis().max(2) as u64 / 2);
        base + Duration::from_millis(jitter_ms)
    }

    /// Walk the Link-header continuation, collecting items until a page has
    /// nothing at or past `since` (per `item_ts`), the feed ends, or the
    /// page cap is reached.
    async fn list_paged<T, F>(
        &self,
        path: &str,
        query: Vec<(String, String)>,
        since: Option<DateTime<Utc>>,
        item_ts: F,
    ) -> Result<Vec<T>, GithubError>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> Option<DateTime<Utc>>,
    {
        let mut url = format!("{}{}", self.base_url, path);
        let mut query = Some(query);
        let mut items = Vec::new();

        for page in 0..self.page_cap {
            let response = match &query {
                Some(q) => self.get_with_retry(&url, q).await?,
                None => self.get_with_retry(&url, &[]).await?,
            };
            let next = response
                .headers()
                .get(header::LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_link_next);

            let page_items: Vec<T> = response
                .json()
                .await
                .map_err(|e| GithubError::Malformed(e.to_string()))?;

            let exhausted = page_items.is_empty()
                || match since {
                    Some(since) => !page_items
                        .iter()
                        .any(|item| item_ts(item).map(|ts| ts >= since).unwrap_or(false)),
                    None => false,
                };
            items.extend(page_items);

            match next {
                Some(next_url) if !exhausted => {
                    debug!(page, next = %next_url, "following continuation");
                    url = next_url;
                    // The continuation URL already carries the query string.
                    query = None;
                }
                _ => break,
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl PlatformApi for GithubClient {
    #[instrument(skip(self))]
    async fn get_repo(&self, repo_ref: &str) -> Result<RepoInfo, GithubError> {
        let url = format!("{}/repos/{repo_ref}", self.base_url);
        let response = self.get_with_retry(&url, &[]).await?;
        response
            .json()
            .await
            .map_err(|e| GithubError::Malformed(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn list_commits(
        &self,
        repo_ref: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitItem>, GithubError> {
        let query = vec![
            ("since".to_string(), since.to_rfc3339()),
            ("per_page".to_string(), PER_PAGE.to_string()),
        ];
        self.list_paged(
            &format!("/repos/{repo_ref}/commits"),
            query,
            Some(since),
            |item: &CommitItem| parse_timestamp(&item.commit.author.date),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_issues(
        &self,
        repo_ref: &str,
        since: DateTime<Utc>,
        states: &[String],
    ) -> Result<Vec<IssueItem>, GithubError> {
        let state = states.first().map(String::as_str).unwrap_or("all");
        let query = vec![
            ("state".to_string(), state.to_string()),
            ("since".to_string(), since.to_rfc3339()),
            ("sort".to_string(), "updated".to_string()),
            ("per_page".to_string(), PER_PAGE.to_string()),
        ];
        let issues: Vec<IssueItem> = self
            .list_paged(
                &format!("/repos/{repo_ref}/issues"),
                query,
                Some(since),
                |item: &IssueItem| parse_timestamp(&item.updated_at),
            )
            .await?;
        // The issues feed also returns pull requests; those arrive via the
        // pulls listing instead.
        Ok(issues
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .collect())
    }

    #[instrument(skip(self))]
    async fn list_pulls(
        &self,
        repo_ref: &str,
        since_updated: DateTime<Utc>,
        states: &[String],
    ) -> Result<Vec<PullItem>, GithubError> {
        // No `since` parameter on this endpoint; sort by update time and cut
        // off client-side.
        let state = states.first().map(String::as_str).unwrap_or("all");
        let query = vec![
            ("state".to_string(), state.to_string()),
            ("sort".to_string(), "updated".to_string()),
            ("direction".to_string(), "desc".to_string()),
            ("per_page".to_string(), PER_PAGE.to_string()),
        ];
        let pulls: Vec<PullItem> = self
            .list_paged(
                &format!("/repos/{repo_ref}/pulls"),
                query,
                Some(since_updated),
                |item: &PullItem| parse_timestamp(&item.updated_at),
            )
            .await?;
        Ok(pulls
            .into_iter()
            .filter(|pull| {
                parse_timestamp(&pull.updated_at)
                    .map(|ts| ts >= since_updated)
                    .unwrap_or(false)
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn list_releases(
        &self,
        repo_ref: &str,
        limit: u32,
    ) -> Result<Vec<ReleaseItem>, GithubError> {
        let url = format!("{}/repos/{repo_ref}/releases", self.base_url);
        let query = vec![("per_page".to_string(), limit.to_string())];
        let response = self.get_with_retry(&url, &query).await?;
        response
            .json()
            .await
            .map_err(|e| GithubError::Malformed(e.to_string()))
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Extract the `rel="next"` target from a Link header.
pub fn parse_link_next(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if params.split(';').any(|p| p.trim() == r#"rel="next""#) {
            Some(target.trim().trim_start_matches('<').trim_end_matches('>').to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_header_next_is_extracted() {
        let link = r#"<https://api.example.com/repos/a/b/issues?page=2>; rel="next", <https://api.example.com/repos/a/b/issues?page=9>; rel="last""#;
        assert_eq!(
            parse_link_next(link).as_deref(),
            Some("https://api.example.com/repos/a/b/issues?page=2")
        );
    }

    #[test]
    fn link_header_without_next_yields_none() {
        let link = r#"<https://api.example.com/x?page=1>; rel="first", <https://api.example.com/x?page=9>; rel="last""#;
        assert_eq!(parse_link_next(link), None);
        assert_eq!(parse_link_next(""), None);
    }

    #[test]
    fn error_maps_into_common_taxonomy() {
        let err: SentinelError = GithubError::RateLimitExhausted.into();
        assert!(matches!(err, SentinelError::RateLimitExhausted));
        let err: SentinelError = GithubError::NotFound("acme/widget".to_string()).into();
        assert!(matches!(err, SentinelError::NotFound(_)));
        let err: SentinelError = GithubError::TransientUpstream("503".to_string()).into();
        assert!(err.is_transient());
    }
}
