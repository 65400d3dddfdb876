use crate::{Error, Result};
use farmsteam_types::{Document, ReferralOutcome};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

/// Retry behavior for transient failures.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Also retry POST requests. Safe against this backend: saves resend
    /// the complete document and referral registration is idempotent.
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            retry_non_idempotent: false,
        }
    }
}

fn retryable_status(status: reqwest::StatusCode) -> bool {
    matches!(
        status,
        reqwest::StatusCode::REQUEST_TIMEOUT
            | reqwest::StatusCode::TOO_MANY_REQUESTS
            | reqwest::StatusCode::BAD_GATEWAY
            | reqwest::StatusCode::SERVICE_UNAVAILABLE
            | reqwest::StatusCode::GATEWAY_TIMEOUT
    )
}

#[derive(Serialize)]
struct SaveStateRequest<'a> {
    user_id: &'a str,
    state: &'a Document,
}

#[derive(Serialize)]
struct ReferralRequest<'a> {
    referrer_id: &'a str,
    friend_id: &'a str,
}

#[derive(Deserialize)]
struct SaveStateResponse {
    ok: bool,
}

#[derive(Deserialize)]
struct ReferralRegistration {
    ok: bool,
    already: Option<bool>,
    bonus: Option<u64>,
}

/// HTTP client for the FarmSteam backend.
pub struct Client {
    pub base_url: Url,
    inner: reqwest::Client,
    retry_policy: RetryPolicy,
}

impl Client {
    /// Create a client for the backend at `base_url` (http or https).
    pub fn new(base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url)?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(Error::InvalidScheme(scheme.to_string())),
        }
        Ok(Self {
            base_url: url,
            inner: reqwest::Client::new(),
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Replace the default retry policy.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Merged state for a user. The backend fills unset fields from its
    /// baseline template, so the result always carries the full field set.
    pub async fn get_state(&self, user_id: &str) -> Result<Document> {
        let url = self.base_url.join(&format!("state/{user_id}"))?;
        let response = self.get_with_retry(url).await?;
        Ok(response.json().await?)
    }

    /// Store a complete save document for a user, replacing any prior save.
    pub async fn save_state(&self, user_id: &str, state: &Document) -> Result<()> {
        let url = self.base_url.join("state")?;
        let response = self
            .post_json_with_retry(url, &SaveStateRequest { user_id, state })
            .await?;
        let body: SaveStateResponse = response.json().await?;
        if !body.ok {
            return Err(Error::UnexpectedResponse);
        }
        Ok(())
    }

    /// Register a referral. Both parties receive the coin bonus when the
    /// friend has not been referred before.
    pub async fn register_referral(
        &self,
        referrer_id: &str,
        friend_id: &str,
    ) -> Result<ReferralOutcome> {
        let url = self.base_url.join("referral/register")?;
        let response = self
            .post_json_with_retry(
                url,
                &ReferralRequest {
                    referrer_id,
                    friend_id,
                },
            )
            .await?;
        let body: ReferralRegistration = response.json().await?;
        match body {
            ReferralRegistration {
                ok: true,
                already: Some(true),
                ..
            } => Ok(ReferralOutcome::AlreadyRegistered),
            ReferralRegistration {
                ok: true,
                bonus: Some(bonus),
                ..
            } => Ok(ReferralOutcome::Registered { bonus }),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Liveness check against the backend.
    pub async fn healthz(&self) -> Result<()> {
        let url = self.base_url.join("healthz")?;
        self.get_with_retry(url).await?;
        Ok(())
    }

    pub(crate) async fn get_with_retry(&self, url: Url) -> Result<reqwest::Response> {
        self.send_with_retry("GET", &url, true, || self.inner.get(url.clone()))
            .await
    }

    pub(crate) async fn post_json_with_retry<T: Serialize>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<reqwest::Response> {
        let retry_allowed = self.retry_policy.retry_non_idempotent;
        self.send_with_retry("POST", &url, retry_allowed, || {
            self.inner.post(url.clone()).json(body)
        })
        .await
    }

    async fn send_with_retry(
        &self,
        method: &'static str,
        url: &Url,
        retry_allowed: bool,
        make: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        let mut backoff = self.retry_policy.initial_backoff;
        loop {
            attempt += 1;
            match make().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if retry_allowed
                        && retryable_status(status)
                        && attempt < self.retry_policy.max_attempts
                    {
                        tracing::debug!(%url, %status, attempt, "retrying request");
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(self.retry_policy.max_backoff);
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::FailedWithBody {
                        status,
                        body: format!("{method} {url}: {body}"),
                    });
                }
                Err(err) => {
                    if retry_allowed && err.is_connect() && attempt < self.retry_policy.max_attempts
                    {
                        tracing::debug!(%url, %err, attempt, "retrying after connect error");
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(self.retry_policy.max_backoff);
                        continue;
                    }
                    return Err(Error::Reqwest(err));
                }
            }
        }
    }
}
