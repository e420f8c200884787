//! Shared HTTP plumbing for REST price sources.
//!
//! Wraps reqwest with a client-side quota and maps every transport or
//! protocol problem onto a [`FailureKind`], so adapters only deal with
//! decoding their own payloads.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::{FailureKind, SourceFailure, SourceId};

/// Maps a non-success HTTP status (plus body) to a failure kind.
pub type StatusClassifier = fn(StatusCode, &str) -> FailureKind;

/// Rate-limited JSON-over-HTTP client used by the source adapters.
pub struct HttpSourceClient {
    http: Client,
    /// Upper bound for one request; always clipped to the deadline.
    timeout: Duration,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl HttpSourceClient {
    pub fn new(timeout: Duration, requests_per_minute: Option<u32>) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(5)
            .user_agent(concat!("spot-price-aggregator/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let limiter = requests_per_minute
            .and_then(NonZeroU32::new)
            .map(|n| RateLimiter::direct(Quota::per_minute(n)));

        Ok(Self {
            http,
            timeout,
            limiter,
        })
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.http.get(url)
    }

    /// Fail fast with `RateLimited` when the local quota is exhausted.
    pub fn check_quota(&self, source: &SourceId) -> Result<(), SourceFailure> {
        match &self.limiter {
            Some(limiter) if limiter.check().is_err() => Err(SourceFailure::new(
                source.clone(),
                FailureKind::RateLimited,
                "client-side request quota exhausted",
            )),
            _ => Ok(()),
        }
    }

    /// Send `request` and decode a JSON body, finishing before `deadline`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        source: &SourceId,
        request: RequestBuilder,
        deadline: Instant,
        classify: StatusClassifier,
    ) -> Result<T, SourceFailure> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SourceFailure::timeout(source.clone(), "deadline elapsed before request"));
        }

        let response = request
            .timeout(remaining.min(self.timeout))
            .send()
            .await
            .map_err(|e| SourceFailure::new(source.clone(), classify_transport(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let kind = classify(status, &body);
            debug!(source = %source, status = %status, kind = %kind, "Source returned error status");
            return Err(SourceFailure::new(
                source.clone(),
                kind,
                format!("HTTP {status}: {}", truncate(&body, 200)),
            ));
        }

        response.json::<T>().await.map_err(|e| {
            SourceFailure::new(
                source.clone(),
                classify_transport(&e),
                format!("undecodable body: {e}"),
            )
        })
    }
}

/// Classify a reqwest error raised while sending or reading a response.
pub fn classify_transport(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_decode() {
        FailureKind::InvalidResponse
    } else {
        FailureKind::NetworkError
    }
}

/// Default status classification shared by all REST sources.
pub fn classify_status(status: StatusCode, _body: &str) -> FailureKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::IM_A_TEAPOT => FailureKind::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => FailureKind::Timeout,
        s if s.is_server_error() => FailureKind::NetworkError,
        _ => FailureKind::InvalidResponse,
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(end, _)| &text[..end])
}
