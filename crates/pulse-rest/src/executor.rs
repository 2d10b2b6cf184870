//! Request executor
//!
//! Serializes each REST call through its rate limit bucket, performs the
//! HTTP exchange, feeds the response headers back to the bucket and
//! classifies the result. 502s are retried with a freshly locked bucket
//! up to the configured budget; 429s are retried for as long as the
//! server keeps asking, without consuming that budget.

use crate::error::RestError;
use crate::models::{ApiErrorBody, GatewayInfo, RateLimitEvent, TooManyRequests};
use crate::options::RequestOptions;
use crate::ratelimit::RateLimiter;
use bytes::Bytes;
use pulse_common::ClientConfig;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Rate-limited REST client for the Pulse API
pub struct RestClient {
    http: reqwest::Client,
    config: ClientConfig,
    limiter: Arc<RateLimiter>,
}

impl RestClient {
    /// Create a client from the given configuration
    pub fn new(config: ClientConfig) -> Result<Self, RestError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let limiter = Arc::new(RateLimiter::with_reset_margin(config.reset_margin));
        Ok(Self {
            http,
            config,
            limiter,
        })
    }

    /// The rate limiter backing this client
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The client configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Derive the bucket key for a path: the route without its query string
    #[must_use]
    pub fn bucket_key(path: &str) -> &str {
        path.split('?').next().unwrap_or(path)
    }

    /// GET a JSON resource
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestError> {
        let body = self
            .request(Method::GET, path, None, Self::bucket_key(path), RequestOptions::new())
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RestError> {
        let payload = serde_json::to_vec(body)?;
        let response = self
            .request(
                Method::POST,
                path,
                Some(payload),
                Self::bucket_key(path),
                RequestOptions::new(),
            )
            .await?;
        Ok(serde_json::from_slice(&response)?)
    }

    /// PATCH a JSON body and decode the JSON response
    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RestError> {
        let payload = serde_json::to_vec(body)?;
        let response = self
            .request(
                Method::PATCH,
                path,
                Some(payload),
                Self::bucket_key(path),
                RequestOptions::new(),
            )
            .await?;
        Ok(serde_json::from_slice(&response)?)
    }

    /// DELETE a resource
    pub async fn delete(&self, path: &str) -> Result<(), RestError> {
        self.request(
            Method::DELETE,
            path,
            None,
            Self::bucket_key(path),
            RequestOptions::new(),
        )
        .await?;
        Ok(())
    }

    /// Fetch the websocket gateway URL
    pub async fn gateway(&self) -> Result<String, RestError> {
        let info: GatewayInfo = self.get("/gateway").await?;
        Ok(info.url)
    }

    /// Make a request to the Pulse REST API.
    ///
    /// `path` is appended to the configured API base; `bucket_key` scopes
    /// the rate limit bucket (usually the path without query parameters,
    /// or a route template shared by several concrete paths).
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        bucket_key: &str,
        options: RequestOptions,
    ) -> Result<Bytes, RestError> {
        let url = format!("{}{}", self.config.api_base, path);

        let retry_on_rate_limit = options
            .retry_on_rate_limit
            .unwrap_or(self.config.retry_on_rate_limit);
        let max_retries = options.max_retries.unwrap_or(self.config.max_retries);
        let client = options.client.as_ref().unwrap_or(&self.http);

        let mut attempt: u32 = 0;
        loop {
            // Every attempt locks the bucket afresh; a released lock is
            // never reused.
            let lock = self.limiter.lock_bucket(bucket_key).await;

            let mut request = client.request(method.clone(), &url);
            if !self.config.token.is_empty() {
                request = request.header(AUTHORIZATION, &self.config.token);
            }
            request = request.header(USER_AGENT, &self.config.user_agent);
            if let Some(ref bytes) = body {
                request = request
                    .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                    .body(bytes.clone());
            }
            // Per-call options are applied last so they override defaults.
            for (name, value) in &options.headers {
                request = request.header(name, value);
            }
            if let Some(timeout) = options.timeout {
                request = request.timeout(timeout);
            }

            tracing::debug!(%method, %url, attempt, "API request");

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    // Transport failure: nothing to learn from headers,
                    // but the lock must still be freed.
                    lock.release(None)?;
                    return Err(RestError::Transport(e));
                }
            };

            let status = response.status();
            let headers = response.headers().clone();
            lock.release(Some(&headers))?;

            let response_body = response.bytes().await?;

            match status {
                StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
                    return Ok(response_body);
                }
                StatusCode::BAD_GATEWAY => {
                    if attempt < max_retries {
                        tracing::info!(%url, attempt, "Bad gateway, retrying");
                        attempt += 1;
                        continue;
                    }
                    return Err(RestError::RetriesExceeded {
                        url,
                        attempts: attempt,
                    });
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let limited: TooManyRequests = serde_json::from_slice(&response_body)?;
                    let retry_after = limited.retry_after();

                    self.limiter.notify(RateLimitEvent {
                        url: url.clone(),
                        bucket_key: bucket_key.to_string(),
                        message: limited.message.clone(),
                        retry_after,
                        global: limited.global,
                    });

                    if retry_on_rate_limit {
                        tracing::info!(%url, retry_after_ms = retry_after.as_millis() as u64, "Rate limited, retrying");
                        tokio::time::sleep(retry_after).await;
                        // 429 is a guaranteed-eventual-success path and
                        // does not count against the retry budget.
                        continue;
                    }
                    return Err(RestError::RateLimited {
                        url,
                        retry_after,
                        global: limited.global,
                    });
                }
                StatusCode::UNAUTHORIZED if !self.config.token.starts_with("Bot ") => {
                    tracing::warn!(%url, "Unauthorized; token is missing the \"Bot \" prefix");
                    return Err(RestError::InvalidAuthScheme);
                }
                _ => {
                    return Err(api_error(status, &response_body));
                }
            }
        }
    }
}

/// Build a structured API error from a non-2xx response, falling back to
/// the raw body when it does not decode.
fn api_error(status: StatusCode, body: &[u8]) -> RestError {
    match serde_json::from_slice::<ApiErrorBody>(body) {
        Ok(parsed) => RestError::Api {
            status: status.as_u16(),
            code: parsed.code,
            message: parsed
                .message
                .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned()),
        },
        Err(_) => RestError::Api {
            status: status.as_u16(),
            code: None,
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_key_strips_query() {
        assert_eq!(
            RestClient::bucket_key("/channels/1/messages?limit=50"),
            "/channels/1/messages"
        );
        assert_eq!(RestClient::bucket_key("/gateway"), "/gateway");
    }

    #[test]
    fn test_api_error_with_structured_body() {
        let err = api_error(
            StatusCode::NOT_FOUND,
            br#"{"code": 10003, "message": "Unknown channel"}"#,
        );
        match err {
            RestError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, Some(10003));
                assert_eq!(message, "Unknown channel");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_with_opaque_body() {
        let err = api_error(StatusCode::INTERNAL_SERVER_ERROR, b"<html>oops</html>");
        match err {
            RestError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 500);
                assert_eq!(code, None);
                assert!(message.contains("oops"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
