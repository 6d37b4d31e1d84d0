use reqwest::{ClientBuilder, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::builtin_roles::BuiltInRolesApi;
use super::error::ApiError;
use super::policies::PoliciesApi;
use super::roles::RolesApi;
use super::users::UsersApi;

const ORG_ID_HEADER: &str = "X-Grafana-Org-Id";

/// Grafana HTTP API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: String,
    auth: Auth,
    org_id: i64,
    retry_config: RetryConfig,
}

enum Auth {
    Basic { username: String, password: String },
    Bearer(String),
}

impl Auth {
    /// `user:password` selects basic auth, anything else is an API key
    fn parse(auth: &str) -> Self {
        match auth.split_once(':') {
            Some((username, password)) => Auth::Basic {
                username: username.to_string(),
                password: password.to_string(),
            },
            None => Auth::Bearer(auth.to_string()),
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::Bearer(token) => request.bearer_auth(token),
        }
    }
}

/// Connection settings resolved from the provider block
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub auth: String,
    pub org_id: i64,
    pub retries: u32,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth: String::new(),
            org_id: 1,
            retries: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            timeout_seconds: 30,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff before retry `attempt` (1-based), capped at `max_backoff_ms`
    fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl Client {
    /// Create a client whose retry budget comes from `config.retries`
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let retry_config = RetryConfig {
            max_retries: config.retries,
            timeout_seconds: config.timeout.as_secs(),
            ..Default::default()
        };
        Self::with_retry_config(config, retry_config)
    }

    /// Create a client with custom backoff settings
    pub fn with_retry_config(
        config: ClientConfig,
        retry_config: RetryConfig,
    ) -> Result<Self, ApiError> {
        let parsed = url::Url::parse(&config.url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", config.url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ApiError::InvalidUrl(format!(
                "{}: unsupported scheme '{}'",
                config.url,
                parsed.scheme()
            )));
        }

        let http_client = ClientBuilder::new().timeout(config.timeout).build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                base_url: config.url.trim_end_matches('/').to_string(),
                auth: Auth::parse(&config.auth),
                org_id: config.org_id,
                retry_config,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn org_id(&self) -> i64 {
        self.inner.org_id
    }

    /// Access control policy operations
    pub fn policies(&self) -> PoliciesApi<'_> {
        PoliciesApi::new(self)
    }

    /// Custom role operations
    pub fn roles(&self) -> RolesApi<'_> {
        RolesApi::new(self)
    }

    /// Built-in role assignment operations
    pub fn builtin_roles(&self) -> BuiltInRolesApi<'_> {
        BuiltInRolesApi::new(self)
    }

    /// User and user role operations
    pub fn users(&self) -> UsersApi<'_> {
        UsersApi::new(self)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.inner.base_url, path);
        tracing::debug!("{} request to: {}", method, url);

        let mut request = self.inner.http_client.request(method, &url);
        if self.inner.org_id > 0 {
            request = request.header(ORG_ID_HEADER, self.inner.org_id.to_string());
        }
        self.inner.auth.apply(request)
    }

    /// Execute a GET request with retry logic
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute_with_retry(|| self.request(Method::GET, path).send(), path, true).await
    }

    /// Execute a POST request with retry logic; a timed out POST is not resent
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_with_retry(
            || self.request(Method::POST, path).json(body).send(),
            path,
            false,
        )
        .await
    }

    /// Execute a PUT request with retry logic
    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_with_retry(
            || self.request(Method::PUT, path).json(body).send(),
            path,
            true,
        )
        .await
    }

    /// Execute a DELETE request with retry logic
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute_with_retry(|| self.request(Method::DELETE, path).send(), path, true).await
    }

    /// Execute request with retry logic
    ///
    /// Non-idempotent requests are not retried after a timeout.
    async fn execute_with_retry<F, Fut, T>(
        &self,
        request_fn: F,
        path: &str,
        idempotent: bool,
    ) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
        T: DeserializeOwned,
    {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt <= self.inner.retry_config.max_retries {
            if attempt > 0 {
                let backoff = self.inner.retry_config.backoff_ms(attempt);
                tracing::debug!(
                    "Retrying request to {} after {}ms (attempt {})",
                    path,
                    backoff,
                    attempt
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            match request_fn().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return self.parse_success_response(response).await;
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(ApiError::Auth);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(ApiError::RateLimited);
                    } else if status.is_server_error() {
                        last_error = Some(ApiError::ServiceUnavailable);
                    } else {
                        return self.handle_error_response(response).await;
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        let timeout = ApiError::Timeout(self.inner.retry_config.timeout_seconds);
                        if !idempotent {
                            return Err(timeout);
                        }
                        last_error = Some(timeout);
                    } else if e.is_connect() {
                        last_error = Some(ApiError::ServiceUnavailable);
                    } else {
                        return Err(ApiError::Request(e));
                    }
                }
            }

            attempt += 1;
        }

        Err(last_error.unwrap_or(ApiError::ServiceUnavailable))
    }

    /// Parse successful response; an empty body reads as JSON null
    async fn parse_success_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        tracing::debug!("API response body: {}", text);

        let body = if text.trim().is_empty() {
            "null"
        } else {
            text.as_str()
        };

        serde_json::from_str::<T>(body).map_err(|e| {
            tracing::error!("Failed to deserialize response: {}, body: {}", e, text);
            ApiError::Parse(format!("Failed to parse response: {}", e))
        })
    }

    /// Handle error response
    async fn handle_error_response<T>(&self, response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let message = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => body.message,
            Err(_) => text,
        };

        Err(ApiError::Api { status, message })
    }
}
