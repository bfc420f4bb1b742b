//! HTTP client for the authentication backend.
//!
//! Captcha, login and register are public endpoints and are sent without
//! credentials. Every other request carries `Authorization: Bearer <token>`
//! when the caller has one.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::{header, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::models::{Captcha, LoginRequest, RegisterRequest, TokenResponse, User};
use crate::utils::mask_token;

use super::{ApiError, AuthBackend};

// ============================================================================
// Constants
// ============================================================================

const CAPTCHA_PATH: &str = "/api/captcha";
const LOGIN_PATH: &str = "/api/auth/login";
const REGISTER_PATH: &str = "/api/auth/register";
const ME_PATH: &str = "/api/auth/me";

/// API client for the auth backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn with_bearer(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) if !token.is_empty() => builder.bearer_auth(token),
            _ => builder,
        }
    }

    fn send_error(err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::NetworkError(err)
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await.map_err(Self::send_error)?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{} from {}", e, url)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(url = %url, token = %mask_token(token.unwrap_or_default()), "GET");

        let request = Self::with_bearer(self.client.get(&url), token)
            .header(header::ACCEPT, "application/json");
        let response = request.send().await.map_err(Self::send_error)?;
        let response = Self::check_response(response).await?;
        Self::parse(response, &url).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(url = %url, "POST");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(Self::send_error)?;
        let response = Self::check_response(response).await?;
        Self::parse(response, &url).await
    }

    // ===== Endpoints =====

    pub async fn fetch_captcha(&self) -> Result<Captcha, ApiError> {
        self.get(CAPTCHA_PATH, None).await
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<TokenResponse, ApiError> {
        self.post(LOGIN_PATH, request).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<TokenResponse, ApiError> {
        self.post(REGISTER_PATH, request).await
    }

    pub async fn fetch_me(&self, token: &str) -> Result<User, ApiError> {
        self.get(ME_PATH, Some(token)).await
    }
}

impl AuthBackend for ApiClient {
    fn captcha(&self) -> BoxFuture<'_, Result<Captcha, ApiError>> {
        self.fetch_captcha().boxed()
    }

    fn login<'a>(&'a self, request: &'a LoginRequest) -> BoxFuture<'a, Result<TokenResponse, ApiError>> {
        ApiClient::login(self, request).boxed()
    }

    fn register<'a>(
        &'a self,
        request: &'a RegisterRequest,
    ) -> BoxFuture<'a, Result<TokenResponse, ApiError>> {
        ApiClient::register(self, request).boxed()
    }

    fn me<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<User, ApiError>> {
        self.fetch_me(token).boxed()
    }

    fn fetch<'a>(
        &'a self,
        path: &'a str,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Value, ApiError>> {
        self.get::<Value>(path, token).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_url_joins_paths() {
        let api = client("http://localhost:3000/");
        assert_eq!(api.base_url(), "http://localhost:3000");
        assert_eq!(api.url(ME_PATH), "http://localhost:3000/api/auth/me");
        assert_eq!(api.url("api/items"), "http://localhost:3000/api/items");
    }

    #[test]
    fn test_bearer_header_only_with_token() {
        let api = client("http://localhost:3000");

        let with = ApiClient::with_bearer(api.client.get(api.url(ME_PATH)), Some("abc"))
            .build()
            .unwrap();
        assert_eq!(with.headers()[header::AUTHORIZATION], "Bearer abc");

        let without = ApiClient::with_bearer(api.client.get(api.url(CAPTCHA_PATH)), Some(""))
            .build()
            .unwrap();
        assert!(without.headers().get(header::AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        // Port 9 (discard) on localhost is closed on test machines.
        let api = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = api.fetch_me("abc").await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err:?}");
    }
}
