//! API client for the debtor backend.
//!
//! Responses are validated at the boundary: anything that does not decode
//! into the expected type becomes `ApiError::InvalidResponse`.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::token;
use crate::models::{Debtor, NewPayment};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

const LOGIN_PATH: &str = "/api/auth/login";
const DEBTORS_PATH: &str = "/api/deudores";
const HISTORY_PATH: &str = "/api/deudores/historial";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Some deployments wrap the token in an object
#[derive(Deserialize)]
struct TokenEnvelope {
    token: String,
}

/// API client for the debtor backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client for the given base URL
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange credentials for a bearer token
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        if username.is_empty() || password.is_empty() {
            return Err(ApiError::MissingCredentials);
        }

        let url = self.url(LOGIN_PATH);
        debug!(url = %url, username = username, "Sending login request");

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let body = response.text().await?;
        parse_login_body(&body)
    }

    /// The token to send, refused locally once expired
    fn bearer(&self) -> Result<&str, ApiError> {
        match self.token.as_deref() {
            Some(token) if !token::is_expired(Some(token)) => Ok(token),
            _ => Err(ApiError::SessionExpired),
        }
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send an authenticated request, backing off on 429.
    async fn send<F>(&self, url: &str, build: F) -> Result<Response, ApiError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.bearer()?;
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build(&self.client).bearer_auth(token).send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
        let body = response.text().await?;
        decode_body(&body, url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.send(&url, |client| client.get(&url)).await?;
        Self::decode(response, &url).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.send(&url, |client| client.post(&url).json(body)).await?;
        Self::decode(response, &url).await
    }

    async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.send(&url, |client| client.put(&url).json(body)).await?;
        Self::decode(response, &url).await
    }

    // ===== Debtor Endpoints =====

    /// Fetch all debtors
    pub async fn fetch_debtors(&self) -> Result<Vec<Debtor>, ApiError> {
        self.get(DEBTORS_PATH).await
    }

    /// Fetch all debtors including their payment history
    pub async fn fetch_history(&self) -> Result<Vec<Debtor>, ApiError> {
        self.get(HISTORY_PATH).await
    }

    pub async fn create_debtor(&self, debtor: &Debtor) -> Result<Debtor, ApiError> {
        self.post(DEBTORS_PATH, debtor).await
    }

    pub async fn update_debtor(&self, id: i64, debtor: &Debtor) -> Result<Debtor, ApiError> {
        self.put(&format!("{}/{}", DEBTORS_PATH, id), debtor).await
    }

    pub async fn delete_debtor(&self, id: i64) -> Result<(), ApiError> {
        let url = self.url(&format!("{}/{}", DEBTORS_PATH, id));
        self.send(&url, |client| client.delete(&url)).await?;
        Ok(())
    }

    /// Record an installment payment, returning the updated debtor
    pub async fn pay_installment(&self, id: i64, amount: f64) -> Result<Debtor, ApiError> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(ApiError::BadRequest(format!("invalid payment amount: {}", amount)));
        }
        self.post(&format!("{}/{}/pagos", DEBTORS_PATH, id), &NewPayment { amount })
            .await
    }
}

/// Decode a JSON body, turning shape mismatches into `InvalidResponse`.
fn decode_body<T: DeserializeOwned>(body: &str, url: &str) -> Result<T, ApiError> {
    serde_json::from_str(body)
        .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
}

/// The login endpoint answers with the bare token, a JSON string, or
/// `{"token": ...}`. Anything that is not JWT-shaped is rejected.
fn parse_login_body(body: &str) -> Result<String, ApiError> {
    let body = body.trim();
    let token = if body.starts_with('"') {
        serde_json::from_str::<String>(body)
            .map_err(|e| ApiError::InvalidResponse(format!("login token: {}", e)))?
    } else if body.starts_with('{') {
        serde_json::from_str::<TokenEnvelope>(body)
            .map_err(|e| ApiError::InvalidResponse(format!("login token: {}", e)))?
            .token
    } else {
        body.to_string()
    };

    if token.split('.').count() != 3 {
        return Err(ApiError::InvalidResponse(
            "login response is not a bearer token".to_string(),
        ));
    }
    Ok(token)
}
