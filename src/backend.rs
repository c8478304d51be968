//! Exchange backend REST client.
//!
//! All routes are authenticated with a bearer token. Error responses are
//! parsed into [`ApiError`] and returned as [`ConvexError::Api`] so the
//! form layer can attach field messages to inputs.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::balance::AccountSource;
use crate::models::BearerToken;
use crate::models::response::ApiError;
use crate::models::staking::StakePosition;
use crate::models::user::UserProfile;
use crate::submit::{TradeBackend, TradeSubmission};
use crate::{ConvexError, Result};

/// Client for the exchange backend API.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<BearerToken>,
}

impl BackendClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, token: Option<BearerToken>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Builds the client from the loaded configuration.
    pub fn from_config(client: reqwest::Client, backend: &crate::config::BackendConfig) -> Self {
        Self::new(client, &backend.api_url, backend.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn token(&self) -> Result<&BearerToken> {
        self.token
            .as_ref()
            .ok_or_else(|| ConvexError::Config("no bearer token configured".to_string()))
    }

    /// Authenticated GET returning a typed body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token()?.expose())
            .header("Accept", "application/json")
            .send()
            .await?;
        let body = read_body(response).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Authenticated POST returning the raw success body.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<serde_json::Value> {
        let url = self.url(path);
        debug!(%url, "POST");
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token()?.expose())
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;
        read_body(response).await
    }

    /// The authenticated user's profile and balances.
    pub async fn profile(&self) -> Result<UserProfile> {
        self.get("user").await
    }

    /// The user's stakes.
    pub async fn stakes(&self) -> Result<Vec<StakePosition>> {
        self.get("stakes").await
    }
}

/// Returns the JSON body of a success response, or the backend's rejection.
async fn read_body(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let error = ApiError::from_body(status.as_u16(), &text);
        warn!(status = status.as_u16(), message = %error.message, "backend rejected request");
        return Err(ConvexError::Api(error));
    }

    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

impl AccountSource for BackendClient {
    async fn fetch_profile(&self) -> Result<UserProfile> {
        self.profile().await
    }
}

impl TradeBackend for BackendClient {
    async fn post_submission(&self, submission: &TradeSubmission) -> Result<serde_json::Value> {
        let path = submission.path();
        let body = submission.body()?;
        let result = self.post(&path, &body).await;
        if result.is_ok() {
            info!(kind = submission.kind(), %path, "submission accepted");
        }
        result
    }
}
