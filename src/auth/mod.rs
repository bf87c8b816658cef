//! Account sign-in against the backend.
//!
//! The backend hands out the bearer token. A successful sign-in stores the
//! token and the account name, which switches the remote source to the
//! account-scoped endpoints.

use crate::error::ApiError;
use crate::session::DEFAULT_GOAL_HOURS;
use crate::store::{AUTH_TOKEN_KEY, KeyValueStore, USERNAME_KEY};
use crate::transport::{RequestOptions, TransportClient};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

const LOGIN_PATH: &str = "/api/users/login-or-create";
const CREATE_PATH: &str = "/api/users";

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: Account,
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    /// Numeric on some backend versions, a string on others.
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

pub struct AuthClient {
    transport: Arc<TransportClient>,
    store: Arc<dyn KeyValueStore>,
}

impl AuthClient {
    pub fn new(transport: Arc<TransportClient>, store: Arc<dyn KeyValueStore>) -> Self {
        Self { transport, store }
    }

    /// Sign in, creating the account when the backend does not know it.
    ///
    /// Only a rejected sign-in falls through to account creation; when the
    /// backend is unreachable the failure is returned as is.
    pub async fn login_or_create(
        &self,
        username: &str,
        email: Option<&str>,
    ) -> Result<AuthResponse> {
        let request = LoginRequest {
            username: username.trim().to_string(),
            email: email.map(str::trim).filter(|e| !e.is_empty()).map(String::from),
        };
        if request.username.is_empty() {
            bail!("account name must not be empty");
        }

        let response = match self.login(&request).await {
            Ok(response) => response,
            Err(e) if e.is_transient() => return Err(e.into()),
            Err(e) => {
                tracing::info!(
                    username = %request.username,
                    error = %e,
                    "Sign-in rejected, creating account"
                );
                self.create(&request).await?
            }
        };

        if response.token.trim().is_empty() {
            return Err(ApiError::Decode("sign-in response carried no token".into()).into());
        }
        self.remember(&response.token, &response.user.username)?;
        tracing::info!(username = %response.user.username, "Signed in");
        Ok(response)
    }

    /// Store a token obtained elsewhere, optionally with its account name.
    pub fn store_token(&self, token: &str, username: Option<&str>) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            bail!("token must not be empty");
        }
        self.store
            .set(AUTH_TOKEN_KEY, token)
            .context("Failed to store token")?;
        match username.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => self
                .store
                .set(USERNAME_KEY, name)
                .context("Failed to store account name"),
            None => self.store.remove(USERNAME_KEY),
        }
    }

    pub fn logout(&self) -> Result<()> {
        self.store.remove(AUTH_TOKEN_KEY)?;
        self.store.remove(USERNAME_KEY)
    }

    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let body = serde_json::to_value(request).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.transport
            .post(LOGIN_PATH, Some(body), &RequestOptions::default())
            .await
    }

    async fn create(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let mut body =
            serde_json::to_value(request).map_err(|e| ApiError::Decode(e.to_string()))?;
        body["preferences"] = serde_json::json!({
            "fastingDefaults": { "defaultGoalHours": DEFAULT_GOAL_HOURS }
        });
        self.transport
            .post(CREATE_PATH, Some(body), &RequestOptions::default())
            .await
    }

    fn remember(&self, token: &str, username: &str) -> Result<()> {
        self.store
            .set(AUTH_TOKEN_KEY, token)
            .context("Failed to store token")?;
        self.store
            .set(USERNAME_KEY, username)
            .context("Failed to store account name")
    }
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(n) => n.to_string(),
    })
}
