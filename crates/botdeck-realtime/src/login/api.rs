use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ApiConfig;
use crate::login::state::LoginState;

/// One poll of the status endpoint.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct QrPayload {
    /// Pairing code; absent until the backend has generated one.
    pub qr: Option<String>,
    pub state: LoginState,
    pub status: String,
}

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("pairing request failed: {0}")]
    Request(String),
    #[error("pairing endpoint returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("pairing response could not be decoded: {0}")]
    Decode(String),
}

/// The handshake endpoints the login controller consumes but does not own.
#[async_trait]
pub trait PairingApi: Send + Sync + 'static {
    /// Ask the backend to begin a login attempt.
    async fn begin_login(&self) -> Result<(), PairingError>;

    /// Fetch the current pairing state.
    async fn poll_status(&self) -> Result<QrPayload, PairingError>;
}

/// Production client for the dashboard backend.
#[derive(Clone, Debug)]
pub struct HttpPairingApi {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpPairingApi {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, PairingError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PairingError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PairingApi for HttpPairingApi {
    async fn begin_login(&self) -> Result<(), PairingError> {
        let response = self
            .request(Method::POST, "/login/start")
            .send()
            .await
            .map_err(|err| PairingError::Request(err.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn poll_status(&self) -> Result<QrPayload, PairingError> {
        let response = self
            .request(Method::GET, "/login/status")
            .send()
            .await
            .map_err(|err| PairingError::Request(err.to_string()))?;
        Self::check(response)
            .await?
            .json::<QrPayload>()
            .await
            .map_err(|err| PairingError::Decode(err.to_string()))
    }
}
