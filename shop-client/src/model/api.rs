//! Remote shop API client

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config;
use crate::model::auth::Credential;
use crate::model::totals::Totals;
use crate::model::users::{FieldErrors, Profile, Registration};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Credential rejected")]
    Unauthorized,
    #[error("Request rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("Invalid fields: {0}")]
    Validation(FieldErrors),
}

impl Error {
    /// Checks if the server refused the request as a client mistake (4xx)
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Unauthorized | Self::Validation(_) => true,
            Self::Rejected { status, .. } => status.is_client_error(),
            Self::Transport(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// HTTP client for the shop API
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    endpoints: config::Endpoints,
}

impl ApiClient {
    pub fn with_config(config: &config::Api) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            endpoints: config.endpoints.clone(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Exchanges user credentials for a bearer token
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Credential, Error> {
        let response = self
            .client
            .post(self.url(&self.endpoints.login))
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let LoginResponse { token } = check(response).await?.json().await?;
        debug!("Login accepted");
        Ok(Credential::new(token))
    }

    /// Fetches the profile of the user owning the credential
    #[instrument(skip_all)]
    pub async fn profile(&self, credential: &Credential) -> Result<Profile, Error> {
        let response = self
            .client
            .get(self.url(&self.endpoints.profile))
            .bearer_auth(credential.as_str())
            .send()
            .await?;

        check(response).await?.json().await.map_err(Into::into)
    }

    /// Fetches the financial totals of the user owning the credential
    #[instrument(skip_all)]
    pub async fn totals(&self, credential: &Credential) -> Result<Totals, Error> {
        let response = self
            .client
            .get(self.url(&self.endpoints.totals))
            .bearer_auth(credential.as_str())
            .send()
            .await?;

        check(response).await?.json().await.map_err(Into::into)
    }

    /// Creates a new account
    ///
    /// Field validation failures reported by the server are returned as `Error::Validation`.
    #[instrument(skip(self))]
    pub async fn register(&self, registration: &Registration) -> Result<(), Error> {
        let response = self
            .client
            .post(self.url(&self.endpoints.register))
            .json(registration)
            .send()
            .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await?;
            let errors = serde_json::from_str::<Value>(&body)
                .map(|body| FieldErrors::from_body(&body))
                .unwrap_or_default();

            if errors.is_empty() {
                return Err(Error::Rejected {
                    status: StatusCode::BAD_REQUEST,
                    body,
                });
            }
            return Err(Error::Validation(errors));
        }

        check(response).await?;
        Ok(())
    }
}

/// Turns non-success responses into errors
async fn check(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Unauthorized);
    }

    let body = response.text().await.unwrap_or_default();
    debug!(%status, body = %body, "Request rejected");
    Err(Error::Rejected { status, body })
}
