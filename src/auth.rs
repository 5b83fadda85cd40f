//! Client-credential authentication against the identity provider

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::GraphConfig;
use crate::error::{CheckerError, Result};

/// Token endpoint response for the client-credential grant
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Read the client secret from disk, dropping any CR/LF characters
pub async fn read_client_secret(path: &Path) -> Result<String> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        CheckerError::Auth(format!("Failed to read client secret from {:?}: {}", path, e))
    })?;

    let secret: String = raw.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    if secret.is_empty() {
        return Err(CheckerError::Auth(format!(
            "Client secret file {:?} is empty",
            path
        )));
    }
    Ok(secret)
}

/// Acquires application tokens with the OAuth2 client-credential flow.
///
/// The secret file is read on every acquisition so a rotated secret is picked
/// up at the next refresh.
pub struct Authenticator {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    scope: String,
    secret_file: PathBuf,
}

impl Authenticator {
    pub fn new(http: reqwest::Client, config: &GraphConfig) -> Self {
        Self {
            http,
            token_url: config.token_url(),
            client_id: config.client_id.clone(),
            scope: config.scope(),
            secret_file: config.secret_file.clone(),
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Request a fresh access token
    pub async fn acquire_token(&self) -> Result<AccessToken> {
        let secret = read_client_secret(&self.secret_file).await?;

        debug!("Requesting access token from {}", self.token_url);
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", secret.as_str()),
                ("scope", self.scope.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| CheckerError::Auth(format!("Token request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CheckerError::Auth(format!("Failed to read token response: {}", e)))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| match e.error_description {
                    Some(description) => format!("{}: {}", e.error, description),
                    None => e.error,
                })
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            return Err(CheckerError::Auth(format!(
                "Token request rejected: {}",
                reason
            )));
        }

        let token: AccessToken = serde_json::from_str(&body)
            .map_err(|e| CheckerError::Auth(format!("Invalid token response: {}", e)))?;

        debug!(
            "Acquired access token (expires in {:?} seconds)",
            token.expires_in
        );
        Ok(token)
    }
}
