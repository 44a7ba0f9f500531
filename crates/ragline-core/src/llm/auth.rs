//! Request authorization for the provider
//!
//! Vertex AI takes short-lived OAuth2 access tokens. A service account gets
//! them by signing a JWT assertion and exchanging it at the account's token
//! endpoint (RFC 7523); tokens are cached and refreshed shortly before expiry.

use crate::config::{ProviderConfig, ServiceAccount};
use crate::error::{RaglineError, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME: Duration = Duration::from_secs(3600);
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: SystemTime,
}

/// Access tokens minted from a service-account key
pub struct ServiceAccountTokens {
    client_email: String,
    key: EncodingKey,
    key_id: Option<String>,
    token_uri: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    pub fn from_account(account: &ServiceAccount) -> Result<Self> {
        let client_email = account
            .client_email
            .clone()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| RaglineError::Credentials("No client_email in credentials".into()))?;
        let pem = account
            .private_key
            .as_deref()
            .ok_or_else(|| RaglineError::Credentials("No private_key in credentials".into()))?;
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| RaglineError::Credentials(format!("Invalid private_key: {}", e)))?;

        Ok(Self {
            client_email,
            key,
            key_id: account.private_key_id.clone(),
            token_uri: account
                .token_uri
                .clone()
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            cached: Mutex::new(None),
        })
    }

    /// Current access token, minting a new one when missing or about to expire
    pub async fn access_token(&self, http: &reqwest::Client) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| SystemTime::now() < t.refresh_at) {
            return Ok(token.value.clone());
        }

        let token = self.mint(http).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    fn assertion(&self) -> Result<String> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| RaglineError::Credentials(format!("System clock error: {}", e)))?
            .as_secs();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME.as_secs(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| RaglineError::Credentials(format!("Failed to sign token request: {}", e)))
    }

    async fn mint(&self, http: &reqwest::Client) -> Result<CachedToken> {
        let assertion = self.assertion()?;
        let response = http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RaglineError::Credentials(format!(
                "Token exchange failed (HTTP {}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        tracing::debug!(
            account = %self.client_email,
            expires_in = lifetime.as_secs(),
            "Minted provider access token"
        );

        Ok(CachedToken {
            value: token.access_token,
            refresh_at: SystemTime::now() + lifetime.saturating_sub(REFRESH_MARGIN),
        })
    }
}

/// How requests to the provider are authorized
pub enum ProviderAuth {
    Anonymous,
    /// Fixed bearer token (`api_key`)
    Static(String),
    ServiceAccount(ServiceAccountTokens),
}

impl ProviderAuth {
    /// An explicit `api_key` wins over a loaded service account
    pub fn from_config(config: &ProviderConfig) -> Self {
        if let Some(ref key) = config.api_key {
            return Self::Static(key.clone());
        }

        match config.service_account {
            Some(ref account) => match ServiceAccountTokens::from_account(account) {
                Ok(tokens) => Self::ServiceAccount(tokens),
                Err(e) => {
                    tracing::error!("Service account cannot authorize requests: {}", e);
                    Self::Anonymous
                }
            },
            None => {
                if config.is_vertex() {
                    tracing::warn!("No credentials for Vertex AI; requests will be unauthenticated");
                }
                Self::Anonymous
            }
        }
    }

    pub async fn bearer_token(&self, http: &reqwest::Client) -> Result<Option<String>> {
        match self {
            Self::Anonymous => Ok(None),
            Self::Static(token) => Ok(Some(token.clone())),
            Self::ServiceAccount(tokens) => tokens.access_token(http).await.map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = include_str!("../../tests/fixtures/service-account-key.pem");

    fn account() -> ServiceAccount {
        ServiceAccount {
            client_email: Some("bot@demo.iam.gserviceaccount.com".into()),
            private_key: Some(TEST_KEY.into()),
            private_key_id: Some("key-1".into()),
            ..ServiceAccount::default()
        }
    }

    fn provider(api_key: Option<&str>, account: Option<ServiceAccount>) -> ProviderConfig {
        ProviderConfig {
            url: Some("http://127.0.0.1:9".into()),
            api_key: api_key.map(String::from),
            service_account: account,
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_api_key_wins_over_service_account() {
        let auth = ProviderAuth::from_config(&provider(Some("static"), Some(account())));
        assert!(matches!(auth, ProviderAuth::Static(ref t) if t == "static"));
    }

    #[test]
    fn test_service_account_selected_without_key() {
        let auth = ProviderAuth::from_config(&provider(None, Some(account())));
        assert!(matches!(auth, ProviderAuth::ServiceAccount(_)));
    }

    #[test]
    fn test_unusable_key_falls_back_to_anonymous() {
        let broken = ServiceAccount {
            private_key: Some("not a pem key".into()),
            ..account()
        };
        let auth = ProviderAuth::from_config(&provider(None, Some(broken)));
        assert!(matches!(auth, ProviderAuth::Anonymous));
    }

    #[test]
    fn test_assertion_is_signed_jwt_for_token_endpoint() {
        let tokens = ServiceAccountTokens::from_account(&account()).unwrap();
        let jwt = tokens.assertion().unwrap();
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        let header = jsonwebtoken::decode_header(&jwt).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("key-1"));
        assert_eq!(tokens.token_uri, DEFAULT_TOKEN_URI);
    }
}
