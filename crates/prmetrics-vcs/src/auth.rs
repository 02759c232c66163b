use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use prmetrics_config::{GitHubCredentials, Secret};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::VcsError;

// GitHub rejects App JWTs issued in the future or valid for over 10 minutes.
const JWT_BACKDATE_SECS: i64 = 60;
const JWT_LIFETIME_SECS: i64 = 9 * 60;
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Where API bearer tokens come from.
pub enum GitHubAuth {
    Token(Secret),
    App(AppTokenSource),
}

impl GitHubAuth {
    pub fn from_credentials(
        client: reqwest::Client,
        api_base: &str,
        credentials: &GitHubCredentials,
    ) -> Result<Self, VcsError> {
        match credentials {
            GitHubCredentials::Token(token) => Ok(Self::Token(token.clone())),
            GitHubCredentials::App {
                app_id,
                installation_id,
                private_key,
            } => Ok(Self::App(AppTokenSource::new(
                client,
                api_base,
                app_id,
                installation_id,
                private_key.expose(),
            )?)),
        }
    }

    pub async fn bearer_token(&self) -> Result<String, VcsError> {
        match self {
            Self::Token(token) => Ok(token.expose().to_owned()),
            Self::App(source) => source.installation_token().await,
        }
    }
}

impl fmt::Debug for GitHubAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(token) => f.debug_tuple("Token").field(token).finish(),
            Self::App(source) => f.debug_tuple("App").field(source).finish(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now
    }
}

/// GitHub App installation tokens, exchanged on demand and cached until
/// shortly before they expire.
pub struct AppTokenSource {
    client: reqwest::Client,
    api_base: String,
    app_id: String,
    installation_id: String,
    key: EncodingKey,
    cached: RwLock<Option<CachedToken>>,
}

impl AppTokenSource {
    /// Accepts PKCS#1 (`RSA PRIVATE KEY`) and PKCS#8 (`PRIVATE KEY`) PEM.
    pub fn new(
        client: reqwest::Client,
        api_base: &str,
        app_id: &str,
        installation_id: &str,
        private_key_pem: &str,
    ) -> Result<Self, VcsError> {
        let key =
            EncodingKey::from_rsa_pem(private_key_pem.as_bytes()).map_err(VcsError::InvalidKey)?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_owned(),
            app_id: app_id.to_owned(),
            installation_id: installation_id.to_owned(),
            key,
            cached: RwLock::new(None),
        })
    }

    pub fn app_jwt(&self) -> Result<String, VcsError> {
        let now = Utc::now().timestamp();
        let claims = AppClaims {
            iat: now - JWT_BACKDATE_SECS,
            exp: now + JWT_LIFETIME_SECS,
            iss: self.app_id.clone(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|err| VcsError::Auth(format!("failed to sign app jwt: {err}")))
    }

    pub async fn installation_token(&self) -> Result<String, VcsError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|token| token.is_fresh(Utc::now())) {
                return Ok(token.token.clone());
            }
        }

        let mut cached = self.cached.write().await;
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh(Utc::now())) {
            return Ok(token.token.clone());
        }

        tracing::debug!(
            installation_id = %self.installation_id,
            "requesting GitHub App installation token"
        );
        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn exchange(&self) -> Result<CachedToken, VcsError> {
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, self.installation_id
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.app_jwt()?)
            .header(reqwest::header::ACCEPT, crate::github::GITHUB_ACCEPT)
            .header(crate::github::API_VERSION_HEADER, crate::github::API_VERSION)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VcsError::Auth(format!(
                "installation token exchange returned {status}: {message}"
            )));
        }

        let body = response.json::<InstallationTokenResponse>().await?;
        Ok(CachedToken {
            token: body.token,
            expires_at: body.expires_at,
        })
    }
}

impl fmt::Debug for AppTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppTokenSource")
            .field("api_base", &self.api_base)
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_token_expires_five_minutes_early() {
        let now = Utc::now();
        let token = |minutes: i64| CachedToken {
            token: "t".to_owned(),
            expires_at: now + Duration::minutes(minutes),
        };

        assert!(token(60).is_fresh(now));
        assert!(!token(5).is_fresh(now));
        assert!(!token(1).is_fresh(now));
    }

    #[test]
    fn garbage_private_key_is_rejected() {
        let err = AppTokenSource::new(
            reqwest::Client::new(),
            "https://api.github.com",
            "1",
            "2",
            "not a pem",
        )
        .expect_err("invalid key");

        assert!(matches!(err, VcsError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn static_token_is_returned_verbatim() {
        let auth = GitHubAuth::Token(Secret::new("ghp_example"));

        assert_eq!(auth.bearer_token().await.expect("token"), "ghp_example");
        assert_eq!(format!("{auth:?}"), "Token([REDACTED])");
    }
}
