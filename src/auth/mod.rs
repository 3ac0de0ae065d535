//! Session management against the backend's auth service.
//!
//! Sign-in exchanges credentials for an access/refresh token pair; the
//! refresh token is stored in the OS keyring (one entry per backend
//! host) so the console can resume a session without re-prompting.
//! Headless environments can bypass the keyring entirely with
//! `VIRTUALIS_ACCESS_TOKEN`.

use keyring::Entry;
use serde::Deserialize;

use crate::utils::url::construct_endpoint_url;

const KEYRING_SERVICE: &str = "virtualis";

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    user: AuthUser,
}

pub struct SessionManager {
    backend_url: String,
    anon_key: Option<String>,
    http: reqwest::Client,
    use_keyring: bool,
}

impl SessionManager {
    pub fn new(backend_url: impl Into<String>, anon_key: Option<String>) -> Self {
        Self::new_with_keyring(backend_url, anon_key, true)
    }

    /// Construct a SessionManager, optionally disabling keyring access
    /// (useful for tests).
    pub fn new_with_keyring(
        backend_url: impl Into<String>,
        anon_key: Option<String>,
        use_keyring: bool,
    ) -> Self {
        Self {
            backend_url: backend_url.into(),
            anon_key,
            http: reqwest::Client::new(),
            use_keyring,
        }
    }

    fn auth_url(&self, endpoint: &str) -> String {
        construct_endpoint_url(&self.backend_url, &format!("auth/v1/{endpoint}"))
    }

    fn apply_anon_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.anon_key {
            Some(key) => request.header("apikey", key),
            None => request,
        }
    }

    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, Box<dyn std::error::Error>> {
        let response = self
            .apply_anon_key(self.http.post(self.auth_url("token")))
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("sign-in failed ({status}): {body}").into());
        }

        let token: TokenResponse = response.json().await?;
        if let Some(refresh) = &token.refresh_token {
            self.store_refresh_token(refresh)?;
        }
        Ok(AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user: token.user,
        })
    }

    /// Resume without prompting: an explicit access token from the
    /// environment wins, otherwise the stored refresh token is redeemed.
    pub async fn resume(&self) -> Result<AuthSession, Box<dyn std::error::Error>> {
        if let Ok(token) = std::env::var("VIRTUALIS_ACCESS_TOKEN") {
            if !token.trim().is_empty() {
                let user = self.fetch_user(&token).await?;
                return Ok(AuthSession {
                    access_token: token,
                    refresh_token: None,
                    user,
                });
            }
        }

        let refresh = self
            .get_refresh_token()?
            .ok_or("No stored session. Run `virtualis auth` to sign in.")?;

        let response = self
            .apply_anon_key(self.http.post(self.auth_url("token")))
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh }))
            .send()
            .await?;

        if !response.status().is_success() {
            // A rejected refresh token is stale; drop it so the next
            // attempt prompts for credentials instead of looping.
            self.clear_refresh_token()?;
            return Err(format!("session refresh rejected ({})", response.status()).into());
        }

        let token: TokenResponse = response.json().await?;
        if let Some(refresh) = &token.refresh_token {
            self.store_refresh_token(refresh)?;
        }
        Ok(AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user: token.user,
        })
    }

    pub async fn sign_out(&self, session: &AuthSession) -> Result<(), Box<dyn std::error::Error>> {
        // Best effort: the local teardown matters even when the network
        // call fails.
        let result = self
            .apply_anon_key(self.http.post(self.auth_url("logout")))
            .bearer_auth(&session.access_token)
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "backend logout failed");
        }
        self.clear_refresh_token()?;
        Ok(())
    }

    /// Drop the stored refresh token without revoking the remote session
    /// (used when no session can be resumed to revoke).
    pub fn forget(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.clear_refresh_token()
    }

    async fn fetch_user(&self, access_token: &str) -> Result<AuthUser, Box<dyn std::error::Error>> {
        let response = self
            .apply_anon_key(self.http.get(self.auth_url("user")))
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(format!("token rejected ({})", response.status()).into());
        }
        Ok(response.json().await?)
    }

    fn keyring_entry(&self) -> Result<Entry, Box<dyn std::error::Error>> {
        Ok(Entry::new(
            KEYRING_SERVICE,
            &backend_host(&self.backend_url),
        )?)
    }

    fn store_refresh_token(&self, token: &str) -> Result<(), Box<dyn std::error::Error>> {
        if !self.use_keyring {
            return Ok(());
        }
        self.keyring_entry()?.set_password(token)?;
        Ok(())
    }

    fn get_refresh_token(&self) -> Result<Option<String>, Box<dyn std::error::Error>> {
        if !self.use_keyring {
            return Ok(None);
        }
        match self.keyring_entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    fn clear_refresh_token(&self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.use_keyring {
            return Ok(());
        }
        match self.keyring_entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Box::new(e)),
        }
    }
}

/// Keyring entries are keyed by host so several deployments can coexist.
fn backend_host(backend_url: &str) -> String {
    let stripped = backend_url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    stripped
        .split('/')
        .next()
        .unwrap_or(stripped)
        .to_string()
}
