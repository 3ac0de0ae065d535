//! Seams between the function handlers and the managed platform.
//!
//! Handlers talk to three traits — session verification, the clinical
//! store, and the auth provider's admin directory — so the privileged
//! REST implementations can be swapped for in-memory doubles in tests.
//! The REST implementations run with the service-role key and therefore
//! bypass row-level security; the handlers are responsible for the
//! authorization checks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::records::types::{NewStagedOrder, StagedOrder, TeamChannel};
use crate::records::{RecordsClient, RecordsError};
use crate::utils::url::construct_endpoint_url;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<RecordsError> for StoreError {
    fn from(e: RecordsError) -> Self {
        match e {
            RecordsError::Http { status, message } => StoreError::Http { status, message },
            RecordsError::Unauthorized => StoreError::Http {
                status: 401,
                message: "service credentials rejected".to_string(),
            },
            RecordsError::Transport(e) => StoreError::Transport(e),
            RecordsError::EmptyResult => StoreError::NotFound("row".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifiedUser {
    pub user_id: String,
    pub email: Option<String>,
}

/// Resolves a caller's bearer token to an authenticated user.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, bearer: &str) -> Result<Option<VerifiedUser>, StoreError>;
}

/// A provider row as the list_providers tool reports it: the membership
/// joined with the profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderListing {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: String,
    pub specialty: Option<String>,
}

/// Audit row as persisted; identifiers already coerced by the handler.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRow {
    pub user_id: String,
    pub action_type: String,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hospital_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTeamChannelRequest {
    pub hospital_id: String,
    pub name: String,
    pub channel_type: String,
    pub patient_id: Option<String>,
}

/// Clinical side effects the tools and the audit function perform. Each
/// method is a single-row write or a read; there are no multi-step
/// transactions to corrupt.
#[async_trait]
pub trait CareStore: Send + Sync {
    async fn insert_staged_order(&self, order: NewStagedOrder) -> Result<StagedOrder, StoreError>;

    async fn list_providers(&self, hospital_id: &str) -> Result<Vec<ProviderListing>, StoreError>;

    async fn create_team_channel(
        &self,
        request: NewTeamChannelRequest,
        creator_id: &str,
    ) -> Result<TeamChannel, StoreError>;

    async fn insert_audit_event(&self, row: AuditRow) -> Result<(), StoreError>;

    /// Whether any hospital membership grants this user the admin role.
    async fn is_admin(&self, user_id: &str) -> Result<bool, StoreError>;
}

/// A user as the auth provider's admin API reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// Privileged user management against the auth provider's admin API.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, StoreError>;
    async fn create_user(&self, email: &str, metadata: Value) -> Result<DirectoryUser, StoreError>;
    async fn update_user(&self, user_id: &str, updates: Value) -> Result<DirectoryUser, StoreError>;
    async fn deactivate_user(&self, user_id: &str) -> Result<(), StoreError>;
    async fn resend_invite(&self, email: &str) -> Result<(), StoreError>;
}

// ── REST implementations ─────────────────────────────────────────────────

/// Session verification by presenting the caller's token to the auth
/// service.
pub struct RestSessionVerifier {
    http: reqwest::Client,
    backend_url: String,
    anon_key: Option<String>,
}

impl RestSessionVerifier {
    pub fn new(http: reqwest::Client, backend_url: impl Into<String>, anon_key: Option<String>) -> Self {
        Self {
            http,
            backend_url: backend_url.into(),
            anon_key,
        }
    }
}

#[async_trait]
impl SessionVerifier for RestSessionVerifier {
    async fn verify(&self, bearer: &str) -> Result<Option<VerifiedUser>, StoreError> {
        let url = construct_endpoint_url(&self.backend_url, "auth/v1/user");
        let mut request = self.http.get(url).bearer_auth(bearer);
        if let Some(key) = &self.anon_key {
            request = request.header("apikey", key);
        }
        let response = request.send().await?;
        if response.status().as_u16() == 401 || response.status().as_u16() == 403 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Http {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        #[derive(Deserialize)]
        struct AuthUserBody {
            id: String,
            email: Option<String>,
        }
        let body: AuthUserBody = response.json().await?;
        Ok(Some(VerifiedUser {
            user_id: body.id,
            email: body.email,
        }))
    }
}

/// Store implementation over the same REST surface the console uses, but
/// holding the service-role token.
pub struct RestCareStore {
    records: RecordsClient,
}

impl RestCareStore {
    pub fn new(records: RecordsClient) -> Self {
        Self { records }
    }
}

#[async_trait]
impl CareStore for RestCareStore {
    async fn insert_staged_order(&self, order: NewStagedOrder) -> Result<StagedOrder, StoreError> {
        Ok(self.records.stage_order(&order).await?)
    }

    async fn list_providers(&self, hospital_id: &str) -> Result<Vec<ProviderListing>, StoreError> {
        let memberships = self
            .records
            .select::<crate::records::types::HospitalUser>(
                "hospital_users",
                &[
                    crate::records::client::eq("hospital_id", hospital_id),
                    crate::records::client::eq("active", "true"),
                ],
            )
            .await?;

        let mut listings = Vec::with_capacity(memberships.len());
        for membership in memberships {
            let profile = self.records.get_profile(&membership.user_id).await.ok();
            listings.push(ProviderListing {
                user_id: membership.user_id,
                email: profile.as_ref().map(|p| p.email.clone()),
                display_name: profile.and_then(|p| p.display_name),
                role: membership.role,
                specialty: membership.specialty,
            });
        }
        Ok(listings)
    }

    async fn create_team_channel(
        &self,
        request: NewTeamChannelRequest,
        creator_id: &str,
    ) -> Result<TeamChannel, StoreError> {
        let row = json!({
            "hospital_id": request.hospital_id,
            "name": request.name,
            "channel_type": request.channel_type,
            "patient_id": request.patient_id,
            "created_by": creator_id,
        });
        let channel: TeamChannel = self.records.insert("team_channels", &row).await?;

        // The creator joins their own channel; membership is a separate row.
        let member = json!({ "channel_id": channel.id, "user_id": creator_id });
        let _: Value = self.records.insert("team_channel_members", &member).await?;
        Ok(channel)
    }

    async fn insert_audit_event(&self, row: AuditRow) -> Result<(), StoreError> {
        let _: Value = self.records.insert("audit_events", &row).await?;
        Ok(())
    }

    async fn is_admin(&self, user_id: &str) -> Result<bool, StoreError> {
        let memberships = self.records.list_memberships(user_id).await?;
        Ok(memberships.iter().any(|m| m.role == "admin"))
    }
}

/// Admin directory over the auth provider's admin endpoints, authorized
/// with the service-role key.
pub struct RestDirectory {
    http: reqwest::Client,
    backend_url: String,
    service_key: String,
}

impl RestDirectory {
    pub fn new(
        http: reqwest::Client,
        backend_url: impl Into<String>,
        service_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            backend_url: backend_url.into(),
            service_key: service_key.into(),
        }
    }

    fn admin_url(&self, endpoint: &str) -> String {
        construct_endpoint_url(&self.backend_url, &format!("auth/v1/admin/{endpoint}"))
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        if !response.status().is_success() {
            return Err(StoreError::Http {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Directory for RestDirectory {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, StoreError> {
        let response = self.authed(self.http.get(self.admin_url("users"))).send().await?;
        let response = Self::expect_success(response).await?;
        #[derive(Deserialize)]
        struct UsersPage {
            users: Vec<DirectoryUser>,
        }
        let page: UsersPage = response.json().await?;
        Ok(page.users)
    }

    async fn create_user(&self, email: &str, metadata: Value) -> Result<DirectoryUser, StoreError> {
        let body = json!({
            "email": email,
            "email_confirm": false,
            "user_metadata": metadata,
        });
        let response = self
            .authed(self.http.post(self.admin_url("users")))
            .json(&body)
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn update_user(&self, user_id: &str, updates: Value) -> Result<DirectoryUser, StoreError> {
        let response = self
            .authed(self.http.put(self.admin_url(&format!("users/{user_id}"))))
            .json(&updates)
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn deactivate_user(&self, user_id: &str) -> Result<(), StoreError> {
        let body = json!({ "ban_duration": "876000h" });
        let response = self
            .authed(self.http.put(self.admin_url(&format!("users/{user_id}"))))
            .json(&body)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn resend_invite(&self, email: &str) -> Result<(), StoreError> {
        let body = json!({ "email": email });
        let response = self
            .authed(self.http.post(self.admin_url("invite")))
            .json(&body)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}
