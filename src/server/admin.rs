//! `POST /functions/v1/admin-users`
//!
//! One endpoint multiplexed by an `action` field. Every action requires
//! the caller to hold an admin membership row; a valid session without
//! one gets 403 even for reads.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::error::FunctionError;
use super::state::{require_session, AppState};

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminRequest {
    ListUsers,
    CreateUser {
        email: String,
        name: String,
        role: String,
        specialty: Option<String>,
    },
    UpdateUser {
        user_id: String,
        updates: Value,
    },
    DeactivateUser {
        user_id: String,
    },
    ResendInvite {
        email: String,
    },
}

pub async fn admin_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AdminRequest>,
) -> Result<Json<Value>, FunctionError> {
    let user = require_session(&state, &headers).await?;

    if !state.store.is_admin(&user.user_id).await? {
        return Err(FunctionError::Forbidden(
            "admin role required".to_string(),
        ));
    }

    match request {
        AdminRequest::ListUsers => {
            let users = state.directory.list_users().await?;
            Ok(Json(json!({ "users": users })))
        }
        AdminRequest::CreateUser {
            email,
            name,
            role,
            specialty,
        } => {
            if !matches!(role.as_str(), "clinician" | "viewer" | "admin") {
                return Err(FunctionError::BadRequest(format!("invalid role: {role}")));
            }
            let metadata = json!({
                "name": name,
                "role": role,
                "specialty": specialty,
            });
            let created = state.directory.create_user(&email, metadata).await?;
            info!(admin = %user.user_id, created = %created.id, "user provisioned");
            Ok(Json(json!({ "user": created })))
        }
        AdminRequest::UpdateUser { user_id, updates } => {
            let updated = state.directory.update_user(&user_id, updates).await?;
            Ok(Json(json!({ "user": updated })))
        }
        AdminRequest::DeactivateUser { user_id } => {
            state.directory.deactivate_user(&user_id).await?;
            info!(admin = %user.user_id, deactivated = %user_id, "user deactivated");
            Ok(Json(json!({ "success": true })))
        }
        AdminRequest::ResendInvite { email } => {
            state.directory.resend_invite(&email).await?;
            Ok(Json(json!({ "success": true })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::state::GatewayConfig;
    use crate::server::testing::{MemoryDirectory, MemorySessions, MemoryStore};

    struct Fixture {
        state: Arc<AppState>,
        store: Arc<MemoryStore>,
        sessions: Arc<MemorySessions>,
        directory: Arc<MemoryDirectory>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let sessions = Arc::new(MemorySessions::default());
        let directory = Arc::new(MemoryDirectory::default());
        let state = Arc::new(AppState {
            http: reqwest::Client::new(),
            sessions: Arc::clone(&sessions) as Arc<dyn crate::server::store::SessionVerifier>,
            store: Arc::clone(&store) as Arc<dyn crate::server::store::CareStore>,
            directory: Arc::clone(&directory) as Arc<dyn crate::server::store::Directory>,
            gateway: GatewayConfig {
                url: "https://gateway.example.com/v1".to_string(),
                api_key: "key".to_string(),
                model: "alis-clinical-1".to_string(),
            },
        });
        Fixture {
            state,
            store,
            sessions,
            directory,
        }
    }

    fn authed_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn no_bearer_at_all_is_401() {
        let f = fixture();
        let result = admin_users(
            State(f.state),
            HeaderMap::new(),
            Json(AdminRequest::ListUsers),
        )
        .await;
        assert!(matches!(result, Err(FunctionError::Unauthorized)));
    }

    #[tokio::test]
    async fn valid_session_without_admin_row_is_403_even_for_list() {
        let f = fixture();
        f.sessions.add_token("tok", "u-1");
        // u-1 is a real user but holds no admin membership.

        let result = admin_users(
            State(f.state),
            authed_headers("tok"),
            Json(AdminRequest::ListUsers),
        )
        .await;
        assert!(matches!(result, Err(FunctionError::Forbidden(_))));
    }

    #[tokio::test]
    async fn admin_can_list_users() {
        let f = fixture();
        f.sessions.add_token("tok", "u-admin");
        f.store.add_admin("u-admin");
        f.directory.add_user("u-1", "dr.chen@stmarys.example.com");

        let Json(body) = admin_users(
            State(f.state),
            authed_headers("tok"),
            Json(AdminRequest::ListUsers),
        )
        .await
        .unwrap();
        assert_eq!(body["users"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_user_rejects_unknown_roles() {
        let f = fixture();
        f.sessions.add_token("tok", "u-admin");
        f.store.add_admin("u-admin");

        let result = admin_users(
            State(f.state),
            authed_headers("tok"),
            Json(AdminRequest::CreateUser {
                email: "new@stmarys.example.com".to_string(),
                name: "New Provider".to_string(),
                role: "superuser".to_string(),
                specialty: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(FunctionError::BadRequest(_))));
        assert!(f.directory.users().is_empty());
    }

    #[tokio::test]
    async fn deactivate_flags_the_user() {
        let f = fixture();
        f.sessions.add_token("tok", "u-admin");
        f.store.add_admin("u-admin");
        f.directory.add_user("u-2", "leaving@stmarys.example.com");

        admin_users(
            State(Arc::clone(&f.state)),
            authed_headers("tok"),
            Json(AdminRequest::DeactivateUser {
                user_id: "u-2".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(f.directory.users()[0].disabled);
    }

    #[tokio::test]
    async fn resend_invite_records_the_email() {
        let f = fixture();
        f.sessions.add_token("tok", "u-admin");
        f.store.add_admin("u-admin");

        admin_users(
            State(f.state),
            authed_headers("tok"),
            Json(AdminRequest::ResendInvite {
                email: "slow@stmarys.example.com".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(f.directory.invites(), vec!["slow@stmarys.example.com"]);
    }

    #[test]
    fn action_field_multiplexes_the_payload() {
        let request: AdminRequest =
            serde_json::from_value(json!({ "action": "list_users" })).unwrap();
        assert!(matches!(request, AdminRequest::ListUsers));

        let request: AdminRequest = serde_json::from_value(json!({
            "action": "create_user",
            "email": "a@b.c",
            "name": "A",
            "role": "clinician",
        }))
        .unwrap();
        assert!(matches!(request, AdminRequest::CreateUser { .. }));

        assert!(serde_json::from_value::<AdminRequest>(json!({ "action": "drop_tables" })).is_err());
    }
}
