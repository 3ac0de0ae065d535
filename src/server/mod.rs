//! The privileged function server.
//!
//! Three stateless endpoints back the console (and the browser client in
//! hosted deployments): the streaming chat proxy, the audit writer, and
//! the admin user-management multiplex. All privileged access to the
//! backend happens here with the service-role key; callers authenticate
//! with their own session bearer token.

pub mod admin;
pub mod audit_log;
pub mod chat;
pub mod error;
pub mod state;
pub mod store;
pub mod tools;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use anyhow::Context;
use axum::routing::post;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::records::RecordsClient;

use state::{AppState, GatewayConfig};
use store::{RestCareStore, RestDirectory, RestSessionVerifier};

pub struct ServerConfig {
    pub bind_addr: String,
    pub backend_url: String,
    pub service_role_key: String,
    pub anon_key: Option<String>,
    pub gateway: GatewayConfig,
}

impl ServerConfig {
    /// All configuration comes from the environment, the way function
    /// hosts inject secrets.
    pub fn from_env() -> anyhow::Result<Self> {
        let backend_url =
            std::env::var("VIRTUALIS_BACKEND_URL").context("VIRTUALIS_BACKEND_URL is required")?;
        let service_role_key = std::env::var("VIRTUALIS_SERVICE_ROLE_KEY")
            .context("VIRTUALIS_SERVICE_ROLE_KEY is required")?;
        let gateway_url =
            std::env::var("ALIS_GATEWAY_URL").context("ALIS_GATEWAY_URL is required")?;
        let gateway_key =
            std::env::var("ALIS_GATEWAY_KEY").context("ALIS_GATEWAY_KEY is required")?;
        let model =
            std::env::var("ALIS_MODEL").unwrap_or_else(|_| "alis-clinical-1".to_string());
        let port = std::env::var("PORT").unwrap_or_else(|_| "8787".to_string());

        Ok(Self {
            bind_addr: format!("0.0.0.0:{port}"),
            backend_url,
            service_role_key,
            anon_key: std::env::var("VIRTUALIS_ANON_KEY").ok(),
            gateway: GatewayConfig {
                url: gateway_url,
                api_key: gateway_key,
                model,
            },
        })
    }
}

pub fn build_state(config: &ServerConfig) -> Arc<AppState> {
    let http = reqwest::Client::new();
    let records = RecordsClient::new(
        http.clone(),
        config.backend_url.clone(),
        Some(config.service_role_key.clone()),
        config.service_role_key.clone(),
    );
    Arc::new(AppState {
        http: http.clone(),
        sessions: Arc::new(RestSessionVerifier::new(
            http.clone(),
            config.backend_url.clone(),
            config.anon_key.clone(),
        )),
        store: Arc::new(RestCareStore::new(records)),
        directory: Arc::new(RestDirectory::new(
            http,
            config.backend_url.clone(),
            config.service_role_key.clone(),
        )),
        gateway: config.gateway.clone(),
    })
}

/// The functions are called from browsers in hosted deployments, so CORS
/// stays permissive; authorization is the bearer token, not the origin.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/functions/v1/alis-chat", post(chat::alis_chat))
        .route("/functions/v1/audit-log", post(audit_log::audit_log))
        .route("/functions/v1/admin-users", post(admin::admin_users))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let state = build_state(&config);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "virtualis-functions listening");
    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}
