//! `POST /functions/v1/audit-log`
//!
//! Persists one audit row for the authenticated caller. Browser code
//! sometimes sends demo identifiers ("demo-patient-3") where the table
//! expects UUIDs; rather than rejecting those events the handler moves
//! the offending identifiers into metadata so the trail stays complete.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::error::FunctionError;
use super::state::{require_session, AppState};
use super::store::AuditRow;

#[derive(Debug, Deserialize)]
pub struct AuditLogRequest {
    pub action_type: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub patient_id: Option<String>,
    pub hospital_id: Option<String>,
    pub metadata: Option<Value>,
    pub session_id: Option<String>,
}

pub async fn audit_log(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AuditLogRequest>,
) -> Result<Json<Value>, FunctionError> {
    let user = require_session(&state, &headers).await?;

    if request.action_type.trim().is_empty() || request.resource_type.trim().is_empty() {
        return Err(FunctionError::BadRequest(
            "action_type and resource_type are required".to_string(),
        ));
    }

    let row = coerce_identifiers(&user.user_id, request);
    state.store.insert_audit_event(row).await?;
    Ok(Json(json!({ "success": true })))
}

/// Move non-UUID patient/hospital identifiers into metadata instead of
/// failing the insert against UUID columns.
fn coerce_identifiers(user_id: &str, request: AuditLogRequest) -> AuditRow {
    let mut metadata = match request.metadata {
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("details".to_string(), other);
            map
        }
        None => Map::new(),
    };

    let patient_id = keep_uuid(request.patient_id, "patient_ref", &mut metadata);
    let hospital_id = keep_uuid(request.hospital_id, "hospital_ref", &mut metadata);

    AuditRow {
        user_id: user_id.to_string(),
        action_type: request.action_type,
        resource_type: request.resource_type,
        resource_id: request.resource_id,
        patient_id,
        hospital_id,
        metadata: if metadata.is_empty() {
            None
        } else {
            Some(Value::Object(metadata))
        },
        session_id: request.session_id,
    }
}

fn keep_uuid(
    value: Option<String>,
    fallback_key: &str,
    metadata: &mut Map<String, Value>,
) -> Option<String> {
    match value {
        Some(id) if Uuid::parse_str(&id).is_ok() => Some(id),
        Some(id) => {
            metadata.insert(fallback_key.to_string(), Value::String(id));
            None
        }
        None => None,
    }
}
