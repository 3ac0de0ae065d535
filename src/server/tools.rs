//! The four clinical tools ALIS may call.
//!
//! Tools are a closed enum with an exhaustive match, so adding a fifth
//! tool is a compile-checked change rather than a silent fallthrough.
//! Argument payloads are validated against the declared JSON schema
//! before deserialization, and every execution result is a value — a
//! failed tool reports `success: false` with a message the model can
//! narrate, never an error that aborts the exchange.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::ChatToolDefinition;

use super::store::{CareStore, NewTeamChannelRequest};
use crate::records::types::NewStagedOrder;

#[derive(Debug, Clone, Deserialize)]
pub struct StageOrderArgs {
    pub order_type: String,
    pub name: String,
    pub priority: String,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InviteProviderArgs {
    pub email: String,
    pub name: String,
    pub role: String,
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTeamChannelArgs {
    pub name: String,
    pub channel_type: String,
    pub patient_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ClinicalTool {
    StageOrder(StageOrderArgs),
    InviteProvider(InviteProviderArgs),
    ListProviders,
    CreateTeamChannel(CreateTeamChannelArgs),
}

/// What the model gets back after a tool runs. Serialized verbatim into
/// the follow-up turn's tool message.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
}

impl ToolOutcome {
    pub(crate) fn ok_with(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut value = json!({
            "success": self.success,
            "message": self.message,
        });
        if let Some(data) = &self.data {
            value["data"] = data.clone();
        }
        value
    }
}

/// Conversation-scoped facts the tools draw on; absent fields make the
/// corresponding tools report failure instead of guessing.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub user_id: String,
    pub hospital_id: Option<String>,
    pub patient_id: Option<String>,
}

fn stage_order_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "order_type": {
                "type": "string",
                "enum": ["imaging", "lab", "medication", "consult", "procedure"]
            },
            "name": { "type": "string", "description": "Name of the order, e.g. 'CBC with differential'" },
            "priority": {
                "type": "string",
                "enum": ["STAT", "Urgent", "Today", "Routine"]
            },
            "rationale": { "type": "string", "description": "Clinical reasoning for the order" }
        },
        "required": ["order_type", "name", "priority"]
    })
}

fn invite_provider_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "email": { "type": "string" },
            "name": { "type": "string" },
            "role": { "type": "string", "enum": ["clinician", "viewer"] },
            "specialty": { "type": "string" }
        },
        "required": ["email", "name", "role"]
    })
}

fn list_providers_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn create_team_channel_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "channel_type": {
                "type": "string",
                "enum": ["patient_care", "department", "consult"]
            },
            "patient_id": { "type": "string" }
        },
        "required": ["name", "channel_type"]
    })
}

/// Tool declarations sent to the gateway with every chat request.
pub fn tool_definitions() -> Vec<ChatToolDefinition> {
    vec![
        ChatToolDefinition::function(
            "stage_order",
            "Stage a clinical order for the current patient. The order is held for \
             clinician signature and is not active until signed.",
            stage_order_schema(),
        ),
        ChatToolDefinition::function(
            "invite_provider",
            "Invite a provider to join this hospital's care team.",
            invite_provider_schema(),
        ),
        ChatToolDefinition::function(
            "list_providers",
            "List the providers on this hospital's care team.",
            list_providers_schema(),
        ),
        ChatToolDefinition::function(
            "create_team_channel",
            "Create a care-team messaging channel.",
            create_team_channel_schema(),
        ),
    ]
}

#[derive(Debug)]
pub enum ToolParseError {
    UnknownTool(String),
    InvalidArguments { tool: String, detail: String },
}

impl std::fmt::Display for ToolParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolParseError::UnknownTool(name) => write!(f, "unknown tool: {name}"),
            ToolParseError::InvalidArguments { tool, detail } => {
                write!(f, "invalid arguments for {tool}: {detail}")
            }
        }
    }
}

fn validated<T: serde::de::DeserializeOwned>(
    tool: &str,
    schema: Value,
    raw_arguments: &str,
) -> Result<T, ToolParseError> {
    let args: Value =
        serde_json::from_str(raw_arguments).map_err(|e| ToolParseError::InvalidArguments {
            tool: tool.to_string(),
            detail: e.to_string(),
        })?;
    if !jsonschema::is_valid(&schema, &args) {
        return Err(ToolParseError::InvalidArguments {
            tool: tool.to_string(),
            detail: "arguments do not match the declared schema".to_string(),
        });
    }
    serde_json::from_value(args).map_err(|e| ToolParseError::InvalidArguments {
        tool: tool.to_string(),
        detail: e.to_string(),
    })
}

impl ClinicalTool {
    /// Parse a completed tool call by name and raw argument string.
    pub fn parse(name: &str, raw_arguments: &str) -> Result<Self, ToolParseError> {
        match name {
            "stage_order" => Ok(ClinicalTool::StageOrder(validated(
                name,
                stage_order_schema(),
                raw_arguments,
            )?)),
            "invite_provider" => Ok(ClinicalTool::InviteProvider(validated(
                name,
                invite_provider_schema(),
                raw_arguments,
            )?)),
            "list_providers" => Ok(ClinicalTool::ListProviders),
            "create_team_channel" => Ok(ClinicalTool::CreateTeamChannel(validated(
                name,
                create_team_channel_schema(),
                raw_arguments,
            )?)),
            other => Err(ToolParseError::UnknownTool(other.to_string())),
        }
    }
}

/// Execute one tool call. Each arm performs at most one row insert, so a
/// malformed or repeated call cannot corrupt more than a single staged
/// record.
pub async fn execute_tool(
    tool: ClinicalTool,
    context: &ToolContext,
    store: &dyn CareStore,
) -> ToolOutcome {
    match tool {
        ClinicalTool::StageOrder(args) => {
            let Some(patient_id) = context.patient_id.clone() else {
                return ToolOutcome::failed(
                    "No patient is selected in this conversation, so the order cannot be \
                     staged. Open a patient chart and try again.",
                );
            };
            let Some(hospital_id) = context.hospital_id.clone() else {
                return ToolOutcome::failed("No hospital is selected in this conversation.");
            };
            let order = NewStagedOrder {
                hospital_id,
                patient_id,
                order_type: args.order_type.clone(),
                name: args.name.clone(),
                priority: args.priority.clone(),
                rationale: args.rationale.clone(),
                status: crate::records::orders::ORDER_STATUS_STAGED.to_string(),
                staged_by: Some(context.user_id.clone()),
            };
            match store.insert_staged_order(order).await {
                Ok(staged) => ToolOutcome::ok_with(
                    format!(
                        "Staged {} order \"{}\" ({}) for signature.",
                        args.order_type, args.name, args.priority
                    ),
                    json!({ "order_id": staged.id, "status": staged.status }),
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "stage_order insert failed");
                    ToolOutcome::failed(format!("The order could not be staged: {e}"))
                }
            }
        }

        ClinicalTool::InviteProvider(args) => {
            // Invitations are simulated at this layer: the record of intent
            // is returned to the model and the admin function owns real
            // provisioning.
            ToolOutcome::ok_with(
                format!(
                    "Invitation prepared for {} <{}> as {}.",
                    args.name, args.email, args.role
                ),
                json!({
                    "email": args.email,
                    "role": args.role,
                    "specialty": args.specialty,
                    "simulated": true,
                }),
            )
        }

        ClinicalTool::ListProviders => {
            let Some(hospital_id) = context.hospital_id.clone() else {
                return ToolOutcome::failed("No hospital is selected in this conversation.");
            };
            match store.list_providers(&hospital_id).await {
                Ok(providers) => {
                    let count = providers.len();
                    match serde_json::to_value(providers) {
                        Ok(data) => ToolOutcome::ok_with(
                            format!("{count} providers on the care team."),
                            data,
                        ),
                        Err(e) => ToolOutcome::failed(format!(
                            "The provider list could not be serialized: {e}"
                        )),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "list_providers failed");
                    ToolOutcome::failed(format!("The provider list could not be loaded: {e}"))
                }
            }
        }

        ClinicalTool::CreateTeamChannel(args) => {
            let Some(hospital_id) = context.hospital_id.clone() else {
                return ToolOutcome::failed("No hospital is selected in this conversation.");
            };
            let request = NewTeamChannelRequest {
                hospital_id,
                name: args.name.clone(),
                channel_type: args.channel_type.clone(),
                patient_id: args.patient_id.clone(),
            };
            match store.create_team_channel(request, &context.user_id).await {
                Ok(channel) => ToolOutcome::ok_with(
                    format!("Created {} channel \"{}\".", args.channel_type, args.name),
                    json!({ "channel_id": channel.id }),
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "create_team_channel failed");
                    ToolOutcome::failed(format!("The channel could not be created: {e}"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing::MemoryStore;

    fn context_with_patient() -> ToolContext {
        ToolContext {
            user_id: "u-1".to_string(),
            hospital_id: Some("h-1".to_string()),
            patient_id: Some("p-1".to_string()),
        }
    }

    #[test]
    fn parse_validates_against_schema() {
        let tool = ClinicalTool::parse(
            "stage_order",
            r#"{"order_type":"lab","name":"CBC","priority":"STAT"}"#,
        )
        .unwrap();
        assert!(matches!(tool, ClinicalTool::StageOrder(_)));

        // Priority outside the declared enum is rejected before dispatch.
        let err = ClinicalTool::parse(
            "stage_order",
            r#"{"order_type":"lab","name":"CBC","priority":"Whenever"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ToolParseError::InvalidArguments { .. }));
    }

    #[test]
    fn unknown_tool_is_an_error_not_a_fallthrough() {
        let err = ClinicalTool::parse("delete_patient", "{}").unwrap_err();
        assert!(matches!(err, ToolParseError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn stage_order_creates_exactly_one_record() {
        let store = MemoryStore::default();
        let tool = ClinicalTool::parse(
            "stage_order",
            r#"{"order_type":"imaging","name":"Chest X-ray","priority":"Today","rationale":"follow-up"}"#,
        )
        .unwrap();

        let outcome = execute_tool(tool, &context_with_patient(), &store).await;
        assert!(outcome.success);
        assert_eq!(store.staged_orders().len(), 1);
        assert_eq!(store.staged_orders()[0].patient_id, "p-1");
        assert_eq!(store.staged_orders()[0].status, "staged");
    }

    #[tokio::test]
    async fn stage_order_without_patient_fails_as_a_value() {
        let store = MemoryStore::default();
        let context = ToolContext {
            user_id: "u-1".to_string(),
            hospital_id: Some("h-1".to_string()),
            patient_id: None,
        };
        let tool = ClinicalTool::parse(
            "stage_order",
            r#"{"order_type":"lab","name":"BMP","priority":"Routine"}"#,
        )
        .unwrap();

        let outcome = execute_tool(tool, &context, &store).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("No patient"));
        assert!(store.staged_orders().is_empty());

        let json = outcome.to_json();
        assert_eq!(json["success"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn list_providers_reports_the_roster() {
        let store = MemoryStore::default();
        store.add_provider("h-1", "u-2", "clinician", Some("cardiology"));

        let outcome = execute_tool(
            ClinicalTool::ListProviders,
            &context_with_patient(),
            &store,
        )
        .await;
        assert!(outcome.success);
        assert!(outcome.message.starts_with("1 providers"));
        let data = outcome.data.unwrap();
        assert_eq!(data[0]["role"], serde_json::json!("clinician"));
    }

    #[tokio::test]
    async fn create_team_channel_inserts_channel_and_membership() {
        let store = MemoryStore::default();
        let tool = ClinicalTool::parse(
            "create_team_channel",
            r#"{"name":"icu-west","channel_type":"department"}"#,
        )
        .unwrap();

        let outcome = execute_tool(tool, &context_with_patient(), &store).await;
        assert!(outcome.success);
        assert_eq!(store.channels().len(), 1);
        assert_eq!(store.channel_members().len(), 1);
        assert_eq!(store.channel_members()[0].1, "u-1");
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_success_false() {
        let store = MemoryStore::default();
        store.fail_next_insert();
        let tool = ClinicalTool::parse(
            "stage_order",
            r#"{"order_type":"lab","name":"CBC","priority":"STAT"}"#,
        )
        .unwrap();

        let outcome = execute_tool(tool, &context_with_patient(), &store).await;
        assert!(!outcome.success);
        assert!(store.staged_orders().is_empty());
    }
}
