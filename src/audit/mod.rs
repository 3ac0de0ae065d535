//! Clinical audit logging.
//!
//! Every chart view and signing action lands in the audit trail via the
//! privileged audit-log function. View events are noisy (they fire on
//! every focus change), so they are debounced per resource; actions are
//! forwarded immediately. Delivery is fire-and-forget: an audit outage
//! must never block clinical work, so failures are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::utils::debounce::KeyedDebouncer;
use crate::utils::url::construct_endpoint_url;

/// Body for `POST /functions/v1/audit-log`.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
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

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn deliver(&self, event: AuditEvent);
}

/// Posts events to the audit-log function with the session bearer token.
pub struct FunctionsSink {
    http: reqwest::Client,
    functions_url: String,
    access_token: String,
}

impl FunctionsSink {
    pub fn new(
        http: reqwest::Client,
        functions_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            functions_url: functions_url.into(),
            access_token: access_token.into(),
        }
    }
}

#[async_trait]
impl AuditSink for FunctionsSink {
    async fn deliver(&self, event: AuditEvent) {
        let url = construct_endpoint_url(&self.functions_url, "audit-log");
        let result = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&event)
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    status = response.status().as_u16(),
                    action = %event.action_type,
                    "audit event rejected"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, action = %event.action_type, "audit delivery failed");
            }
            _ => {}
        }
    }
}

/// Default quiet window before a view event is considered settled.
pub const VIEW_DEBOUNCE: Duration = Duration::from_secs(3);

pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    debouncer: KeyedDebouncer<AuditEvent>,
    session_id: String,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self::with_view_delay(sink, VIEW_DEBOUNCE)
    }

    pub fn with_view_delay(sink: Arc<dyn AuditSink>, view_delay: Duration) -> Self {
        let (debouncer, rx) = KeyedDebouncer::new(view_delay);
        let forward_sink = Arc::clone(&sink);
        tokio::spawn(forward_debounced(rx, forward_sink));
        Self {
            sink,
            debouncer,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Record a view. Rapid refocusing of the same resource collapses to
    /// the final event; distinct resources debounce independently.
    pub fn record_view(
        &self,
        resource_type: &str,
        resource_id: Option<&str>,
        patient_id: Option<&str>,
        hospital_id: Option<&str>,
    ) {
        let key = format!("{}:{}", resource_type, resource_id.unwrap_or("-"));
        let event = AuditEvent {
            action_type: "view".to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.map(str::to_string),
            patient_id: patient_id.map(str::to_string),
            hospital_id: hospital_id.map(str::to_string),
            metadata: None,
            session_id: Some(self.session_id.clone()),
        };
        self.debouncer.schedule(key, event);
    }

    /// Record an action (sign, stage, send) immediately, no debounce.
    pub fn record_action(&self, mut event: AuditEvent) {
        event.session_id = Some(self.session_id.clone());
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            sink.deliver(event).await;
        });
    }

    /// Deliver everything still pending. Dropping the logger does the
    /// same, so the final view event of a session is never lost.
    pub fn flush(&self) {
        self.debouncer.flush();
    }
}

async fn forward_debounced(mut rx: mpsc::UnboundedReceiver<AuditEvent>, sink: Arc<dyn AuditSink>) {
    while let Some(event) = rx.recv().await {
        sink.deliver(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn deliver(&self, event: AuditEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn action(action_type: &str) -> AuditEvent {
        AuditEvent {
            action_type: action_type.to_string(),
            resource_type: "staged_order".to_string(),
            resource_id: Some("o-1".to_string()),
            patient_id: Some("p-1".to_string()),
            hospital_id: Some("h-1".to_string()),
            metadata: None,
            session_id: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn view_bursts_collapse_to_one_event() {
        let sink = Arc::new(RecordingSink::default());
        let logger =
            AuditLogger::with_view_delay(Arc::clone(&sink) as Arc<dyn AuditSink>, VIEW_DEBOUNCE);

        for _ in 0..5 {
            logger.record_view("patient", Some("p-1"), Some("p-1"), Some("h-1"));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(VIEW_DEBOUNCE + Duration::from_secs(1)).await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action_type, "view");
        assert_eq!(events[0].resource_id.as_deref(), Some("p-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn actions_are_delivered_immediately() {
        let sink = Arc::new(RecordingSink::default());
        let logger =
            AuditLogger::with_view_delay(Arc::clone(&sink) as Arc<dyn AuditSink>, VIEW_DEBOUNCE);

        logger.record_action(action("sign_order"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action_type, "sign_order");
        assert_eq!(events[0].session_id.as_deref(), Some(logger.session_id()));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_logger_flushes_the_final_view() {
        let sink = Arc::new(RecordingSink::default());
        let logger =
            AuditLogger::with_view_delay(Arc::clone(&sink) as Arc<dyn AuditSink>, VIEW_DEBOUNCE);

        logger.record_view("patient", Some("p-2"), Some("p-2"), Some("h-1"));
        drop(logger);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource_id.as_deref(), Some("p-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_resources_do_not_coalesce() {
        let sink = Arc::new(RecordingSink::default());
        let logger =
            AuditLogger::with_view_delay(Arc::clone(&sink) as Arc<dyn AuditSink>, VIEW_DEBOUNCE);

        logger.record_view("patient", Some("p-1"), Some("p-1"), Some("h-1"));
        logger.record_view("patient", Some("p-2"), Some("p-2"), Some("h-1"));
        tokio::time::sleep(VIEW_DEBOUNCE + Duration::from_secs(1)).await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2);
    }
}
