//! Consult request coordination.

use serde_json::json;

use super::client::{eq, RecordsClient, RecordsError};
use super::types::ConsultRequest;

impl RecordsClient {
    pub async fn list_consult_requests(
        &self,
        hospital_id: &str,
    ) -> Result<Vec<ConsultRequest>, RecordsError> {
        self.select(
            "consult_requests",
            &[
                eq("hospital_id", hospital_id),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    pub async fn create_consult_request(
        &self,
        request: &serde_json::Value,
    ) -> Result<ConsultRequest, RecordsError> {
        self.insert("consult_requests", request).await
    }

    pub async fn respond_to_consult(
        &self,
        consult_id: &str,
        responder_id: &str,
        response: &str,
    ) -> Result<ConsultRequest, RecordsError> {
        let patch = json!({
            "status": "responded",
            "responded_by": responder_id,
            "response": response,
        });
        let mut rows: Vec<ConsultRequest> = self
            .update("consult_requests", &[eq("id", consult_id)], &patch)
            .await?;
        if rows.is_empty() {
            return Err(RecordsError::EmptyResult);
        }
        Ok(rows.remove(0))
    }
}
