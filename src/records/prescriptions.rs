//! Prescription reads and writes.

use serde_json::json;

use super::client::{eq, RecordsClient, RecordsError};
use super::types::Prescription;

impl RecordsClient {
    pub async fn list_prescriptions(
        &self,
        patient_id: &str,
    ) -> Result<Vec<Prescription>, RecordsError> {
        self.select(
            "prescriptions",
            &[
                eq("patient_id", patient_id),
                ("order", "start_date.desc".to_string()),
            ],
        )
        .await
    }

    pub async fn create_prescription(
        &self,
        prescription: &serde_json::Value,
    ) -> Result<Prescription, RecordsError> {
        self.insert("prescriptions", prescription).await
    }

    pub async fn discontinue_prescription(
        &self,
        prescription_id: &str,
    ) -> Result<Prescription, RecordsError> {
        let patch = json!({ "status": "discontinued" });
        let mut rows: Vec<Prescription> = self
            .update("prescriptions", &[eq("id", prescription_id)], &patch)
            .await?;
        if rows.is_empty() {
            return Err(RecordsError::EmptyResult);
        }
        Ok(rows.remove(0))
    }
}
