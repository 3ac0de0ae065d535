//! Appointments and encounters.

use super::client::{eq, RecordsClient, RecordsError};
use super::types::{Appointment, Encounter};

impl RecordsClient {
    pub async fn list_appointments(
        &self,
        patient_id: &str,
    ) -> Result<Vec<Appointment>, RecordsError> {
        self.select(
            "appointments",
            &[
                eq("patient_id", patient_id),
                ("order", "scheduled_for.asc".to_string()),
            ],
        )
        .await
    }

    pub async fn create_appointment(
        &self,
        appointment: &serde_json::Value,
    ) -> Result<Appointment, RecordsError> {
        self.insert("appointments", appointment).await
    }

    pub async fn list_encounters(
        &self,
        patient_id: &str,
    ) -> Result<Vec<Encounter>, RecordsError> {
        self.select(
            "encounters",
            &[
                eq("patient_id", patient_id),
                ("order", "started_at.desc".to_string()),
            ],
        )
        .await
    }
}
