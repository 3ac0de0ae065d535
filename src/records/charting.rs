//! Immunization history and reusable note templates.

use super::client::{eq, RecordsClient, RecordsError};
use super::types::{Immunization, NoteTemplate};

impl RecordsClient {
    pub async fn list_immunizations(
        &self,
        patient_id: &str,
    ) -> Result<Vec<Immunization>, RecordsError> {
        self.select(
            "immunizations",
            &[
                eq("patient_id", patient_id),
                ("order", "administered_at.desc".to_string()),
            ],
        )
        .await
    }

    /// Templates visible to a hospital: its own plus the shared set with
    /// no hospital id.
    pub async fn list_note_templates(
        &self,
        hospital_id: &str,
    ) -> Result<Vec<NoteTemplate>, RecordsError> {
        self.select(
            "note_templates",
            &[
                (
                    "or",
                    format!("(hospital_id.eq.{hospital_id},hospital_id.is.null)"),
                ),
                ("order", "name.asc".to_string()),
            ],
        )
        .await
    }
}
