//! Census and chart reads.

use futures_util::try_join;

use super::client::{eq, RecordsClient, RecordsError};
use super::types::{
    ClinicalNote, ImagingStudy, LabResult, MedicationOrder, Patient, PatientChart, VitalSign,
};

impl RecordsClient {
    /// The census: every admitted patient for a hospital, bed order.
    pub async fn list_patients(&self, hospital_id: &str) -> Result<Vec<Patient>, RecordsError> {
        self.select(
            "patients",
            &[
                eq("hospital_id", hospital_id),
                ("order", "unit.asc,bed.asc".to_string()),
            ],
        )
        .await
    }

    pub async fn get_patient(&self, patient_id: &str) -> Result<Patient, RecordsError> {
        let mut rows: Vec<Patient> = self.select("patients", &[eq("id", patient_id)]).await?;
        if rows.is_empty() {
            return Err(RecordsError::EmptyResult);
        }
        Ok(rows.remove(0))
    }

    /// One pass over the clinical tables that back the chart view. The
    /// five reads run concurrently; the chart is only as stale as the
    /// slowest of them.
    pub async fn get_patient_chart(&self, patient_id: &str) -> Result<PatientChart, RecordsError> {
        let patient = self.get_patient(patient_id).await?;

        let vitals_query = [
            eq("patient_id", patient_id),
            ("order", "recorded_at.desc".to_string()),
            ("limit", "50".to_string()),
        ];
        let labs_query = [
            eq("patient_id", patient_id),
            ("order", "resulted_at.desc".to_string()),
            ("limit", "100".to_string()),
        ];
        let meds_query = [
            eq("patient_id", patient_id),
            eq("status", "active"),
            ("order", "started_at.desc".to_string()),
        ];
        let notes_query = [
            eq("patient_id", patient_id),
            ("order", "created_at.desc".to_string()),
            ("limit", "20".to_string()),
        ];
        let imaging_query = [
            eq("patient_id", patient_id),
            ("order", "performed_at.desc".to_string()),
        ];

        let (vitals, labs, medications, notes, imaging) = try_join!(
            self.select::<VitalSign>("vital_signs", &vitals_query),
            self.select::<LabResult>("lab_results", &labs_query),
            self.select::<MedicationOrder>("medication_orders", &meds_query),
            self.select::<ClinicalNote>("clinical_notes", &notes_query),
            self.select::<ImagingStudy>("imaging_studies", &imaging_query),
        )?;

        Ok(PatientChart {
            patient,
            vitals,
            labs,
            medications,
            notes,
            imaging,
        })
    }
}
