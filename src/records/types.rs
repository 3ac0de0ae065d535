//! Serde mirrors of the managed store's rows.
//!
//! The schema itself (columns, constraints, row-level security) is owned
//! by the backend platform; these types only describe the fields the
//! console reads and writes through the REST surface.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hospital {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Membership row tying a user to a hospital with a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HospitalUser {
    pub user_id: String,
    pub hospital_id: String,
    pub role: String,
    pub specialty: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub hospital_id: String,
    pub mrn: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub unit: Option<String>,
    pub bed: Option<String>,
    pub attending_id: Option<String>,
    pub admitted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalSign {
    pub id: String,
    pub patient_id: String,
    pub heart_rate: Option<i32>,
    pub respiratory_rate: Option<i32>,
    pub temperature_c: Option<f64>,
    pub systolic_bp: Option<i32>,
    pub diastolic_bp: Option<i32>,
    pub spo2: Option<i32>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabResult {
    pub id: String,
    pub patient_id: String,
    pub test_name: String,
    pub value: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    /// e.g. "H", "L", "HH" — absent when within range.
    pub abnormal_flag: Option<String>,
    pub resulted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationOrder {
    pub id: String,
    pub patient_id: String,
    pub medication_name: String,
    pub dose: String,
    pub route: String,
    pub frequency: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalNote {
    pub id: String,
    pub patient_id: String,
    pub author_id: String,
    pub note_type: String,
    pub content: String,
    pub signed: bool,
    pub signed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagingStudy {
    pub id: String,
    pub patient_id: String,
    pub modality: String,
    pub body_site: Option<String>,
    pub impression: Option<String>,
    pub status: String,
    pub performed_at: Option<DateTime<Utc>>,
}

/// A clinical order awaiting electronic signature. Nothing is active until
/// a clinician signs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedOrder {
    pub id: String,
    pub hospital_id: String,
    pub patient_id: String,
    pub order_type: String,
    pub name: String,
    pub priority: String,
    pub rationale: Option<String>,
    pub status: String,
    pub staged_by: Option<String>,
    pub signed_by: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields the client supplies when staging an order; ids and timestamps
/// are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStagedOrder {
    pub hospital_id: String,
    pub patient_id: String,
    pub order_type: String,
    pub name: String,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub prescriber_id: String,
    pub medication_name: String,
    pub dose: String,
    pub frequency: String,
    pub status: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultRequest {
    pub id: String,
    pub hospital_id: String,
    pub patient_id: String,
    pub specialty: String,
    pub question: String,
    pub priority: String,
    pub status: String,
    pub requested_by: String,
    pub responded_by: Option<String>,
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamChannel {
    pub id: String,
    pub hospital_id: String,
    pub name: String,
    pub channel_type: String,
    pub patient_id: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMessage {
    pub id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceState {
    pub user_id: String,
    pub hospital_id: String,
    pub status: String,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub provider_id: String,
    pub clinic: String,
    pub reason: Option<String>,
    pub status: String,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encounter {
    pub id: String,
    pub hospital_id: String,
    pub patient_id: String,
    pub encounter_type: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub disposition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Immunization {
    pub id: String,
    pub patient_id: String,
    pub vaccine: String,
    pub administered_at: DateTime<Utc>,
    pub lot_number: Option<String>,
    pub site: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteTemplate {
    pub id: String,
    pub hospital_id: Option<String>,
    pub name: String,
    pub note_type: String,
    pub body: String,
}

/// Everything the chart view needs for one patient, fetched in one pass.
#[derive(Debug, Clone)]
pub struct PatientChart {
    pub patient: Patient,
    pub vitals: Vec<VitalSign>,
    pub labs: Vec<LabResult>,
    pub medications: Vec<MedicationOrder>,
    pub notes: Vec<ClinicalNote>,
    pub imaging: Vec<ImagingStudy>,
}
