//! Session-scoped application context.
//!
//! There is no global state: the context is built once after sign-in and
//! passed down by construction. Initialization order is fixed — the auth
//! session resolves first, then hospital memberships load, then a
//! hospital is selected (the configured default when it is one of the
//! user's memberships, otherwise the first membership).

use crate::auth::AuthSession;
use crate::records::types::{Hospital, HospitalUser};
use crate::records::{RecordsClient, RecordsError};

pub struct SessionContext {
    session: AuthSession,
    memberships: Vec<HospitalUser>,
    hospitals: Vec<Hospital>,
    selected_hospital: Option<String>,
    selected_patient: Option<String>,
}

impl SessionContext {
    pub async fn initialize(
        session: AuthSession,
        records: &RecordsClient,
        default_hospital: Option<&str>,
    ) -> Result<Self, RecordsError> {
        let memberships = records.list_memberships(&session.user.id).await?;
        let hospital_ids: Vec<String> = memberships
            .iter()
            .map(|m| m.hospital_id.clone())
            .collect();
        let hospitals = records.list_hospitals(&hospital_ids).await?;

        let mut context = Self {
            session,
            memberships,
            hospitals,
            selected_hospital: None,
            selected_patient: None,
        };

        let initial = default_hospital
            .filter(|id| context.is_member_of(id))
            .map(str::to_string)
            .or_else(|| context.memberships.first().map(|m| m.hospital_id.clone()));
        if let Some(id) = initial {
            context.selected_hospital = Some(id);
        }

        Ok(context)
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        session: AuthSession,
        memberships: Vec<HospitalUser>,
        hospitals: Vec<Hospital>,
    ) -> Self {
        let selected = memberships.first().map(|m| m.hospital_id.clone());
        Self {
            session,
            memberships,
            hospitals,
            selected_hospital: selected,
            selected_patient: None,
        }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn user_id(&self) -> &str {
        &self.session.user.id
    }

    pub fn hospitals(&self) -> &[Hospital] {
        &self.hospitals
    }

    pub fn selected_hospital(&self) -> Option<&str> {
        self.selected_hospital.as_deref()
    }

    pub fn selected_patient(&self) -> Option<&str> {
        self.selected_patient.as_deref()
    }

    /// The signed-in user's role at the selected hospital.
    pub fn role(&self) -> Option<&str> {
        let hospital = self.selected_hospital.as_deref()?;
        self.memberships
            .iter()
            .find(|m| m.hospital_id == hospital)
            .map(|m| m.role.as_str())
    }

    fn is_member_of(&self, hospital_id: &str) -> bool {
        self.memberships.iter().any(|m| m.hospital_id == hospital_id)
    }

    /// Switch facility. Selecting a hospital the user does not belong to
    /// is rejected; switching clears the selected patient.
    pub fn select_hospital(&mut self, hospital_id: &str) -> Result<(), String> {
        if !self.is_member_of(hospital_id) {
            return Err(format!("not a member of hospital {hospital_id}"));
        }
        self.selected_hospital = Some(hospital_id.to_string());
        self.selected_patient = None;
        Ok(())
    }

    pub fn select_patient(&mut self, patient_id: Option<String>) {
        self.selected_patient = patient_id;
    }

    /// Sign-out teardown: drop cached role, hospital, and patient
    /// selection. The caller separately revokes the session itself.
    pub fn clear(&mut self) {
        self.memberships.clear();
        self.hospitals.clear();
        self.selected_hospital = None;
        self.selected_patient = None;
    }
}
