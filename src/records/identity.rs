//! Profiles and hospital memberships.

use super::client::{eq, RecordsClient, RecordsError};
use super::types::{Hospital, HospitalUser, Profile};

impl RecordsClient {
    pub async fn list_memberships(
        &self,
        user_id: &str,
    ) -> Result<Vec<HospitalUser>, RecordsError> {
        self.select(
            "hospital_users",
            &[eq("user_id", user_id), eq("active", "true")],
        )
        .await
    }

    pub async fn list_hospitals(&self, ids: &[String]) -> Result<Vec<Hospital>, RecordsError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            "hospitals",
            &[
                ("id", format!("in.({})", ids.join(","))),
                ("order", "name.asc".to_string()),
            ],
        )
        .await
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Profile, RecordsError> {
        let mut rows: Vec<Profile> = self.select("profiles", &[eq("user_id", user_id)]).await?;
        if rows.is_empty() {
            return Err(RecordsError::EmptyResult);
        }
        Ok(rows.remove(0))
    }
}
