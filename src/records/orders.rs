//! Staged orders: stage, list, sign, discontinue.

use chrono::Utc;
use serde_json::json;

use super::client::{eq, RecordsClient, RecordsError};
use super::types::{NewStagedOrder, StagedOrder};

pub const ORDER_STATUS_STAGED: &str = "staged";
pub const ORDER_STATUS_SIGNED: &str = "signed";
pub const ORDER_STATUS_DISCONTINUED: &str = "discontinued";

impl RecordsClient {
    pub async fn list_staged_orders(
        &self,
        hospital_id: &str,
    ) -> Result<Vec<StagedOrder>, RecordsError> {
        self.select(
            "staged_orders",
            &[
                eq("hospital_id", hospital_id),
                eq("status", ORDER_STATUS_STAGED),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    pub async fn list_patient_orders(
        &self,
        patient_id: &str,
    ) -> Result<Vec<StagedOrder>, RecordsError> {
        self.select(
            "staged_orders",
            &[
                eq("patient_id", patient_id),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    pub async fn stage_order(&self, order: &NewStagedOrder) -> Result<StagedOrder, RecordsError> {
        self.insert("staged_orders", order).await
    }

    /// Electronic signature: flips the row to signed and stamps the
    /// signer. The order only becomes active in the hospital's systems
    /// once this lands.
    pub async fn sign_order(
        &self,
        order_id: &str,
        signer_id: &str,
    ) -> Result<StagedOrder, RecordsError> {
        let patch = json!({
            "status": ORDER_STATUS_SIGNED,
            "signed_by": signer_id,
            "signed_at": Utc::now(),
        });
        let mut rows: Vec<StagedOrder> = self
            .update("staged_orders", &[eq("id", order_id)], &patch)
            .await?;
        if rows.is_empty() {
            return Err(RecordsError::EmptyResult);
        }
        Ok(rows.remove(0))
    }

    pub async fn discontinue_order(&self, order_id: &str) -> Result<StagedOrder, RecordsError> {
        let patch = json!({ "status": ORDER_STATUS_DISCONTINUED });
        let mut rows: Vec<StagedOrder> = self
            .update("staged_orders", &[eq("id", order_id)], &patch)
            .await?;
        if rows.is_empty() {
            return Err(RecordsError::EmptyResult);
        }
        Ok(rows.remove(0))
    }
}
