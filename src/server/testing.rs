//! In-memory doubles for the server seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::records::types::{NewStagedOrder, StagedOrder, TeamChannel};

use super::store::{
    AuditRow, CareStore, Directory, DirectoryUser, NewTeamChannelRequest, ProviderListing,
    SessionVerifier, StoreError, VerifiedUser,
};

#[derive(Default)]
pub struct MemoryStore {
    staged_orders: Mutex<Vec<StagedOrder>>,
    providers: Mutex<Vec<ProviderListing>>,
    provider_hospitals: Mutex<Vec<String>>,
    channels: Mutex<Vec<TeamChannel>>,
    channel_members: Mutex<Vec<(String, String)>>,
    audit_rows: Mutex<Vec<AuditRow>>,
    admins: Mutex<Vec<String>>,
    fail_next: AtomicBool,
}

impl MemoryStore {
    pub fn staged_orders(&self) -> Vec<StagedOrder> {
        self.staged_orders.lock().unwrap().clone()
    }

    pub fn channels(&self) -> Vec<TeamChannel> {
        self.channels.lock().unwrap().clone()
    }

    pub fn channel_members(&self) -> Vec<(String, String)> {
        self.channel_members.lock().unwrap().clone()
    }

    pub fn audit_rows(&self) -> Vec<AuditRow> {
        self.audit_rows.lock().unwrap().clone()
    }

    pub fn add_provider(
        &self,
        hospital_id: &str,
        user_id: &str,
        role: &str,
        specialty: Option<&str>,
    ) {
        self.providers.lock().unwrap().push(ProviderListing {
            user_id: user_id.to_string(),
            email: Some(format!("{user_id}@example.com")),
            display_name: None,
            role: role.to_string(),
            specialty: specialty.map(str::to_string),
        });
        self.provider_hospitals
            .lock()
            .unwrap()
            .push(hospital_id.to_string());
    }

    pub fn add_admin(&self, user_id: &str) {
        self.admins.lock().unwrap().push(user_id.to_string());
    }

    pub fn fail_next_insert(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn take_failure(&self) -> Result<(), StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Http {
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CareStore for MemoryStore {
    async fn insert_staged_order(&self, order: NewStagedOrder) -> Result<StagedOrder, StoreError> {
        self.take_failure()?;
        let now = Utc::now();
        let staged = StagedOrder {
            id: Uuid::new_v4().to_string(),
            hospital_id: order.hospital_id,
            patient_id: order.patient_id,
            order_type: order.order_type,
            name: order.name,
            priority: order.priority,
            rationale: order.rationale,
            status: order.status,
            staged_by: order.staged_by,
            signed_by: None,
            signed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.staged_orders.lock().unwrap().push(staged.clone());
        Ok(staged)
    }

    async fn list_providers(&self, hospital_id: &str) -> Result<Vec<ProviderListing>, StoreError> {
        self.take_failure()?;
        let providers = self.providers.lock().unwrap();
        let hospitals = self.provider_hospitals.lock().unwrap();
        Ok(providers
            .iter()
            .zip(hospitals.iter())
            .filter(|(_, h)| h.as_str() == hospital_id)
            .map(|(p, _)| p.clone())
            .collect())
    }

    async fn create_team_channel(
        &self,
        request: NewTeamChannelRequest,
        creator_id: &str,
    ) -> Result<TeamChannel, StoreError> {
        self.take_failure()?;
        let channel = TeamChannel {
            id: Uuid::new_v4().to_string(),
            hospital_id: request.hospital_id,
            name: request.name,
            channel_type: request.channel_type,
            patient_id: request.patient_id,
            created_by: creator_id.to_string(),
            created_at: Utc::now(),
        };
        self.channels.lock().unwrap().push(channel.clone());
        self.channel_members
            .lock()
            .unwrap()
            .push((channel.id.clone(), creator_id.to_string()));
        Ok(channel)
    }

    async fn insert_audit_event(&self, row: AuditRow) -> Result<(), StoreError> {
        self.take_failure()?;
        self.audit_rows.lock().unwrap().push(row);
        Ok(())
    }

    async fn is_admin(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.admins.lock().unwrap().iter().any(|u| u == user_id))
    }
}

#[derive(Default)]
pub struct MemorySessions {
    tokens: Mutex<HashMap<String, VerifiedUser>>,
}

impl MemorySessions {
    pub fn add_token(&self, token: &str, user_id: &str) {
        self.tokens.lock().unwrap().insert(
            token.to_string(),
            VerifiedUser {
                user_id: user_id.to_string(),
                email: Some(format!("{user_id}@example.com")),
            },
        );
    }
}

#[async_trait]
impl SessionVerifier for MemorySessions {
    async fn verify(&self, bearer: &str) -> Result<Option<VerifiedUser>, StoreError> {
        Ok(self.tokens.lock().unwrap().get(bearer).cloned())
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    users: Mutex<Vec<DirectoryUser>>,
    invites: Mutex<Vec<String>>,
}

impl MemoryDirectory {
    pub fn add_user(&self, id: &str, email: &str) {
        self.users.lock().unwrap().push(DirectoryUser {
            id: id.to_string(),
            email: Some(email.to_string()),
            disabled: false,
        });
    }

    pub fn invites(&self) -> Vec<String> {
        self.invites.lock().unwrap().clone()
    }

    pub fn users(&self) -> Vec<DirectoryUser> {
        self.users.lock().unwrap().clone()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, StoreError> {
        Ok(self.users.lock().unwrap().clone())
    }

    async fn create_user(&self, email: &str, _metadata: Value) -> Result<DirectoryUser, StoreError> {
        let user = DirectoryUser {
            id: Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
            disabled: false,
        };
        self.users.lock().unwrap().push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, user_id: &str, _updates: Value) -> Result<DirectoryUser, StoreError> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
    }

    async fn deactivate_user(&self, user_id: &str) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap();
        match users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.disabled = true;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("user {user_id}"))),
        }
    }

    async fn resend_invite(&self, email: &str) -> Result<(), StoreError> {
        self.invites.lock().unwrap().push(email.to_string());
        Ok(())
    }
}
