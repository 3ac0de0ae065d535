//! Care-team messaging: direct messages, team channels, presence.

use chrono::Utc;
use serde_json::json;

use super::client::{eq, RecordsClient, RecordsError};
use super::types::{DirectMessage, PresenceState, TeamChannel, TeamMessage};

impl RecordsClient {
    /// Both directions of a one-to-one thread, oldest first.
    pub async fn list_direct_messages(
        &self,
        user_id: &str,
        peer_id: &str,
    ) -> Result<Vec<DirectMessage>, RecordsError> {
        self.select(
            "direct_messages",
            &[
                (
                    "or",
                    format!(
                        "(and(sender_id.eq.{user_id},recipient_id.eq.{peer_id}),\
                         and(sender_id.eq.{peer_id},recipient_id.eq.{user_id}))"
                    ),
                ),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    pub async fn send_direct_message(
        &self,
        sender_id: &str,
        recipient_id: &str,
        body: &str,
    ) -> Result<DirectMessage, RecordsError> {
        let row = json!({
            "sender_id": sender_id,
            "recipient_id": recipient_id,
            "body": body,
        });
        self.insert("direct_messages", &row).await
    }

    pub async fn mark_direct_messages_read(
        &self,
        recipient_id: &str,
        peer_id: &str,
    ) -> Result<(), RecordsError> {
        let patch = json!({ "read_at": Utc::now() });
        let _: Vec<DirectMessage> = self
            .update(
                "direct_messages",
                &[
                    eq("recipient_id", recipient_id),
                    eq("sender_id", peer_id),
                    ("read_at", "is.null".to_string()),
                ],
                &patch,
            )
            .await?;
        Ok(())
    }

    pub async fn list_team_channels(
        &self,
        hospital_id: &str,
    ) -> Result<Vec<TeamChannel>, RecordsError> {
        self.select(
            "team_channels",
            &[
                eq("hospital_id", hospital_id),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    pub async fn list_team_messages(
        &self,
        channel_id: &str,
    ) -> Result<Vec<TeamMessage>, RecordsError> {
        self.select(
            "team_messages",
            &[
                eq("channel_id", channel_id),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    pub async fn send_team_message(
        &self,
        channel_id: &str,
        sender_id: &str,
        body: &str,
    ) -> Result<TeamMessage, RecordsError> {
        let row = json!({
            "channel_id": channel_id,
            "sender_id": sender_id,
            "body": body,
        });
        self.insert("team_messages", &row).await
    }

    /// Presence heartbeat. One row per user per hospital, refreshed on a
    /// timer while the console is open.
    pub async fn upsert_presence(
        &self,
        user_id: &str,
        hospital_id: &str,
        status: &str,
    ) -> Result<PresenceState, RecordsError> {
        let row = json!({
            "user_id": user_id,
            "hospital_id": hospital_id,
            "status": status,
            "last_seen_at": Utc::now(),
        });
        self.upsert("presence_states", "user_id,hospital_id", &row).await
    }

    pub async fn list_presence(
        &self,
        hospital_id: &str,
    ) -> Result<Vec<PresenceState>, RecordsError> {
        self.select(
            "presence_states",
            &[
                eq("hospital_id", hospital_id),
                ("order", "last_seen_at.desc".to_string()),
            ],
        )
        .await
    }
}
