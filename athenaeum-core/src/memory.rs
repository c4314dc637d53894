//! Memory entry shape (§3 Memory Entry, §4.9 Memory Adapter).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of the speaker in a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum MemoryRole {
    User,
    Assistant,
}

/// An append-only record of one turn, retrieved by identity and semantic
/// similarity during planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MemoryEntry {
    pub id: uuid::Uuid,
    pub identity_id: String,
    pub role: MemoryRole,
    pub text: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn user_turn(identity_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            identity_id: identity_id.into(),
            role: MemoryRole::User,
            text: text.into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn assistant_turn(identity_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            identity_id: identity_id.into(),
            role: MemoryRole::Assistant,
            text: text.into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }
}
