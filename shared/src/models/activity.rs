//! Activity log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who did what, and when
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ActivityEntry {
    pub id: i64,
    pub actor: Uuid,
    /// e.g. "receive_stock", "use_stock", "adjustment"
    pub action: String,
    pub module_key: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Row written by storage
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub actor: Uuid,
    pub action: String,
    pub module_key: String,
    pub description: String,
    pub metadata: serde_json::Value,
}
