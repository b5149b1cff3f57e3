use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity: String,
    pub entity_id: Uuid,
    pub created_at: DateTime<Utc>,
}

pub mod actions {
    pub const CREATE: &str = "CREATE";
    pub const SUBMIT: &str = "SUBMIT";
    pub const DEACTIVATE: &str = "DEACTIVATE";
}
