use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Appeal {
    pub id: Uuid,
    pub student_id: Uuid,
    pub sender_type: String,
    pub sender_telegram_user_id: i64,
    pub sender_phone: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAppeal {
    pub student_id: Uuid,
    pub sender_type: &'static str,
    pub sender_telegram_user_id: i64,
    pub sender_phone: Option<String>,
    pub text: String,
}
