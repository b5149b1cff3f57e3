use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const ELIGIBLE_GROUP_STATUSES: [&str; 3] = ["PLANNED", "OPEN", "STARTED"];
pub const ELIGIBLE_ENROLLMENT_STATUSES: [&str; 2] = ["TRIAL", "ACTIVE"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Student {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub full_name: String,
    pub phone: String,
    pub parent_phone: Option<String>,
    pub status: String,
}

/// Who is talking to the bot.
#[derive(Debug, Clone)]
pub enum Actor {
    Student { user_id: Uuid, student: Student },
    Parent { student: Student },
}

impl Actor {
    pub fn student(&self) -> &Student {
        match self {
            Actor::Student { student, .. } | Actor::Parent { student } => student,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonType {
    Student,
    Parent,
}
