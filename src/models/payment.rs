use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// A payment row joined with the snapshot of its group.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub group_id: Option<Uuid>,
    pub month: String,
    pub amount_required: i64,
    pub amount_paid: i64,
    pub discount: i64,
    pub period_end: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub group_code: Option<String>,
    pub group_status: Option<String>,
    pub group_price: Option<i64>,
}

impl PaymentRecord {
    pub fn net_required(&self) -> i64 {
        (self.amount_required - self.discount).max(0)
    }

    pub fn base_debt(&self) -> i64 {
        (self.amount_required - self.discount - self.amount_paid).max(0)
    }

    pub fn group_status(&self) -> Option<GroupStatus> {
        self.group_status.as_deref().and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupStatus {
    Planned,
    /// Open-ended billing: debt keeps accruing monthly until the group is closed.
    Open,
    Started,
    Closed,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Planned => "PLANNED",
            GroupStatus::Open => "OPEN",
            GroupStatus::Started => "STARTED",
            GroupStatus::Closed => "CLOSED",
        }
    }
}

impl FromStr for GroupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLANNED" => Ok(GroupStatus::Planned),
            "OPEN" => Ok(GroupStatus::Open),
            "STARTED" => Ok(GroupStatus::Started),
            "CLOSED" => Ok(GroupStatus::Closed),
            other => Err(format!("unknown group status '{}'", other)),
        }
    }
}
