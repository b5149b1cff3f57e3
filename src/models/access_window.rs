use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::test::Test;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessWindow {
    pub id: Uuid,
    pub student_id: Uuid,
    pub test_id: Uuid,
    pub open_from: DateTime<Utc>,
    pub open_to: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    Scheduled,
    Opened,
    Submitted,
    /// Deactivated by a curator before any submission.
    Cancelled,
}

impl AccessWindow {
    pub fn state(&self) -> WindowState {
        match (self.submitted_at, self.opened_at, self.is_active) {
            (Some(_), _, _) => WindowState::Submitted,
            (None, _, false) => WindowState::Cancelled,
            (None, Some(_), true) => WindowState::Opened,
            (None, None, true) => WindowState::Scheduled,
        }
    }

    pub fn covers(&self, now: DateTime<Utc>) -> bool {
        self.open_from <= now && now <= self.open_to
    }

    /// Content may be delivered and answers accepted only while this holds.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.submitted_at.is_none() && self.covers(now)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.submitted_at.is_none() && now > self.open_to
    }
}

/// A usable window together with the test it grants access to.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveWindow {
    pub window: AccessWindow,
    pub test: Test,
}

#[derive(Debug, Clone)]
pub struct NewAccessWindow {
    pub student_id: Uuid,
    pub test_id: Uuid,
    pub open_from: DateTime<Utc>,
    pub open_to: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}
