use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::access_window::{AccessWindow, WindowState};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_interval"))]
pub struct CreateAccessWindowPayload {
    pub student_id: Uuid,
    pub test_id: Uuid,
    pub open_from: DateTime<Utc>,
    pub open_to: DateTime<Utc>,
}

fn validate_interval(payload: &CreateAccessWindowPayload) -> Result<(), ValidationError> {
    if payload.open_from >= payload.open_to {
        let mut err = ValidationError::new("invalid_interval");
        err.message = Some("open_from must be earlier than open_to".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListWindowsQuery {
    pub student_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessWindowResponse {
    #[serde(flatten)]
    pub window: AccessWindow,
    pub state: WindowState,
    pub expired: bool,
}

impl AccessWindowResponse {
    pub fn at(window: AccessWindow, now: DateTime<Utc>) -> Self {
        Self {
            state: window.state(),
            expired: window.is_expired(now),
            window,
        }
    }
}
