//! Persistence boundary for access windows and submissions.
//!
//! The state machine only talks to this trait. Every state transition is a
//! single conditional update (or one transaction), so implementations decide
//! races, never the callers.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::access_window::{AccessWindow, ActiveWindow, NewAccessWindow};
use crate::models::submission::{NewSubmission, Submission};
use crate::models::test::Test;

#[cfg(test)]
pub use memory::MemoryWindowStore;
pub use postgres::PgWindowStore;

#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Newest usable window of the student whose test is active.
    async fn find_active_window(&self, student_id: Uuid, now: DateTime<Utc>) -> Result<Option<ActiveWindow>>;

    async fn get_window(&self, window_id: Uuid) -> Result<Option<AccessWindow>>;

    /// Sets `opened_at` only if it is still null and the window is usable at `now`.
    /// Returns whether this call performed the transition.
    async fn mark_opened(&self, window_id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    /// Clears `opened_at` on a window that has not been submitted.
    async fn reset_opened(&self, window_id: Uuid) -> Result<()>;

    async fn find_window_for_submit(
        &self,
        window_id: Uuid,
        student_id: Uuid,
        test_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ActiveWindow>>;

    /// Closes the window and writes the submission, its details and an audit row
    /// atomically. `None` means the window was already closed and nothing was written.
    async fn commit_submission(&self, submission: NewSubmission) -> Result<Option<Submission>>;

    async fn get_test(&self, test_id: Uuid) -> Result<Option<Test>>;

    async fn student_in_curator_groups(&self, student_id: Uuid, curator_id: Uuid) -> Result<bool>;

    /// Inserts a window unless an active window for the same student and test
    /// overlaps it, in which case `Error::Conflict` is returned.
    async fn create_window(&self, window: NewAccessWindow) -> Result<AccessWindow>;

    /// Deactivates a window that has not been submitted. Returns whether a row changed.
    async fn deactivate_window(&self, window_id: Uuid, actor_id: Option<Uuid>) -> Result<bool>;

    async fn list_windows_for_student(&self, student_id: Uuid) -> Result<Vec<AccessWindow>>;
}
