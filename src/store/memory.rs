use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use super::WindowStore;
use crate::error::{Error, Result};
use crate::models::access_window::{AccessWindow, ActiveWindow, NewAccessWindow};
use crate::models::audit_log::{actions, AuditLog};
use crate::models::submission::{NewSubmission, Submission, SubmissionDetail};
use crate::models::test::Test;

#[derive(Default)]
struct State {
    windows: HashMap<Uuid, AccessWindow>,
    tests: HashMap<Uuid, Test>,
    submissions: Vec<Submission>,
    details: HashMap<Uuid, Vec<SubmissionDetail>>,
    audit: Vec<AuditLog>,
    /// (student user id, curator id)
    curator_links: HashSet<(Uuid, Uuid)>,
}

/// Process-local store. Each operation runs under one lock, which gives the
/// same all-or-nothing behaviour as the conditional updates in Postgres.
#[derive(Default)]
pub struct MemoryWindowStore {
    state: Mutex<State>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("window store lock poisoned".to_string()))
    }

    pub fn insert_test(&self, test: Test) -> Result<()> {
        self.lock()?.tests.insert(test.id, test);
        Ok(())
    }

    pub fn insert_window(&self, window: AccessWindow) -> Result<()> {
        self.lock()?.windows.insert(window.id, window);
        Ok(())
    }

    pub fn assign_curator(&self, student_id: Uuid, curator_id: Uuid) -> Result<()> {
        self.lock()?.curator_links.insert((student_id, curator_id));
        Ok(())
    }

    pub fn submissions(&self) -> Result<Vec<Submission>> {
        Ok(self.lock()?.submissions.clone())
    }

    pub fn details_for(&self, submission_id: Uuid) -> Result<Vec<SubmissionDetail>> {
        Ok(self.lock()?.details.get(&submission_id).cloned().unwrap_or_default())
    }

    pub fn audit_log(&self) -> Result<Vec<AuditLog>> {
        Ok(self.lock()?.audit.clone())
    }

    fn push_audit(state: &mut State, actor_id: Option<Uuid>, action: &str, entity: &str, entity_id: Uuid) {
        state.audit.push(AuditLog {
            id: Uuid::new_v4(),
            actor_id,
            action: action.to_string(),
            entity: entity.to_string(),
            entity_id,
            created_at: Utc::now(),
        });
    }

    fn attach_test(state: &State, window: Option<AccessWindow>) -> Option<ActiveWindow> {
        let window = window?;
        let test = state.tests.get(&window.test_id)?.clone();
        Some(ActiveWindow { window, test })
    }
}

#[async_trait]
impl WindowStore for MemoryWindowStore {
    async fn find_active_window(&self, student_id: Uuid, now: DateTime<Utc>) -> Result<Option<ActiveWindow>> {
        let state = self.lock()?;
        let window = state
            .windows
            .values()
            .filter(|w| w.student_id == student_id && w.is_active && w.covers(now))
            .filter(|w| state.tests.get(&w.test_id).map_or(false, |t| t.is_active))
            .max_by_key(|w| w.open_from)
            .cloned();
        Ok(Self::attach_test(&state, window))
    }

    async fn get_window(&self, window_id: Uuid) -> Result<Option<AccessWindow>> {
        Ok(self.lock()?.windows.get(&window_id).cloned())
    }

    async fn mark_opened(&self, window_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock()?;
        let Some(window) = state.windows.get_mut(&window_id) else {
            return Ok(false);
        };
        if window.opened_at.is_some() || !window.is_usable(now) {
            return Ok(false);
        }
        window.opened_at = Some(now);
        Ok(true)
    }

    async fn reset_opened(&self, window_id: Uuid) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(window) = state.windows.get_mut(&window_id) {
            if window.submitted_at.is_none() {
                window.opened_at = None;
            }
        }
        Ok(())
    }

    async fn find_window_for_submit(
        &self,
        window_id: Uuid,
        student_id: Uuid,
        test_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ActiveWindow>> {
        let state = self.lock()?;
        let window = state
            .windows
            .get(&window_id)
            .filter(|w| w.student_id == student_id && w.test_id == test_id && w.is_usable(now))
            .cloned();
        Ok(Self::attach_test(&state, window))
    }

    async fn commit_submission(&self, submission: NewSubmission) -> Result<Option<Submission>> {
        let mut state = self.lock()?;
        let Some(window) = state.windows.get_mut(&submission.window_id) else {
            return Ok(None);
        };
        if window.student_id != submission.student_id
            || window.test_id != submission.test_id
            || !window.is_active
            || window.submitted_at.is_some()
        {
            return Ok(None);
        }
        window.submitted_at = Some(submission.submitted_at);
        window.is_active = false;
        window.open_to = submission.submitted_at;

        let created = Submission {
            id: Uuid::new_v4(),
            student_id: submission.student_id,
            test_id: submission.test_id,
            window_id: submission.window_id,
            raw_answer_text: submission.raw_answer_text,
            parsed_answers: sqlx::types::Json(submission.parsed_answers),
            score: submission.score,
            created_at: submission.submitted_at,
        };
        state.details.insert(created.id, submission.details);
        state.submissions.push(created.clone());
        Self::push_audit(&mut state, Some(created.student_id), actions::SUBMIT, "Submission", created.id);
        Ok(Some(created))
    }

    async fn get_test(&self, test_id: Uuid) -> Result<Option<Test>> {
        Ok(self.lock()?.tests.get(&test_id).cloned())
    }

    async fn student_in_curator_groups(&self, student_id: Uuid, curator_id: Uuid) -> Result<bool> {
        Ok(self.lock()?.curator_links.contains(&(student_id, curator_id)))
    }

    async fn create_window(&self, window: NewAccessWindow) -> Result<AccessWindow> {
        let mut state = self.lock()?;
        let overlaps = state.windows.values().any(|w| {
            w.student_id == window.student_id
                && w.test_id == window.test_id
                && w.is_active
                && w.open_from <= window.open_to
                && w.open_to >= window.open_from
        });
        if overlaps {
            return Err(Error::Conflict(
                "An active window for this student and test already overlaps the requested interval".to_string(),
            ));
        }

        let created = AccessWindow {
            id: Uuid::new_v4(),
            student_id: window.student_id,
            test_id: window.test_id,
            open_from: window.open_from,
            open_to: window.open_to,
            opened_at: None,
            submitted_at: None,
            is_active: true,
            created_by: window.created_by,
            created_at: Utc::now(),
        };
        state.windows.insert(created.id, created.clone());
        Self::push_audit(&mut state, window.created_by, actions::CREATE, "AccessWindow", created.id);
        Ok(created)
    }

    async fn deactivate_window(&self, window_id: Uuid, actor_id: Option<Uuid>) -> Result<bool> {
        let mut state = self.lock()?;
        let Some(window) = state.windows.get_mut(&window_id) else {
            return Ok(false);
        };
        if !window.is_active || window.submitted_at.is_some() {
            return Ok(false);
        }
        window.is_active = false;
        Self::push_audit(&mut state, actor_id, actions::DEACTIVATE, "AccessWindow", window_id);
        Ok(true)
    }

    async fn list_windows_for_student(&self, student_id: Uuid) -> Result<Vec<AccessWindow>> {
        let mut rows: Vec<AccessWindow> = self
            .lock()?
            .windows
            .values()
            .filter(|w| w.student_id == student_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.open_from.cmp(&a.open_from));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tokio_test::block_on;

    fn window(now: DateTime<Utc>) -> AccessWindow {
        AccessWindow {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            test_id: Uuid::new_v4(),
            open_from: now - Duration::hours(1),
            open_to: now + Duration::hours(1),
            opened_at: None,
            submitted_at: None,
            is_active: true,
            created_by: None,
            created_at: now,
        }
    }

    #[test]
    fn mark_opened_succeeds_once() {
        let store = MemoryWindowStore::new();
        let now = Utc::now();
        let w = window(now);
        store.insert_window(w.clone()).unwrap();

        assert!(block_on(store.mark_opened(w.id, now)).unwrap());
        assert!(!block_on(store.mark_opened(w.id, now)).unwrap());
        assert!(!block_on(store.mark_opened(Uuid::new_v4(), now)).unwrap());
    }

    #[test]
    fn mark_opened_respects_interval_edges() {
        let store = MemoryWindowStore::new();
        let now = Utc::now();
        let w = window(now);
        store.insert_window(w.clone()).unwrap();

        assert!(!block_on(store.mark_opened(w.id, w.open_to + Duration::seconds(1))).unwrap());
        assert!(block_on(store.mark_opened(w.id, w.open_to)).unwrap());
    }

    #[test]
    fn reset_keeps_submitted_windows_opened() {
        let store = MemoryWindowStore::new();
        let now = Utc::now();
        let mut w = window(now);
        w.opened_at = Some(now);
        w.submitted_at = Some(now);
        store.insert_window(w.clone()).unwrap();

        block_on(store.reset_opened(w.id)).unwrap();
        let stored = block_on(store.get_window(w.id)).unwrap().unwrap();
        assert_eq!(stored.opened_at, Some(now));
    }
}
