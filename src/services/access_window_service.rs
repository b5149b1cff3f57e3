use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::access_window::{AccessWindow, ActiveWindow, NewAccessWindow};
use crate::models::submission::{NewSubmission, Submission, SubmissionDetail};
use crate::services::answer_parser::parse_answer_text;
use crate::services::scoring_service::ScoringService;
use crate::store::WindowStore;

#[derive(Debug, Clone)]
pub enum OpenOutcome {
    /// This call moved the window to OPENED; content should be delivered.
    Opened(ActiveWindow),
    /// Someone else opened it first. Not an error: the student just answers.
    AlreadyOpened(ActiveWindow),
}

impl OpenOutcome {
    pub fn active(&self) -> &ActiveWindow {
        match self {
            OpenOutcome::Opened(active) | OpenOutcome::AlreadyOpened(active) => active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub submission: Submission,
    pub score: i32,
    pub total_questions: i32,
    pub details: Vec<SubmissionDetail>,
}

#[derive(Clone)]
pub struct AccessWindowService {
    store: Arc<dyn WindowStore>,
    allow_partial: bool,
}

impl AccessWindowService {
    pub fn new(store: Arc<dyn WindowStore>, allow_partial: bool) -> Self {
        Self { store, allow_partial }
    }

    pub async fn active_window(&self, student_id: Uuid, now: DateTime<Utc>) -> Result<Option<ActiveWindow>> {
        self.store.find_active_window(student_id, now).await
    }

    pub async fn open(
        &self,
        window_id: Uuid,
        student_id: Uuid,
        test_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<OpenOutcome> {
        let Some(mut active) = self
            .store
            .find_window_for_submit(window_id, student_id, test_id, now)
            .await?
        else {
            return Err(Error::NoActiveWindow);
        };

        if self.store.mark_opened(window_id, now).await? {
            tracing::info!(%window_id, %student_id, "access window opened");
            active.window.opened_at = Some(now);
            return Ok(OpenOutcome::Opened(active));
        }

        match self.store.get_window(window_id).await? {
            Some(window) if window.is_usable(now) && window.opened_at.is_some() => {
                tracing::debug!(%window_id, "access window was already opened");
                Ok(OpenOutcome::AlreadyOpened(ActiveWindow {
                    window,
                    test: active.test,
                }))
            }
            _ => Err(Error::NoActiveWindow),
        }
    }

    /// Undoes an open whose content never reached the student.
    pub async fn rollback_open(&self, window_id: Uuid) -> Result<()> {
        self.store.reset_opened(window_id).await?;
        tracing::warn!(%window_id, "access window open rolled back");
        Ok(())
    }

    pub async fn submit(
        &self,
        window_id: Uuid,
        student_id: Uuid,
        test_id: Uuid,
        raw_text: &str,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt> {
        let Some(active) = self
            .store
            .find_window_for_submit(window_id, student_id, test_id, now)
            .await?
        else {
            return Err(self.unusable_for_submit(window_id, student_id, test_id).await?);
        };

        let total = active.test.question_count();
        let parsed = parse_answer_text(raw_text, total)?;

        if !self.allow_partial {
            let missing = parsed.missing_numbers();
            if !missing.is_empty() {
                return Err(Error::IncompleteAnswers(missing));
            }
        }

        let by_question = parsed.as_strings();
        let scored = ScoringService::score(&by_question, &active.test.answer_key, total);

        let committed = self
            .store
            .commit_submission(NewSubmission {
                window_id,
                student_id,
                test_id,
                raw_answer_text: raw_text.to_string(),
                parsed_answers: by_question,
                score: scored.score,
                details: scored.details.clone(),
                submitted_at: now,
            })
            .await?;

        let Some(submission) = committed else {
            tracing::info!(%window_id, %student_id, "duplicate submission rejected");
            return Err(Error::AlreadySubmitted);
        };

        tracing::info!(
            %window_id,
            %student_id,
            submission_id = %submission.id,
            score = scored.score,
            total,
            "submission recorded"
        );

        Ok(SubmissionReceipt {
            submission,
            score: scored.score,
            total_questions: active.test.total_questions,
            details: scored.details,
        })
    }

    /// Tells a repeated submission apart from a window that is closed or not this student's.
    async fn unusable_for_submit(&self, window_id: Uuid, student_id: Uuid, test_id: Uuid) -> Result<Error> {
        match self.store.get_window(window_id).await? {
            Some(window)
                if window.student_id == student_id
                    && window.test_id == test_id
                    && window.submitted_at.is_some() =>
            {
                tracing::info!(%window_id, %student_id, "duplicate submission rejected");
                Ok(Error::AlreadySubmitted)
            }
            _ => Ok(Error::NoActiveWindow),
        }
    }

    pub async fn schedule(
        &self,
        curator_id: Uuid,
        student_id: Uuid,
        test_id: Uuid,
        open_from: DateTime<Utc>,
        open_to: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<AccessWindow> {
        if open_from >= open_to {
            return Err(Error::BadRequest("open_from must be earlier than open_to".to_string()));
        }
        if open_to <= now {
            return Err(Error::BadRequest("open_to must be in the future".to_string()));
        }

        let test = self
            .store
            .get_test(test_id)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;
        if !test.is_active {
            return Err(Error::BadRequest("Test is not active".to_string()));
        }

        self.ensure_curates(student_id, curator_id).await?;

        let window = self
            .store
            .create_window(NewAccessWindow {
                student_id,
                test_id,
                open_from,
                open_to,
                created_by: Some(curator_id),
            })
            .await?;

        tracing::info!(window_id = %window.id, %student_id, %test_id, %curator_id, "access window scheduled");
        Ok(window)
    }

    pub async fn deactivate(&self, window_id: Uuid, curator_id: Uuid) -> Result<AccessWindow> {
        let window = self
            .store
            .get_window(window_id)
            .await?
            .ok_or_else(|| Error::NotFound("Access window not found".to_string()))?;

        self.ensure_curates(window.student_id, curator_id).await?;

        if window.submitted_at.is_some() {
            return Err(Error::Conflict("Answers were already submitted for this window".to_string()));
        }
        if !self.store.deactivate_window(window_id, Some(curator_id)).await? {
            return Err(Error::Conflict("Access window is no longer active".to_string()));
        }

        tracing::info!(%window_id, %curator_id, "access window deactivated");
        self.store
            .get_window(window_id)
            .await?
            .ok_or_else(|| Error::NotFound("Access window not found".to_string()))
    }

    pub async fn list_for_student(&self, student_id: Uuid, curator_id: Uuid) -> Result<Vec<AccessWindow>> {
        self.ensure_curates(student_id, curator_id).await?;
        self.store.list_windows_for_student(student_id).await
    }

    async fn ensure_curates(&self, student_id: Uuid, curator_id: Uuid) -> Result<()> {
        if self.store.student_in_curator_groups(student_id, curator_id).await? {
            Ok(())
        } else {
            Err(Error::Forbidden("Student is not in your groups".to_string()))
        }
    }
}
