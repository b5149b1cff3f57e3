use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::WindowStore;
use crate::error::{Error, Result};
use crate::models::access_window::{AccessWindow, ActiveWindow, NewAccessWindow};
use crate::models::audit_log::actions;
use crate::models::student::{ELIGIBLE_ENROLLMENT_STATUSES, ELIGIBLE_GROUP_STATUSES};
use crate::models::submission::{NewSubmission, Submission};
use crate::models::test::{Test, TestImage};
use crate::services::audit_service::AuditService;

const WINDOW_COLUMNS: &str =
    "id, student_id, test_id, open_from, open_to, opened_at, submitted_at, is_active, created_by, created_at";

#[derive(Clone)]
pub struct PgWindowStore {
    pool: PgPool,
}

impl PgWindowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn test_with_images(&self, test_id: Uuid) -> Result<Option<Test>> {
        let test = sqlx::query_as::<_, Test>(
            r#"
            SELECT id, title, lesson_number, total_questions, answer_key,
                   telegram_group_link, is_active, created_at
            FROM tests WHERE id = $1
            "#,
        )
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(mut test) = test else { return Ok(None) };
        test.images = sqlx::query_as::<_, TestImage>(
            r#"SELECT image_url, page_number FROM test_images WHERE test_id = $1 ORDER BY page_number ASC"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(test))
    }

    async fn with_test(&self, window: Option<AccessWindow>) -> Result<Option<ActiveWindow>> {
        let Some(window) = window else { return Ok(None) };
        let Some(test) = self.test_with_images(window.test_id).await? else {
            return Ok(None);
        };
        Ok(Some(ActiveWindow { window, test }))
    }
}

#[async_trait]
impl WindowStore for PgWindowStore {
    async fn find_active_window(&self, student_id: Uuid, now: DateTime<Utc>) -> Result<Option<ActiveWindow>> {
        let window = sqlx::query_as::<_, AccessWindow>(
            r#"
            SELECT aw.id, aw.student_id, aw.test_id, aw.open_from, aw.open_to, aw.opened_at,
                   aw.submitted_at, aw.is_active, aw.created_by, aw.created_at
            FROM access_windows aw
            JOIN tests t ON t.id = aw.test_id
            WHERE aw.student_id = $1
              AND aw.is_active = TRUE
              AND aw.open_from <= $2
              AND aw.open_to >= $2
              AND t.is_active = TRUE
            ORDER BY aw.open_from DESC
            LIMIT 1
            "#,
        )
        .bind(student_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        self.with_test(window).await
    }

    async fn get_window(&self, window_id: Uuid) -> Result<Option<AccessWindow>> {
        let window = sqlx::query_as::<_, AccessWindow>(&format!(
            "SELECT {} FROM access_windows WHERE id = $1",
            WINDOW_COLUMNS
        ))
        .bind(window_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(window)
    }

    async fn mark_opened(&self, window_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE access_windows
            SET opened_at = $2
            WHERE id = $1
              AND opened_at IS NULL
              AND submitted_at IS NULL
              AND is_active = TRUE
              AND open_from <= $2
              AND open_to >= $2
            "#,
        )
        .bind(window_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset_opened(&self, window_id: Uuid) -> Result<()> {
        sqlx::query(r#"UPDATE access_windows SET opened_at = NULL WHERE id = $1 AND submitted_at IS NULL"#)
            .bind(window_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_window_for_submit(
        &self,
        window_id: Uuid,
        student_id: Uuid,
        test_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ActiveWindow>> {
        let window = sqlx::query_as::<_, AccessWindow>(&format!(
            r#"
            SELECT {} FROM access_windows
            WHERE id = $1
              AND student_id = $2
              AND test_id = $3
              AND is_active = TRUE
              AND submitted_at IS NULL
              AND open_from <= $4
              AND open_to >= $4
            "#,
            WINDOW_COLUMNS
        ))
        .bind(window_id)
        .bind(student_id)
        .bind(test_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        self.with_test(window).await
    }

    async fn commit_submission(&self, submission: NewSubmission) -> Result<Option<Submission>> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query(
            r#"
            UPDATE access_windows
            SET submitted_at = $4, is_active = FALSE, open_to = $4
            WHERE id = $1
              AND student_id = $2
              AND test_id = $3
              AND is_active = TRUE
              AND submitted_at IS NULL
            "#,
        )
        .bind(submission.window_id)
        .bind(submission.student_id)
        .bind(submission.test_id)
        .bind(submission.submitted_at)
        .execute(&mut *tx)
        .await?;

        if locked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let created = sqlx::query_as::<_, Submission>(
            r#"
            INSERT INTO submissions (student_id, test_id, window_id, raw_answer_text, parsed_answers, score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, student_id, test_id, window_id, raw_answer_text, parsed_answers, score, created_at
            "#,
        )
        .bind(submission.student_id)
        .bind(submission.test_id)
        .bind(submission.window_id)
        .bind(&submission.raw_answer_text)
        .bind(sqlx::types::Json(&submission.parsed_answers))
        .bind(submission.score)
        .bind(submission.submitted_at)
        .fetch_one(&mut *tx)
        .await?;

        let numbers: Vec<i32> = submission.details.iter().map(|d| d.question_number).collect();
        let given: Vec<Option<String>> = submission.details.iter().map(|d| d.given_answer.clone()).collect();
        let correct: Vec<String> = submission.details.iter().map(|d| d.correct_answer.clone()).collect();
        let flags: Vec<bool> = submission.details.iter().map(|d| d.is_correct).collect();

        sqlx::query(
            r#"
            INSERT INTO submission_details (submission_id, question_number, given_answer, correct_answer, is_correct)
            SELECT $1, * FROM UNNEST($2::int4[], $3::text[], $4::text[], $5::bool[])
            "#,
        )
        .bind(created.id)
        .bind(&numbers)
        .bind(&given)
        .bind(&correct)
        .bind(&flags)
        .execute(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            Some(submission.student_id),
            actions::SUBMIT,
            "Submission",
            created.id,
        )
        .await?;

        tx.commit().await?;
        Ok(Some(created))
    }

    async fn get_test(&self, test_id: Uuid) -> Result<Option<Test>> {
        self.test_with_images(test_id).await
    }

    async fn student_in_curator_groups(&self, student_id: Uuid, curator_id: Uuid) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM students s
                JOIN enrollments e ON e.student_id = s.id
                JOIN groups g ON g.id = e.group_id
                WHERE s.user_id = $1
                  AND s.status = 'ACTIVE'
                  AND e.status = ANY($3)
                  AND g.status = ANY($4)
                  AND g.curator_id = $2
            )
            "#,
        )
        .bind(student_id)
        .bind(curator_id)
        .bind(&ELIGIBLE_ENROLLMENT_STATUSES[..])
        .bind(&ELIGIBLE_GROUP_STATUSES[..])
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn create_window(&self, window: NewAccessWindow) -> Result<AccessWindow> {
        let mut tx = self.pool.begin().await?;

        // Serialises concurrent creations for the same student and test.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text || ':' || $2::text))")
            .bind(window.student_id)
            .bind(window.test_id)
            .execute(&mut *tx)
            .await?;

        let overlapping: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM access_windows
                WHERE student_id = $1
                  AND test_id = $2
                  AND is_active = TRUE
                  AND open_from <= $4
                  AND open_to >= $3
            )
            "#,
        )
        .bind(window.student_id)
        .bind(window.test_id)
        .bind(window.open_from)
        .bind(window.open_to)
        .fetch_one(&mut *tx)
        .await?;

        if overlapping {
            tx.rollback().await?;
            return Err(Error::Conflict(
                "An active window for this student and test already overlaps the requested interval".to_string(),
            ));
        }

        let created = sqlx::query_as::<_, AccessWindow>(&format!(
            r#"
            INSERT INTO access_windows (student_id, test_id, open_from, open_to, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            WINDOW_COLUMNS
        ))
        .bind(window.student_id)
        .bind(window.test_id)
        .bind(window.open_from)
        .bind(window.open_to)
        .bind(window.created_by)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(&mut *tx, window.created_by, actions::CREATE, "AccessWindow", created.id).await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn deactivate_window(&self, window_id: Uuid, actor_id: Option<Uuid>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"UPDATE access_windows SET is_active = FALSE WHERE id = $1 AND is_active = TRUE AND submitted_at IS NULL"#,
        )
        .bind(window_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        AuditService::record(&mut *tx, actor_id, actions::DEACTIVATE, "AccessWindow", window_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn list_windows_for_student(&self, student_id: Uuid) -> Result<Vec<AccessWindow>> {
        let rows = sqlx::query_as::<_, AccessWindow>(&format!(
            "SELECT {} FROM access_windows WHERE student_id = $1 ORDER BY open_from DESC LIMIT 100",
            WINDOW_COLUMNS
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
