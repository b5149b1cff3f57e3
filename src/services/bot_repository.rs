use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::appeal::{Appeal, CreateAppeal};
use crate::models::student::{Actor, PersonType, Student, ELIGIBLE_ENROLLMENT_STATUSES, ELIGIBLE_GROUP_STATUSES};
use crate::models::submission::SubmissionSummary;
use crate::services::debt_service::{DebtService, DebtSummary};

const STUDENT_COLUMNS: &str = "s.id, s.user_id, s.full_name, s.phone, s.parent_phone, s.status";

/// Restricts a `students s` query to active students with a live enrollment.
const ELIGIBLE_FILTER: &str = r#"
    s.status = 'ACTIVE'
    AND EXISTS (
        SELECT 1
        FROM enrollments e
        JOIN groups g ON g.id = e.group_id
        WHERE e.student_id = s.id
          AND e.status = ANY($2)
          AND g.status = ANY($3)
    )
"#;

#[derive(Debug, Clone)]
pub struct EligibleStudent {
    pub person_type: PersonType,
    pub student: Student,
}

/// Reads and writes behind the conversational bot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BotRepository: Send + Sync {
    /// The linked student or parent for a Telegram account, if still eligible.
    async fn resolve_actor(&self, telegram_user_id: i64) -> Result<Option<Actor>>;

    async fn find_eligible_student_by_phone(&self, variants: &[String]) -> Result<Option<EligibleStudent>>;

    /// Returns the STUDENT user for this student, creating or relinking one as needed.
    /// A phone already owned by a staff user is a conflict.
    async fn ensure_student_user(&self, student: &Student, phone_variants: &[String]) -> Result<Uuid>;

    async fn link_user_telegram(&self, user_id: Uuid, telegram_user_id: i64) -> Result<()>;

    async fn upsert_parent_contact(&self, phone: &str, telegram_user_id: i64) -> Result<()>;

    async fn create_appeal(&self, appeal: CreateAppeal) -> Result<Appeal>;

    async fn monthly_submissions(
        &self,
        student_user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SubmissionSummary>>;

    async fn recent_submissions(&self, student_user_id: Uuid, limit: i64) -> Result<Vec<SubmissionSummary>>;

    async fn student_debt(&self, student_id: Uuid, today: NaiveDate) -> Result<DebtSummary>;
}

#[derive(Clone)]
pub struct PgBotRepository {
    pool: PgPool,
    debt: DebtService,
}

impl PgBotRepository {
    pub fn new(pool: PgPool, debt: DebtService) -> Self {
        Self { pool, debt }
    }

    async fn eligible_by_parent_phone(&self, variants: &[String]) -> Result<Option<Student>> {
        let student = sqlx::query_as::<_, Student>(&format!(
            r#"
            SELECT {STUDENT_COLUMNS}
            FROM students s
            WHERE s.parent_phone = ANY($1) AND {ELIGIBLE_FILTER}
            ORDER BY s.created_at DESC
            LIMIT 1
            "#
        ))
        .bind(variants)
        .bind(&ELIGIBLE_ENROLLMENT_STATUSES[..])
        .bind(&ELIGIBLE_GROUP_STATUSES[..])
        .fetch_optional(&self.pool)
        .await?;
        Ok(student)
    }
}

#[async_trait]
impl BotRepository for PgBotRepository {
    async fn resolve_actor(&self, telegram_user_id: i64) -> Result<Option<Actor>> {
        let student = sqlx::query_as::<_, Student>(&format!(
            r#"
            SELECT {STUDENT_COLUMNS}
            FROM users u
            JOIN students s ON s.user_id = u.id
            WHERE u.telegram_user_id = $1
              AND u.role = 'student'
              AND u.is_active = TRUE
              AND {ELIGIBLE_FILTER}
            LIMIT 1
            "#
        ))
        .bind(telegram_user_id)
        .bind(&ELIGIBLE_ENROLLMENT_STATUSES[..])
        .bind(&ELIGIBLE_GROUP_STATUSES[..])
        .fetch_optional(&self.pool)
        .await?;

        if let Some(student) = student {
            if let Some(user_id) = student.user_id {
                return Ok(Some(Actor::Student { user_id, student }));
            }
        }

        let parent_phone: Option<String> =
            sqlx::query_scalar(r#"SELECT phone FROM parent_contacts WHERE telegram_user_id = $1"#)
                .bind(telegram_user_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(phone) = parent_phone else { return Ok(None) };

        let variants = vec![phone.clone(), phone.trim_start_matches('+').to_string()];
        let child = self.eligible_by_parent_phone(&variants).await?;
        Ok(child.map(|student| Actor::Parent { student }))
    }

    async fn find_eligible_student_by_phone(&self, variants: &[String]) -> Result<Option<EligibleStudent>> {
        if variants.is_empty() {
            return Ok(None);
        }

        let own = sqlx::query_as::<_, Student>(&format!(
            r#"
            SELECT {STUDENT_COLUMNS}
            FROM students s
            WHERE s.phone = ANY($1) AND {ELIGIBLE_FILTER}
            LIMIT 1
            "#
        ))
        .bind(variants)
        .bind(&ELIGIBLE_ENROLLMENT_STATUSES[..])
        .bind(&ELIGIBLE_GROUP_STATUSES[..])
        .fetch_optional(&self.pool)
        .await?;

        if let Some(student) = own {
            return Ok(Some(EligibleStudent {
                person_type: PersonType::Student,
                student,
            }));
        }

        Ok(self
            .eligible_by_parent_phone(variants)
            .await?
            .map(|student| EligibleStudent {
                person_type: PersonType::Parent,
                student,
            }))
    }

    async fn ensure_student_user(&self, student: &Student, phone_variants: &[String]) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;

        let mut existing: Option<(Uuid, String)> = None;
        if let Some(user_id) = student.user_id {
            existing = sqlx::query_as(r#"SELECT id, role FROM users WHERE id = $1"#)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        }
        if existing.is_none() {
            existing = sqlx::query_as(
                r#"SELECT id, role FROM users WHERE phone = ANY($1) ORDER BY created_at DESC LIMIT 1"#,
            )
            .bind(phone_variants)
            .fetch_optional(&mut *tx)
            .await?;
        }

        let active = student.status == "ACTIVE";
        let user_id = match existing {
            Some((_, role)) if role != "student" => {
                return Err(Error::Conflict("Phone number belongs to another role".to_string()));
            }
            Some((user_id, _)) => {
                sqlx::query(r#"UPDATE users SET role = 'student', phone = $2, is_active = $3 WHERE id = $1"#)
                    .bind(user_id)
                    .bind(&student.phone)
                    .bind(active)
                    .execute(&mut *tx)
                    .await?;
                user_id
            }
            None => {
                sqlx::query_scalar(
                    r#"INSERT INTO users (role, phone, is_active) VALUES ('student', $1, $2) RETURNING id"#,
                )
                .bind(&student.phone)
                .bind(active)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        if student.user_id != Some(user_id) {
            sqlx::query(r#"UPDATE students SET user_id = $2 WHERE id = $1"#)
                .bind(student.id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(user_id)
    }

    async fn link_user_telegram(&self, user_id: Uuid, telegram_user_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        // A Telegram account can belong to one user only.
        sqlx::query(r#"UPDATE users SET telegram_user_id = NULL WHERE telegram_user_id = $1 AND id <> $2"#)
            .bind(telegram_user_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r#"UPDATE users SET telegram_user_id = $2, is_active = TRUE WHERE id = $1"#)
            .bind(user_id)
            .bind(telegram_user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_parent_contact(&self, phone: &str, telegram_user_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let by_phone: Option<Uuid> = sqlx::query_scalar(r#"SELECT id FROM parent_contacts WHERE phone = $1"#)
            .bind(phone)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(id) = by_phone {
            sqlx::query(r#"DELETE FROM parent_contacts WHERE telegram_user_id = $1 AND id <> $2"#)
                .bind(telegram_user_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(r#"UPDATE parent_contacts SET telegram_user_id = $2, updated_at = NOW() WHERE id = $1"#)
                .bind(id)
                .bind(telegram_user_id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO parent_contacts (phone, telegram_user_id)
                VALUES ($1, $2)
                ON CONFLICT (telegram_user_id) DO UPDATE SET phone = EXCLUDED.phone, updated_at = NOW()
                "#,
            )
            .bind(phone)
            .bind(telegram_user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn create_appeal(&self, appeal: CreateAppeal) -> Result<Appeal> {
        let row = sqlx::query_as::<_, Appeal>(
            r#"
            INSERT INTO appeals (student_id, sender_type, sender_telegram_user_id, sender_phone, text)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, student_id, sender_type, sender_telegram_user_id, sender_phone, text, created_at
            "#,
        )
        .bind(appeal.student_id)
        .bind(appeal.sender_type)
        .bind(appeal.sender_telegram_user_id)
        .bind(&appeal.sender_phone)
        .bind(&appeal.text)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn monthly_submissions(
        &self,
        student_user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SubmissionSummary>> {
        let rows = sqlx::query_as::<_, SubmissionSummary>(
            r#"
            SELECT s.id, s.score, t.total_questions, t.lesson_number, t.title AS test_title, s.created_at
            FROM submissions s
            JOIN tests t ON t.id = s.test_id
            WHERE s.student_id = $1
              AND s.created_at >= $2
              AND s.created_at < $3
            ORDER BY s.created_at DESC
            LIMIT 50
            "#,
        )
        .bind(student_user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn recent_submissions(&self, student_user_id: Uuid, limit: i64) -> Result<Vec<SubmissionSummary>> {
        let rows = sqlx::query_as::<_, SubmissionSummary>(
            r#"
            SELECT s.id, s.score, t.total_questions, t.lesson_number, t.title AS test_title, s.created_at
            FROM submissions s
            JOIN tests t ON t.id = s.test_id
            WHERE s.student_id = $1
            ORDER BY s.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(student_user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn student_debt(&self, student_id: Uuid, today: NaiveDate) -> Result<DebtSummary> {
        self.debt.student_debt(student_id, today).await
    }
}
