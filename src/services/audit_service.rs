use crate::error::Result;
use crate::models::audit_log::AuditLog;
use sqlx::{Executor, Postgres};
use uuid::Uuid;

pub struct AuditService;

impl AuditService {
    /// Writes an audit row on whatever executor the caller is using, so state
    /// transitions can log inside their own transaction.
    pub async fn record<'c, E>(
        executor: E,
        actor_id: Option<Uuid>,
        action: &str,
        entity: &str,
        entity_id: Uuid,
    ) -> Result<AuditLog>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (actor_id, action, entity, entity_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, actor_id, action, entity, entity_id, created_at
            "#,
        )
        .bind(actor_id)
        .bind(action)
        .bind(entity)
        .bind(entity_id)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }
}
