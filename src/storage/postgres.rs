use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::storage::traits::{EventStore, TaskLedger};
use crate::types::{Event, MessageType, TaskRecord, TaskStatus};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../../migrations/V001__initial_schema.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresStore {
    async fn append(&self, plan_id: &str, worker_name: &str, task_id: &str, event: &Event) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (plan_id, worker_name, task_id, role, message, message_type, from_worker, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(plan_id)
        .bind(worker_name)
        .bind(task_id)
        .bind(&event.role)
        .bind(&event.content)
        .bind(event.message_type.as_str())
        .bind(&event.from_worker)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn retrieve_recent(
        &self,
        plan_id: &str,
        worker_name: &str,
        task_id: &str,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            r#"
            SELECT role, message, message_type, from_worker, created_at
            FROM (
                SELECT id, role, message, message_type, from_worker, created_at
                FROM events
                WHERE plan_id = $1 AND worker_name = $2 AND task_id = $3
                ORDER BY id DESC
                LIMIT $4
            ) recent
            ORDER BY id ASC
            "#,
        )
        .bind(plan_id)
        .bind(worker_name)
        .bind(task_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

#[async_trait]
impl TaskLedger for PostgresStore {
    async fn exists(&self, plan_id: &str, task_id: &str, worker_name: &str, task: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 AS found
            FROM task_records
            WHERE plan_id = $1 AND task_id = $2 AND worker_name = $3 AND task = $4
            "#,
        )
        .bind(plan_id)
        .bind(task_id)
        .bind(worker_name)
        .bind(task)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn insert(&self, record: &TaskRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO task_records (plan_id, task_id, worker_name, task, status, detail, audit, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (plan_id, task_id, worker_name, task)
            DO UPDATE SET status = EXCLUDED.status, detail = EXCLUDED.detail,
                          audit = EXCLUDED.audit, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.plan_id)
        .bind(&record.task_id)
        .bind(&record.worker_name)
        .bind(&record.task)
        .bind(record.status.as_str())
        .bind(&record.detail)
        .bind(&record.audit)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(
        &self,
        plan_id: &str,
        task_id: &str,
        worker_name: &str,
        task: &str,
        status: TaskStatus,
        detail: &str,
        audit: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE task_records
            SET status = $5, detail = $6, audit = $7, updated_at = NOW()
            WHERE plan_id = $1 AND task_id = $2 AND worker_name = $3 AND task = $4
            "#,
        )
        .bind(plan_id)
        .bind(task_id)
        .bind(worker_name)
        .bind(task)
        .bind(status.as_str())
        .bind(detail)
        .bind(audit)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn retrieve_all(&self, plan_id: &str, task_id: &str) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT plan_id, task_id, worker_name, task, status, detail, audit, updated_at
            FROM task_records
            WHERE plan_id = $1 AND task_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(plan_id)
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_event(row: &PgRow) -> Result<Event> {
    let message_type: String = row.try_get("message_type")?;
    Ok(Event {
        message_type: MessageType::from_str(&message_type)
            .ok_or_else(|| anyhow::anyhow!("Unknown message type '{}'", message_type))?,
        role: row.try_get("role")?,
        content: row.try_get("message")?,
        from_worker: row.try_get("from_worker")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_record(row: &PgRow) -> Result<TaskRecord> {
    let status: String = row.try_get("status")?;
    Ok(TaskRecord {
        plan_id: row.try_get("plan_id")?,
        task_id: row.try_get("task_id")?,
        worker_name: row.try_get("worker_name")?,
        task: row.try_get("task")?,
        status: TaskStatus::from_str(&status)
            .ok_or_else(|| anyhow::anyhow!("Unknown task status '{}'", status))?,
        detail: row.try_get("detail")?,
        audit: row.try_get("audit")?,
        updated_at: row.try_get("updated_at")?,
    })
}
