use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{DbError, DomainError, DomainResult};

use super::types::{ExportJob, ExportStatus};

/// Storage for the export job state machine.
///
/// Only `pending`/`processing` rows may transition; terminal rows are absorbing.
#[async_trait]
pub trait ExportJobRepository: Send + Sync {
    /// Insert a new job. Fails with `DbError::Conflict` if the family already
    /// has an in-flight job.
    async fn create_job(&self, job: &ExportJob) -> DomainResult<()>;

    async fn find_by_id(&self, id: Uuid) -> DomainResult<ExportJob>;

    /// Most recently created job for the family, any status.
    async fn find_latest_for_family(&self, family_id: Uuid) -> DomainResult<Option<ExportJob>>;

    /// The family's `pending`/`processing` job, if any.
    async fn find_in_flight_for_family(&self, family_id: Uuid) -> DomainResult<Option<ExportJob>>;

    /// Transition to `completed`. Repeating the call with identical arguments
    /// is a no-op.
    async fn complete_job(
        &self,
        id: Uuid,
        file_path: &str,
        file_size_bytes: i64,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<ExportJob>;

    /// Transition to `failed` with an operator-facing message.
    async fn fail_job(&self, id: Uuid, error_message: &str) -> DomainResult<ExportJob>;
}

pub struct SqliteExportJobRepository {
    pool: SqlitePool,
}

impl SqliteExportJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct Row {
    id: String,
    family_id: String,
    requested_by: String,
    status: String,
    file_path: Option<String>,
    file_size_bytes: Option<i64>,
    error_message: Option<String>,
    created_at: String,
    completed_at: Option<String>,
    expires_at: Option<String>,
}

fn parse_ts(value: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Internal(format!("Bad timestamp in export_jobs: {}", e)))
}

fn parse_id(value: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| DomainError::InvalidUuid(e.to_string()))
}

impl Row {
    fn into_job(self) -> DomainResult<ExportJob> {
        let status = ExportStatus::from_str(&self.status)
            .ok_or_else(|| DomainError::Internal(format!("Invalid status {} in export_jobs", self.status)))?;

        Ok(ExportJob {
            id: parse_id(&self.id)?,
            family_id: parse_id(&self.family_id)?,
            requested_by: parse_id(&self.requested_by)?,
            status,
            file_path: self.file_path,
            file_size_bytes: self.file_size_bytes,
            error_message: self.error_message,
            created_at: parse_ts(&self.created_at)?,
            completed_at: self.completed_at.as_deref().map(parse_ts).transpose()?,
            expires_at: self.expires_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, family_id, requested_by, status, file_path, file_size_bytes, error_message, created_at, completed_at, expires_at FROM export_jobs";

#[async_trait]
impl ExportJobRepository for SqliteExportJobRepository {
    async fn create_job(&self, job: &ExportJob) -> DomainResult<()> {
        let result = sqlx::query(
            "INSERT INTO export_jobs (id, family_id, requested_by, status, file_path, file_size_bytes, error_message, created_at, completed_at, expires_at) VALUES (?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(job.id.to_string())
        .bind(job.family_id.to_string())
        .bind(job.requested_by.to_string())
        .bind(job.status.as_str())
        .bind(&job.file_path)
        .bind(job.file_size_bytes)
        .bind(&job.error_message)
        .bind(job.created_at.to_rfc3339())
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .bind(job.expires_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let db_err = DbError::from(e);
                if db_err.is_unique_violation() {
                    Err(DomainError::Database(DbError::Conflict(format!(
                        "Family {} already has an export in progress",
                        job.family_id
                    ))))
                } else {
                    Err(DomainError::Database(db_err))
                }
            }
        }
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<ExportJob> {
        let row: Row = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?
            .ok_or_else(|| DomainError::EntityNotFound("ExportJob".to_string(), id))?;

        row.into_job()
    }

    async fn find_latest_for_family(&self, family_id: Uuid) -> DomainResult<Option<ExportJob>> {
        let row: Option<Row> = sqlx::query_as(&format!(
            "{} WHERE family_id = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(family_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        row.map(Row::into_job).transpose()
    }

    async fn find_in_flight_for_family(&self, family_id: Uuid) -> DomainResult<Option<ExportJob>> {
        let row: Option<Row> = sqlx::query_as(&format!(
            "{} WHERE family_id = ? AND status IN ('pending', 'processing') ORDER BY created_at DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(family_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        row.map(Row::into_job).transpose()
    }

    async fn complete_job(
        &self,
        id: Uuid,
        file_path: &str,
        file_size_bytes: i64,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<ExportJob> {
        let expires = expires_at.to_rfc3339();
        let updated = sqlx::query(
            "UPDATE export_jobs SET status = 'completed', file_path = ?, file_size_bytes = ?, expires_at = ?, error_message = NULL, completed_at = ? WHERE id = ? AND status IN ('pending', 'processing')",
        )
        .bind(file_path)
        .bind(file_size_bytes)
        .bind(&expires)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        let job = self.find_by_id(id).await?;
        if updated.rows_affected() == 1 {
            return Ok(job);
        }

        // Already terminal: identical completion is a no-op, anything else is rejected.
        let same_completion = job.status == ExportStatus::Completed
            && job.file_path.as_deref() == Some(file_path)
            && job.file_size_bytes == Some(file_size_bytes)
            && job.expires_at.map(|t| t.to_rfc3339()) == Some(expires);
        if same_completion {
            Ok(job)
        } else {
            Err(DomainError::InvalidStateTransition {
                entity: "ExportJob".to_string(),
                id,
                from: job.status.as_str().to_string(),
                to: ExportStatus::Completed.as_str().to_string(),
            })
        }
    }

    async fn fail_job(&self, id: Uuid, error_message: &str) -> DomainResult<ExportJob> {
        let updated = sqlx::query(
            "UPDATE export_jobs SET status = 'failed', error_message = ?, completed_at = ? WHERE id = ? AND status IN ('pending', 'processing')",
        )
        .bind(error_message)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        let job = self.find_by_id(id).await?;
        if updated.rows_affected() == 1 || job.status == ExportStatus::Failed {
            Ok(job)
        } else {
            Err(DomainError::InvalidStateTransition {
                entity: "ExportJob".to_string(),
                id,
                from: job.status.as_str().to_string(),
                to: ExportStatus::Failed.as_str().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_migration::test_pool;

    async fn seed_family(pool: &SqlitePool) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO families (id, name, owner_user_id, plan_tier, created_at) VALUES (?, 'Test', ?, 'premium', ?)")
            .bind(id.to_string())
            .bind(Uuid::new_v4().to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(pool)
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_create_and_find_in_flight() {
        let pool = test_pool().await;
        let repo = SqliteExportJobRepository::new(pool.clone());
        let family_id = seed_family(&pool).await;

        assert!(repo.find_in_flight_for_family(family_id).await.unwrap().is_none());

        let job = ExportJob::new_processing(family_id, Uuid::new_v4());
        repo.create_job(&job).await.unwrap();

        let in_flight = repo.find_in_flight_for_family(family_id).await.unwrap().unwrap();
        assert_eq!(in_flight.id, job.id);
        assert_eq!(in_flight.status, ExportStatus::Processing);
        assert_eq!(repo.find_latest_for_family(family_id).await.unwrap().unwrap().id, job.id);
    }

    #[tokio::test]
    async fn test_second_in_flight_job_is_a_conflict() {
        let pool = test_pool().await;
        let repo = SqliteExportJobRepository::new(pool.clone());
        let family_id = seed_family(&pool).await;

        repo.create_job(&ExportJob::new_processing(family_id, Uuid::new_v4())).await.unwrap();
        let err = repo
            .create_job(&ExportJob::new_processing(family_id, Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Database(DbError::Conflict(_))));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM export_jobs WHERE family_id = ?")
            .bind(family_id.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let pool = test_pool().await;
        let repo = SqliteExportJobRepository::new(pool.clone());
        let family_id = seed_family(&pool).await;
        let job = ExportJob::new_processing(family_id, Uuid::new_v4());
        repo.create_job(&job).await.unwrap();

        let expires = Utc::now() + chrono::Duration::days(7);
        let first = repo.complete_job(job.id, "fam/a.zip", 1234, expires).await.unwrap();
        let second = repo.complete_job(job.id, "fam/a.zip", 1234, expires).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.status, ExportStatus::Completed);
        assert!(first.file_path.is_some() && first.file_size_bytes.is_some() && first.expires_at.is_some());
        assert!(first.error_message.is_none());

        // A different completion of a terminal job is rejected.
        assert!(repo.complete_job(job.id, "fam/b.zip", 99, expires).await.is_err());
        // A new job may start once the previous one is terminal.
        repo.create_job(&ExportJob::new_processing(family_id, Uuid::new_v4())).await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_sets_message_and_is_absorbing() {
        let pool = test_pool().await;
        let repo = SqliteExportJobRepository::new(pool.clone());
        let family_id = seed_family(&pool).await;
        let job = ExportJob::new_processing(family_id, Uuid::new_v4());
        repo.create_job(&job).await.unwrap();

        let failed = repo.fail_job(job.id, "upload refused").await.unwrap();
        assert_eq!(failed.status, ExportStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("upload refused"));
        assert!(failed.file_path.is_none() && failed.expires_at.is_none());
        assert!(failed.completed_at.is_some());

        let err = repo
            .complete_job(job.id, "fam/a.zip", 1, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_storage_rejects_inconsistent_rows() {
        let pool = test_pool().await;
        let family_id = seed_family(&pool).await;

        // completed without file metadata violates the table's CHECK constraint
        let result = sqlx::query("INSERT INTO export_jobs (id, family_id, requested_by, status, created_at) VALUES (?, ?, ?, 'completed', ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(family_id.to_string())
            .bind(Uuid::new_v4().to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&pool)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let pool = test_pool().await;
        let repo = SqliteExportJobRepository::new(pool);
        let err = repo.find_by_id(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DomainError::EntityNotFound(..)));
    }
}
