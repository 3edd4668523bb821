use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::domains::core::object_store::ObjectStore;
use crate::domains::family::{ExportEntitlement, Family, FamilyContentRepository, FamilyRepository};
use crate::errors::{DbError, DomainError, ServiceError, ServiceResult};
use crate::types::ExportConfig;

use super::aggregator::ContentAggregator;
use super::archive_builder::ArchiveBuilder;
use super::asset_fetcher::AssetFetcher;
use super::packaging;
use super::repository::ExportJobRepository;
use super::types::{ExportJob, ExportSummary, PublishedArchive};

#[async_trait]
pub trait ExportService: Send + Sync {
    /// Latest job for the caller's family. A completed, unexpired job also
    /// gets a freshly signed download URL.
    async fn get_export_status(&self, auth: &AuthContext) -> ServiceResult<ExportSummary>;

    /// Create a job and run the whole pipeline before returning.
    async fn start_export(&self, auth: &AuthContext) -> ServiceResult<ExportSummary>;

    /// Keys of every archive published for the caller's family.
    async fn list_archives(&self, auth: &AuthContext) -> ServiceResult<Vec<String>>;

    /// One job of the caller's family.
    async fn get_job(&self, job_id: Uuid, auth: &AuthContext) -> ServiceResult<ExportJob>;
}

pub struct ExportServiceImpl {
    families: Arc<dyn FamilyRepository>,
    jobs: Arc<dyn ExportJobRepository>,
    entitlement: Arc<dyn ExportEntitlement>,
    store: Arc<dyn ObjectStore>,
    aggregator: ContentAggregator,
    builder: ArchiveBuilder,
    config: ExportConfig,
}

impl ExportServiceImpl {
    pub fn new(
        families: Arc<dyn FamilyRepository>,
        content: Arc<dyn FamilyContentRepository>,
        jobs: Arc<dyn ExportJobRepository>,
        entitlement: Arc<dyn ExportEntitlement>,
        fetcher: Arc<dyn AssetFetcher>,
        store: Arc<dyn ObjectStore>,
        config: ExportConfig,
    ) -> Self {
        Self {
            families,
            jobs,
            entitlement,
            store,
            aggregator: ContentAggregator::new(content),
            builder: ArchiveBuilder::new(fetcher, config.max_title_len),
            config,
        }
    }

    async fn resolve_family(&self, auth: &AuthContext) -> ServiceResult<(Uuid, Family)> {
        let user_id = auth.require_user()?;
        let family = self
            .families
            .find_owned_by(user_id)
            .await?
            .ok_or_else(|| ServiceError::PermissionDenied("Caller does not own a family".to_string()))?;
        Ok((user_id, family))
    }

    // --- Job manager ---

    /// Latest job plus a download URL when it is completed and unexpired at `now`.
    pub async fn get_latest_job(&self, family_id: Uuid, now: DateTime<Utc>) -> ServiceResult<ExportSummary> {
        let export = self.jobs.find_latest_for_family(family_id).await?;
        let download_url = match &export {
            Some(job) if job.is_downloadable_at(now) => self.sign(job).await,
            _ => None,
        };
        Ok(ExportSummary { export, download_url })
    }

    /// Gate checks, then insert a `processing` row. The storage layer rejects
    /// a second in-flight row for the same family.
    pub async fn start_job(&self, family: &Family, requested_by: Uuid) -> ServiceResult<ExportJob> {
        if !self.entitlement.can_export(family).await? {
            return Err(ServiceError::PermissionDenied(
                "The family's plan does not include archive exports".to_string(),
            ));
        }

        if let Some(existing) = self.jobs.find_in_flight_for_family(family.id).await? {
            return Err(ServiceError::Conflict(format!(
                "Export {} is already {} for this family",
                existing.id,
                existing.status.as_str()
            )));
        }

        let job = ExportJob::new_processing(family.id, requested_by);
        match self.jobs.create_job(&job).await {
            Ok(()) => {}
            Err(DomainError::Database(DbError::Conflict(message))) => return Err(ServiceError::Conflict(message)),
            Err(e) => return Err(e.into()),
        }

        info!("Export job {} created for family {} by {}", job.id, family.id, requested_by);
        Ok(job)
    }

    pub async fn complete_job(
        &self,
        job_id: Uuid,
        file_path: &str,
        size_bytes: i64,
        expires_at: DateTime<Utc>,
    ) -> ServiceResult<ExportJob> {
        let job = self.jobs.complete_job(job_id, file_path, size_bytes, expires_at).await?;
        info!("Export job {} completed: {} ({} bytes)", job_id, file_path, size_bytes);
        Ok(job)
    }

    /// `message` is operator facing and stored verbatim.
    pub async fn fail_job(&self, job_id: Uuid, message: &str) -> ServiceResult<ExportJob> {
        let job = self.jobs.fail_job(job_id, message).await?;
        error!("Export job {} failed: {}", job_id, message);
        Ok(job)
    }

    async fn sign(&self, job: &ExportJob) -> Option<String> {
        let key = job.file_path.as_deref()?;
        match self.store.create_signed_url(key, self.config.signed_url_ttl).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Could not sign download URL for export {}: {}", job.id, e);
                None
            }
        }
    }

    // --- Pipeline ---

    async fn run_pipeline(&self, family: &Family, now: DateTime<Utc>) -> ServiceResult<PublishedArchive> {
        let content = self.aggregator.aggregate(family).await;
        let entries = self.builder.build(&content, now).await?;
        let entry_count = entries.len();

        let (bytes, size) = packaging::package_in_background(entries, self.config.compression_level).await?;
        info!("Packaged export for family {}: {} entries, {} bytes", family.id, entry_count, size);

        let key = packaging::object_key(family.id, &family.name, now, self.config.max_title_len);
        let stored = packaging::publish(self.store.as_ref(), &key, bytes).await?;

        Ok(PublishedArchive {
            key,
            size_bytes: stored as i64,
            entry_count,
        })
    }

    /// Every failure after job creation leaves the job in a terminal state.
    async fn finish_job(&self, job: &ExportJob, outcome: ServiceResult<PublishedArchive>, now: DateTime<Utc>) -> ServiceResult<ExportJob> {
        let published = match outcome {
            Ok(published) => published,
            Err(e) => {
                if let Err(fail_err) = self.fail_job(job.id, &e.to_string()).await {
                    error!("Could not mark export {} as failed: {}", job.id, fail_err);
                }
                return Err(e);
            }
        };

        let Some(expires_at) = now.checked_add_signed(self.config.archive_retention) else {
            let message = format!(
                "Archive {} was published but its retention of {} days is out of range",
                published.key,
                self.config.archive_retention.num_days()
            );
            if let Err(fail_err) = self.fail_job(job.id, &message).await {
                error!("Could not mark export {} as failed: {}", job.id, fail_err);
            }
            return Err(ServiceError::Internal(message));
        };
        match self.complete_job(job.id, &published.key, published.size_bytes, expires_at).await {
            Ok(completed) => {
                info!("Export {} holds {} archive entries", job.id, published.entry_count);
                Ok(completed)
            }
            Err(e) => {
                let message = format!("Archive {} was published but the job could not be completed: {}", published.key, e);
                if let Err(fail_err) = self.fail_job(job.id, &message).await {
                    error!("Could not mark export {} as failed: {}", job.id, fail_err);
                }
                Err(ServiceError::Internal(message))
            }
        }
    }
}

#[async_trait]
impl ExportService for ExportServiceImpl {
    async fn get_export_status(&self, auth: &AuthContext) -> ServiceResult<ExportSummary> {
        let (_, family) = self.resolve_family(auth).await?;
        self.get_latest_job(family.id, Utc::now()).await
    }

    async fn start_export(&self, auth: &AuthContext) -> ServiceResult<ExportSummary> {
        let (user_id, family) = self.resolve_family(auth).await?;
        let job = self.start_job(&family, user_id).await?;

        let now = Utc::now();
        let outcome = self.run_pipeline(&family, now).await;
        let job = self.finish_job(&job, outcome, now).await?;

        let download_url = self.sign(&job).await;
        Ok(ExportSummary {
            export: Some(job),
            download_url,
        })
    }

    async fn list_archives(&self, auth: &AuthContext) -> ServiceResult<Vec<String>> {
        let (_, family) = self.resolve_family(auth).await?;
        let keys = self
            .store
            .list(&format!("{}/", family.id))
            .await
            .map_err(DomainError::from)?;
        Ok(keys)
    }

    async fn get_job(&self, job_id: Uuid, auth: &AuthContext) -> ServiceResult<ExportJob> {
        let (_, family) = self.resolve_family(auth).await?;
        let job = self.jobs.find_by_id(job_id).await?;
        if job.family_id != family.id {
            return Err(ServiceError::PermissionDenied("Export belongs to another family".to_string()));
        }
        Ok(job)
    }
}
