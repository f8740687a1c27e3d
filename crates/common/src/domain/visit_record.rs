use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outcome filed by the veterinarian after a visit. Filing it completes the
/// service request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitRecord {
    pub visit_record_id: String,
    pub service_request_id: String,
    pub recorded_by: String,
    pub diagnosis: String,
    pub treatment: Option<String>,
    /// Fee in minor currency units, recorded as given
    pub fee_minor_units: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVisitRecordRepoInput {
    pub visit_record_id: String,
    pub service_request_id: String,
    pub recorded_by: String,
    pub diagnosis: String,
    pub treatment: Option<String>,
    pub fee_minor_units: Option<i64>,
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VisitRecordRepository: Send + Sync {
    /// Fails with VisitRecordAlreadyExists if the request already has one
    async fn create_visit_record(&self, input: CreateVisitRecordRepoInput)
        -> DomainResult<VisitRecord>;

    async fn get_visit_record(&self, service_request_id: &str)
        -> DomainResult<Option<VisitRecord>>;
}
