use crate::domain::{
    CompareAndSetStatusRepoInput, CreateServiceRequestRepoInput, DomainError, DomainResult,
    ServiceRequest, ServiceRequestRepository, ServiceRequestStatus, UrgencyLevel,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

const SERVICE_REQUEST_COLUMNS: &str = "service_request_id, requester_id, provider_id, animal_id, \
     purpose, description, urgency, scheduled_time, status, notes, created_at, updated_at";

/// Service request row for PostgreSQL storage
#[derive(Debug, Clone)]
pub struct ServiceRequestRow {
    pub service_request_id: String,
    pub requester_id: String,
    pub provider_id: String,
    pub animal_id: String,
    pub purpose: String,
    pub description: Option<String>,
    pub urgency: String,
    pub scheduled_time: DateTime<Utc>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Row> for ServiceRequestRow {
    fn from(row: &Row) -> Self {
        ServiceRequestRow {
            service_request_id: row.get(0),
            requester_id: row.get(1),
            provider_id: row.get(2),
            animal_id: row.get(3),
            purpose: row.get(4),
            description: row.get(5),
            urgency: row.get(6),
            scheduled_time: row.get(7),
            status: row.get(8),
            notes: row.get(9),
            created_at: row.get(10),
            updated_at: row.get(11),
        }
    }
}

impl TryFrom<ServiceRequestRow> for ServiceRequest {
    type Error = DomainError;

    fn try_from(row: ServiceRequestRow) -> Result<Self, Self::Error> {
        let urgency = row
            .urgency
            .parse::<UrgencyLevel>()
            .map_err(|e| DomainError::RepositoryError(anyhow::anyhow!("corrupt row: {}", e)))?;
        let status = row
            .status
            .parse::<ServiceRequestStatus>()
            .map_err(|e| DomainError::RepositoryError(anyhow::anyhow!("corrupt row: {}", e)))?;

        Ok(ServiceRequest {
            service_request_id: row.service_request_id,
            requester_id: row.requester_id,
            provider_id: row.provider_id,
            animal_id: row.animal_id,
            purpose: row.purpose,
            description: row.description,
            urgency,
            scheduled_time: row.scheduled_time,
            status,
            notes: row.notes,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

fn service_request_from_row(row: &Row) -> DomainResult<ServiceRequest> {
    ServiceRequestRow::from(row).try_into()
}

/// PostgreSQL implementation of ServiceRequestRepository
#[derive(Clone)]
pub struct PostgresServiceRequestRepository {
    client: PostgresClient,
}

impl PostgresServiceRequestRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceRequestRepository for PostgresServiceRequestRepository {
    #[instrument(skip(self, input), fields(service_request_id = %input.service_request_id))]
    async fn create_service_request(
        &self,
        input: CreateServiceRequestRepoInput,
    ) -> DomainResult<ServiceRequest> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO service_requests (
                         service_request_id, requester_id, provider_id, animal_id,
                         purpose, description, urgency, scheduled_time, status
                     )
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
                     RETURNING {}",
                    SERVICE_REQUEST_COLUMNS
                ),
                &[
                    &input.service_request_id,
                    &input.requester_id,
                    &input.provider_id,
                    &input.animal_id,
                    &input.purpose,
                    &input.description,
                    &input.urgency.as_str(),
                    &input.scheduled_time,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("created service request");
        service_request_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn get_service_request(
        &self,
        service_request_id: &str,
    ) -> DomainResult<Option<ServiceRequest>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM service_requests WHERE service_request_id = $1",
                    SERVICE_REQUEST_COLUMNS
                ),
                &[&service_request_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref().map(service_request_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_service_requests_for_user(
        &self,
        user_id: &str,
    ) -> DomainResult<Vec<ServiceRequest>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM service_requests
                     WHERE requester_id = $1 OR provider_id = $1
                     ORDER BY created_at DESC, service_request_id DESC",
                    SERVICE_REQUEST_COLUMNS
                ),
                &[&user_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("found {} service requests", rows.len());
        rows.iter().map(service_request_from_row).collect()
    }

    #[instrument(skip(self, input), fields(service_request_id = %input.service_request_id, target = %input.target))]
    async fn compare_and_set_status(
        &self,
        input: CompareAndSetStatusRepoInput,
    ) -> DomainResult<Option<ServiceRequest>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let expected: Vec<&str> = input.expected.iter().map(|s| s.as_str()).collect();

        // The WHERE clause is the check; row-level locking serializes writers
        let row = conn
            .query_opt(
                &format!(
                    "UPDATE service_requests
                     SET status = $3, notes = COALESCE($4, notes), updated_at = now()
                     WHERE service_request_id = $1 AND status = ANY($2)
                     RETURNING {}",
                    SERVICE_REQUEST_COLUMNS
                ),
                &[
                    &input.service_request_id,
                    &expected,
                    &input.target.as_str(),
                    &input.notes,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref().map(service_request_from_row).transpose()
    }
}
