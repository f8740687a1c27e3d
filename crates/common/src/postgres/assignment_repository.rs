use crate::domain::{
    AssignmentRecord, AssignmentRepository, CloseAssignmentRepoInput, DomainError, DomainResult,
    OpenAssignmentRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

const ASSIGNMENT_COLUMNS: &str = "assignment_id, device_id, animal_id, assigned_at, removed_at";

/// Partial unique index guarding one open record per device
const OPEN_DEVICE_INDEX: &str = "device_assignments_open_device_idx";
/// Partial unique index guarding one open record per animal
const OPEN_ANIMAL_INDEX: &str = "device_assignments_open_animal_idx";

fn assignment_from_row(row: &Row) -> AssignmentRecord {
    AssignmentRecord {
        assignment_id: row.get(0),
        device_id: row.get(1),
        animal_id: row.get(2),
        assigned_at: row.get(3),
        removed_at: row.get(4),
    }
}

/// PostgreSQL implementation of AssignmentRepository.
///
/// Opening takes a row lock on the device, so checks and insert for the
/// same device run one at a time. The partial unique indexes back this up
/// across devices competing for the same animal.
#[derive(Clone)]
pub struct PostgresAssignmentRepository {
    client: PostgresClient,
}

impl PostgresAssignmentRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

fn map_open_error(e: tokio_postgres::Error, input: &OpenAssignmentRepoInput) -> DomainError {
    if let Some(db_err) = e.as_db_error() {
        if db_err.code().code() == "23505" {
            match db_err.constraint() {
                Some(OPEN_ANIMAL_INDEX) => {
                    return DomainError::AnimalAlreadyAssigned(input.animal_id.clone())
                }
                Some(OPEN_DEVICE_INDEX) => {
                    return DomainError::DeviceAlreadyAssigned(input.device_external_id.clone())
                }
                _ => {}
            }
        }
    }
    DomainError::RepositoryError(e.into())
}

#[async_trait]
impl AssignmentRepository for PostgresAssignmentRepository {
    #[instrument(skip(self, input), fields(device = %input.device_external_id, animal_id = %input.animal_id))]
    async fn open_assignment(
        &self,
        input: OpenAssignmentRepoInput,
    ) -> DomainResult<AssignmentRecord> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let transaction = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let device = transaction
            .query_opt(
                "SELECT device_id, status FROM devices WHERE external_id = $1 FOR UPDATE",
                &[&input.device_external_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .ok_or_else(|| DomainError::DeviceNotFound(input.device_external_id.clone()))?;

        let device_id: String = device.get(0);
        let status: String = device.get(1);
        if status != "active" {
            return Err(DomainError::DeviceInactive(input.device_external_id));
        }

        let device_open = transaction
            .query_opt(
                "SELECT 1 FROM device_assignments WHERE device_id = $1 AND removed_at IS NULL",
                &[&device_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;
        if device_open.is_some() {
            return Err(DomainError::DeviceAlreadyAssigned(input.device_external_id));
        }

        let animal_open = transaction
            .query_opt(
                "SELECT 1 FROM device_assignments WHERE animal_id = $1 AND removed_at IS NULL",
                &[&input.animal_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;
        if animal_open.is_some() {
            return Err(DomainError::AnimalAlreadyAssigned(input.animal_id));
        }

        // A new interval never starts before the previous one ended
        let last_removed_at: Option<DateTime<Utc>> = transaction
            .query_one(
                "SELECT max(removed_at) FROM device_assignments WHERE device_id = $1",
                &[&device_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .get(0);
        let now = Utc::now();
        let assigned_at = match last_removed_at {
            Some(last) if last > now => last,
            _ => now,
        };

        let row = transaction
            .query_one(
                &format!(
                    "INSERT INTO device_assignments (assignment_id, device_id, animal_id, assigned_at)
                     VALUES ($1, $2, $3, $4)
                     RETURNING {}",
                    ASSIGNMENT_COLUMNS
                ),
                &[&input.assignment_id, &device_id, &input.animal_id, &assigned_at],
            )
            .await
            .map_err(|e| map_open_error(e, &input))?;

        transaction
            .commit()
            .await
            .map_err(|e| map_open_error(e, &input))?;

        debug!("opened assignment {}", input.assignment_id);
        Ok(assignment_from_row(&row))
    }

    #[instrument(skip(self, input), fields(assignment_id = %input.assignment_id))]
    async fn close_assignment(
        &self,
        input: CloseAssignmentRepoInput,
    ) -> DomainResult<Option<AssignmentRecord>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "UPDATE device_assignments
                     SET removed_at = GREATEST(now(), assigned_at)
                     WHERE assignment_id = $1 AND removed_at IS NULL
                     RETURNING {}",
                    ASSIGNMENT_COLUMNS
                ),
                &[&input.assignment_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if row.is_none() {
            debug!("assignment already closed");
        }
        Ok(row.as_ref().map(assignment_from_row))
    }

    #[instrument(skip(self))]
    async fn current_assignment(&self, device_id: &str) -> DomainResult<Option<AssignmentRecord>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM device_assignments
                     WHERE device_id = $1 AND removed_at IS NULL",
                    ASSIGNMENT_COLUMNS
                ),
                &[&device_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(assignment_from_row))
    }

    #[instrument(skip(self))]
    async fn assignment_history(&self, device_id: &str) -> DomainResult<Vec<AssignmentRecord>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM device_assignments
                     WHERE device_id = $1
                     ORDER BY assigned_at DESC, assignment_id DESC",
                    ASSIGNMENT_COLUMNS
                ),
                &[&device_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.iter().map(assignment_from_row).collect())
    }

    #[instrument(skip(self))]
    async fn list_open_assignments(&self) -> DomainResult<Vec<AssignmentRecord>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM device_assignments
                     WHERE removed_at IS NULL
                     ORDER BY assigned_at DESC, assignment_id DESC",
                    ASSIGNMENT_COLUMNS
                ),
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("found {} open assignments", rows.len());
        Ok(rows.iter().map(assignment_from_row).collect())
    }
}
