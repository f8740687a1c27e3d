use crate::domain::{
    CreateDeviceRepoInput, Device, DeviceRepository, DeviceStatus, DomainError, DomainResult,
    UpdateDeviceStatusRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, instrument};

const DEVICE_COLUMNS: &str =
    "device_id, external_id, name, description, status, created_at, updated_at";

/// Device row for PostgreSQL storage with timestamp metadata
#[derive(Debug, Clone)]
pub struct DeviceRow {
    pub device_id: String,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Row> for DeviceRow {
    fn from(row: &Row) -> Self {
        DeviceRow {
            device_id: row.get(0),
            external_id: row.get(1),
            name: row.get(2),
            description: row.get(3),
            status: row.get(4),
            created_at: row.get(5),
            updated_at: row.get(6),
        }
    }
}

impl TryFrom<DeviceRow> for Device {
    type Error = DomainError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        Ok(Device {
            device_id: row.device_id,
            external_id: row.external_id,
            name: row.name,
            description: row.description,
            status: row
                .status
                .parse::<DeviceStatus>()
                .map_err(|e| DomainError::RepositoryError(anyhow::anyhow!("corrupt row: {}", e)))?,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

pub(crate) fn device_from_row(row: &Row) -> DomainResult<Device> {
    DeviceRow::from(row).try_into()
}

/// PostgreSQL implementation of DeviceRepository
#[derive(Clone)]
pub struct PostgresDeviceRepository {
    client: PostgresClient,
}

impl PostgresDeviceRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceRepository for PostgresDeviceRepository {
    #[instrument(skip(self, input), fields(device_id = %input.device_id, external_id = %input.external_id))]
    async fn create_device(&self, input: CreateDeviceRepoInput) -> DomainResult<Device> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let result = conn
            .query_one(
                &format!(
                    "INSERT INTO devices (device_id, external_id, name, description, status)
                     VALUES ($1, $2, $3, $4, 'active')
                     RETURNING {}",
                    DEVICE_COLUMNS
                ),
                &[
                    &input.device_id,
                    &input.external_id,
                    &input.name,
                    &input.description,
                ],
            )
            .await;

        let row = match result {
            Ok(row) => row,
            Err(e) => {
                // 23505 is unique_violation
                if let Some(db_err) = e.as_db_error() {
                    if db_err.code().code() == "23505" {
                        return Err(DomainError::DeviceAlreadyExists(input.external_id));
                    }
                }
                return Err(DomainError::RepositoryError(e.into()));
            }
        };

        debug!("registered device: {}", input.external_id);
        device_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn get_device_by_external_id(&self, external_id: &str) -> DomainResult<Option<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!("SELECT {} FROM devices WHERE external_id = $1", DEVICE_COLUMNS),
                &[&external_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref().map(device_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_devices(&self) -> DomainResult<Vec<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM devices ORDER BY created_at DESC, device_id DESC",
                    DEVICE_COLUMNS
                ),
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("found {} devices", rows.len());
        rows.iter().map(device_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn list_available_devices(&self) -> DomainResult<Vec<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM devices d
                     WHERE d.status = 'active'
                       AND NOT EXISTS (
                           SELECT 1 FROM device_assignments a
                           WHERE a.device_id = d.device_id AND a.removed_at IS NULL
                       )
                     ORDER BY d.created_at DESC, d.device_id DESC",
                    DEVICE_COLUMNS
                ),
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("found {} available devices", rows.len());
        rows.iter().map(device_from_row).collect()
    }

    #[instrument(skip(self, input), fields(external_id = %input.external_id, status = %input.status))]
    async fn update_device_status(
        &self,
        input: UpdateDeviceStatusRepoInput,
    ) -> DomainResult<Device> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let transaction = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        // Same row lock the ledger takes, so status and assignment changes serialize
        let device_id: String = transaction
            .query_opt(
                "SELECT device_id FROM devices WHERE external_id = $1 FOR UPDATE",
                &[&input.external_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .map(|row| row.get(0))
            .ok_or_else(|| DomainError::DeviceNotFound(input.external_id.clone()))?;

        if input.status == DeviceStatus::Inactive {
            let open = transaction
                .query_opt(
                    "SELECT 1 FROM device_assignments WHERE device_id = $1 AND removed_at IS NULL",
                    &[&device_id],
                )
                .await
                .map_err(|e| DomainError::RepositoryError(e.into()))?;
            if open.is_some() {
                return Err(DomainError::DeviceHasOpenAssignment(input.external_id));
            }
        }

        let row = transaction
            .query_one(
                &format!(
                    "UPDATE devices SET status = $2, updated_at = now()
                     WHERE device_id = $1
                     RETURNING {}",
                    DEVICE_COLUMNS
                ),
                &[&device_id, &input.status.as_str()],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        transaction
            .commit()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        device_from_row(&row)
    }
}
