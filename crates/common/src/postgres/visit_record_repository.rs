use crate::domain::{
    CreateVisitRecordRepoInput, DomainError, DomainResult, VisitRecord, VisitRecordRepository,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::instrument;

const VISIT_RECORD_COLUMNS: &str = "visit_record_id, service_request_id, recorded_by, diagnosis, \
     treatment, fee_minor_units, created_at";

fn visit_record_from_row(row: &Row) -> VisitRecord {
    VisitRecord {
        visit_record_id: row.get(0),
        service_request_id: row.get(1),
        recorded_by: row.get(2),
        diagnosis: row.get(3),
        treatment: row.get(4),
        fee_minor_units: row.get(5),
        created_at: row.get(6),
    }
}

#[derive(Clone)]
pub struct PostgresVisitRecordRepository {
    client: PostgresClient,
}

impl PostgresVisitRecordRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VisitRecordRepository for PostgresVisitRecordRepository {
    #[instrument(skip(self, input), fields(service_request_id = %input.service_request_id))]
    async fn create_visit_record(
        &self,
        input: CreateVisitRecordRepoInput,
    ) -> DomainResult<VisitRecord> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let result = conn
            .query_one(
                &format!(
                    "INSERT INTO visit_records (
                         visit_record_id, service_request_id, recorded_by,
                         diagnosis, treatment, fee_minor_units
                     )
                     VALUES ($1, $2, $3, $4, $5, $6)
                     RETURNING {}",
                    VISIT_RECORD_COLUMNS
                ),
                &[
                    &input.visit_record_id,
                    &input.service_request_id,
                    &input.recorded_by,
                    &input.diagnosis,
                    &input.treatment,
                    &input.fee_minor_units,
                ],
            )
            .await;

        match result {
            Ok(row) => Ok(visit_record_from_row(&row)),
            Err(e) => {
                if let Some(db_err) = e.as_db_error() {
                    if db_err.code().code() == "23505" {
                        return Err(DomainError::VisitRecordAlreadyExists(
                            input.service_request_id,
                        ));
                    }
                }
                Err(DomainError::RepositoryError(e.into()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_visit_record(&self, service_request_id: &str) -> DomainResult<Option<VisitRecord>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM visit_records WHERE service_request_id = $1",
                    VISIT_RECORD_COLUMNS
                ),
                &[&service_request_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(visit_record_from_row))
    }
}
