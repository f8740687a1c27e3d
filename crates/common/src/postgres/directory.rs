use crate::domain::{DomainError, DomainResult, FarmDirectory};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tracing::instrument;

/// Reads animal ownership and user roles from the mirrored registry tables
#[derive(Clone)]
pub struct PostgresFarmDirectory {
    client: PostgresClient,
}

impl PostgresFarmDirectory {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FarmDirectory for PostgresFarmDirectory {
    #[instrument(skip(self))]
    async fn owner_of(&self, animal_id: &str) -> DomainResult<Option<String>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt("SELECT owner_id FROM animals WHERE id = $1", &[&animal_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|r| r.get(0)))
    }

    #[instrument(skip(self))]
    async fn is_veterinarian(&self, user_id: &str) -> DomainResult<bool> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT 1 FROM users WHERE id = $1 AND role = 'veterinarian'",
                &[&user_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.is_some())
    }
}
