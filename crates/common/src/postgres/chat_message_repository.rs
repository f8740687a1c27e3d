use crate::domain::{
    AttachmentMetadata, ChatMessage, ChatMessageRepository, CreateChatMessageRepoInput,
    DomainError, DomainResult, MarkThreadReadRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::{debug, instrument};

const MESSAGE_COLUMNS: &str = "message_id, service_request_id, sender_id, body, \
     attachment_name, attachment_storage_key, attachment_size_bytes, attachment_mime_type, \
     is_read, created_at";

fn message_from_row(row: &Row) -> ChatMessage {
    let storage_key: Option<String> = row.get(5);
    let attachment = storage_key.map(|storage_key| AttachmentMetadata {
        name: row.get::<_, Option<String>>(4).unwrap_or_default(),
        storage_key,
        size_bytes: row.get::<_, Option<i64>>(6).unwrap_or_default(),
        mime_type: row
            .get::<_, Option<String>>(7)
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    });

    ChatMessage {
        message_id: row.get(0),
        service_request_id: row.get(1),
        sender_id: row.get(2),
        body: row.get(3),
        attachment,
        is_read: row.get(8),
        created_at: row.get(9),
    }
}

/// PostgreSQL implementation of ChatMessageRepository.
/// Thread order is the insertion sequence, not the timestamp.
#[derive(Clone)]
pub struct PostgresChatMessageRepository {
    client: PostgresClient,
}

impl PostgresChatMessageRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatMessageRepository for PostgresChatMessageRepository {
    #[instrument(skip(self, input), fields(message_id = %input.message_id, service_request_id = %input.service_request_id))]
    async fn create_message(&self, input: CreateChatMessageRepoInput) -> DomainResult<ChatMessage> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let attachment = input.attachment.as_ref();
        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO chat_messages (
                         message_id, service_request_id, sender_id, body,
                         attachment_name, attachment_storage_key,
                         attachment_size_bytes, attachment_mime_type
                     )
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                     RETURNING {}",
                    MESSAGE_COLUMNS
                ),
                &[
                    &input.message_id,
                    &input.service_request_id,
                    &input.sender_id,
                    &input.body,
                    &attachment.map(|a| a.name.as_str()),
                    &attachment.map(|a| a.storage_key.as_str()),
                    &attachment.map(|a| a.size_bytes),
                    &attachment.map(|a| a.mime_type.as_str()),
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("stored chat message");
        Ok(message_from_row(&row))
    }

    #[instrument(skip(self))]
    async fn list_messages(&self, service_request_id: &str) -> DomainResult<Vec<ChatMessage>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM chat_messages
                     WHERE service_request_id = $1
                     ORDER BY seq ASC",
                    MESSAGE_COLUMNS
                ),
                &[&service_request_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.iter().map(message_from_row).collect())
    }

    #[instrument(skip(self))]
    async fn get_message(
        &self,
        service_request_id: &str,
        message_id: &str,
    ) -> DomainResult<Option<ChatMessage>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM chat_messages
                     WHERE service_request_id = $1 AND message_id = $2",
                    MESSAGE_COLUMNS
                ),
                &[&service_request_id, &message_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(message_from_row))
    }

    #[instrument(skip(self, input), fields(service_request_id = %input.service_request_id, reader_id = %input.reader_id))]
    async fn mark_thread_read(&self, input: MarkThreadReadRepoInput) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let updated = conn
            .execute(
                "UPDATE chat_messages SET is_read = TRUE
                 WHERE service_request_id = $1 AND sender_id <> $2 AND NOT is_read",
                &[&input.service_request_id, &input.reader_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("marked {} messages read", updated);
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn count_unread(&self, service_request_id: &str, reader_id: &str) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let count: i64 = conn
            .query_one(
                "SELECT count(*) FROM chat_messages
                 WHERE service_request_id = $1 AND sender_id <> $2 AND NOT is_read",
                &[&service_request_id, &reader_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .get(0);

        Ok(count.max(0) as u64)
    }
}
