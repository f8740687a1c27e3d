use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Metadata for a file stored in the blob store and referenced by a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentMetadata {
    pub name: String,
    pub storage_key: String,
    pub size_bytes: i64,
    pub mime_type: String,
}

/// One message in a service request's chat thread.
/// Participants are never stored here; they come from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub message_id: String,
    pub service_request_id: String,
    pub sender_id: String,
    pub body: Option<String>,
    pub attachment: Option<AttachmentMetadata>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Repository input for appending a message (ID already generated)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateChatMessageRepoInput {
    pub message_id: String,
    pub service_request_id: String,
    pub sender_id: String,
    pub body: Option<String>,
    pub attachment: Option<AttachmentMetadata>,
}

/// Repository input for marking the other party's messages read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkThreadReadRepoInput {
    pub service_request_id: String,
    pub reader_id: String,
}

/// Repository trait for chat message persistence. Messages are append-only.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ChatMessageRepository: Send + Sync {
    /// Append a message with `is_read = false`
    async fn create_message(&self, input: CreateChatMessageRepoInput)
        -> DomainResult<ChatMessage>;

    /// Thread messages, oldest first
    async fn list_messages(&self, service_request_id: &str) -> DomainResult<Vec<ChatMessage>>;

    async fn get_message(
        &self,
        service_request_id: &str,
        message_id: &str,
    ) -> DomainResult<Option<ChatMessage>>;

    /// Flip `is_read` to true on unread messages not sent by the reader.
    /// Returns the number of messages changed.
    async fn mark_thread_read(&self, input: MarkThreadReadRepoInput) -> DomainResult<u64>;

    /// Unread messages in the thread not sent by the reader
    async fn count_unread(&self, service_request_id: &str, reader_id: &str) -> DomainResult<u64>;
}
