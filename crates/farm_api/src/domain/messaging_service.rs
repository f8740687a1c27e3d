use crate::domain::{AuthorizedRequest, RequestAccessGuard};
use bytes::Bytes;
use common::auth::Principal;
use common::blob::BlobStore;
use common::domain::{
    AttachmentMetadata, ChatMessage, ChatMessageRepository, CreateChatMessageRepoInput,
    DomainError, DomainResult, MarkThreadReadRepoInput, ServiceRequestRepository,
    ServiceRequestStatus,
};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Default attachment ceiling, 10 MiB
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Validate)]
pub struct PostMessageRequest {
    #[garde(skip)]
    pub principal: Principal,
    #[garde(length(min = 1))]
    pub service_request_id: String,
    #[garde(skip)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct UploadAttachmentRequest {
    #[garde(skip)]
    pub principal: Principal,
    #[garde(length(min = 1))]
    pub service_request_id: String,
    #[garde(length(min = 1, max = 255))]
    pub file_name: String,
    #[garde(skip)]
    pub mime_type: Option<String>,
    #[garde(skip)]
    pub content: Bytes,
    /// Optional caption sent with the file
    #[garde(skip)]
    pub body: Option<String>,
}

/// Any call scoped to one thread
#[derive(Debug, Clone, Validate)]
pub struct ThreadRequest {
    #[garde(skip)]
    pub principal: Principal,
    #[garde(length(min = 1))]
    pub service_request_id: String,
}

#[derive(Debug, Clone, Validate)]
pub struct DownloadAttachmentRequest {
    #[garde(skip)]
    pub principal: Principal,
    #[garde(length(min = 1))]
    pub service_request_id: String,
    #[garde(length(min = 1))]
    pub message_id: String,
}

/// Attachment bytes with the metadata recorded at upload
#[derive(Debug, Clone)]
pub struct AttachmentDownload {
    pub metadata: AttachmentMetadata,
    pub content: Bytes,
}

/// Per-request chat. Participants come from the request on every call;
/// the thread accepts new messages only while the request is accepted.
pub struct MessagingService {
    chat_message_repository: Arc<dyn ChatMessageRepository>,
    blob_store: Arc<dyn BlobStore>,
    guard: RequestAccessGuard,
    max_attachment_bytes: usize,
}

impl MessagingService {
    pub fn new(
        service_request_repository: Arc<dyn ServiceRequestRepository>,
        chat_message_repository: Arc<dyn ChatMessageRepository>,
        blob_store: Arc<dyn BlobStore>,
        max_attachment_bytes: usize,
    ) -> Self {
        Self {
            chat_message_repository,
            blob_store,
            guard: RequestAccessGuard::new(service_request_repository),
            max_attachment_bytes,
        }
    }

    pub fn max_attachment_bytes(&self) -> usize {
        self.max_attachment_bytes
    }

    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, service_request_id = %request.service_request_id))]
    pub async fn post_message(&self, request: PostMessageRequest) -> DomainResult<ChatMessage> {
        common::garde::validate_struct(&request)?;
        let authorized = self
            .guard
            .authorize(&request.service_request_id, &request.principal)
            .await?;

        let body = non_blank(request.body).ok_or(DomainError::EmptyMessage)?;
        ensure_thread_open(&authorized)?;

        let message_id = xid::new().to_string();
        debug!(message_id = %message_id, "posting message");

        self.chat_message_repository
            .create_message(CreateChatMessageRepoInput {
                message_id,
                service_request_id: request.service_request_id,
                sender_id: request.principal.id,
                body: Some(body),
                attachment: None,
            })
            .await
    }

    /// Store the file first, then record the message. Nothing is recorded
    /// when the store fails; the blob is removed again when recording fails.
    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, service_request_id = %request.service_request_id, size = request.content.len()))]
    pub async fn upload_attachment(
        &self,
        request: UploadAttachmentRequest,
    ) -> DomainResult<ChatMessage> {
        common::garde::validate_struct(&request)?;
        let authorized = self
            .guard
            .authorize(&request.service_request_id, &request.principal)
            .await?;

        let size = request.content.len();
        if size == 0 {
            return Err(DomainError::ValidationError(
                "file: attachment is empty".to_string(),
            ));
        }
        if size > self.max_attachment_bytes {
            return Err(DomainError::AttachmentTooLarge {
                size,
                limit: self.max_attachment_bytes,
            });
        }
        ensure_thread_open(&authorized)?;

        let storage_key = self
            .blob_store
            .put_blob(request.content)
            .await
            .map_err(|e| DomainError::StorageFailure(e.to_string()))?;
        debug!(storage_key = %storage_key, "stored attachment");

        let input = CreateChatMessageRepoInput {
            message_id: xid::new().to_string(),
            service_request_id: request.service_request_id,
            sender_id: request.principal.id,
            body: non_blank(request.body),
            attachment: Some(AttachmentMetadata {
                name: request.file_name,
                storage_key: storage_key.clone(),
                size_bytes: size as i64,
                mime_type: non_blank(request.mime_type)
                    .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            }),
        };

        match self.chat_message_repository.create_message(input).await {
            Ok(message) => Ok(message),
            Err(e) => {
                if let Err(cleanup) = self.blob_store.delete_blob(&storage_key).await {
                    warn!(storage_key = %storage_key, error = %cleanup, "failed to delete orphaned attachment");
                }
                Err(e)
            }
        }
    }

    /// Thread messages, oldest first
    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, service_request_id = %request.service_request_id))]
    pub async fn list_messages(&self, request: ThreadRequest) -> DomainResult<Vec<ChatMessage>> {
        common::garde::validate_struct(&request)?;
        self.guard
            .authorize(&request.service_request_id, &request.principal)
            .await?;

        self.chat_message_repository
            .list_messages(&request.service_request_id)
            .await
    }

    /// Mark the other party's messages read. Returns how many changed.
    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, service_request_id = %request.service_request_id))]
    pub async fn mark_read(&self, request: ThreadRequest) -> DomainResult<u64> {
        common::garde::validate_struct(&request)?;
        self.guard
            .authorize(&request.service_request_id, &request.principal)
            .await?;

        let updated = self
            .chat_message_repository
            .mark_thread_read(MarkThreadReadRepoInput {
                service_request_id: request.service_request_id,
                reader_id: request.principal.id,
            })
            .await?;

        debug!(updated, "marked messages read");
        Ok(updated)
    }

    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, service_request_id = %request.service_request_id))]
    pub async fn unread_count(&self, request: ThreadRequest) -> DomainResult<u64> {
        common::garde::validate_struct(&request)?;
        self.guard
            .authorize(&request.service_request_id, &request.principal)
            .await?;

        self.chat_message_repository
            .count_unread(&request.service_request_id, &request.principal.id)
            .await
    }

    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, service_request_id = %request.service_request_id, message_id = %request.message_id))]
    pub async fn download_attachment(
        &self,
        request: DownloadAttachmentRequest,
    ) -> DomainResult<AttachmentDownload> {
        common::garde::validate_struct(&request)?;
        self.guard
            .authorize(&request.service_request_id, &request.principal)
            .await?;

        let message = self
            .chat_message_repository
            .get_message(&request.service_request_id, &request.message_id)
            .await?
            .ok_or_else(|| DomainError::MessageNotFound(request.message_id.clone()))?;

        let metadata = message
            .attachment
            .ok_or_else(|| DomainError::AttachmentNotFound(request.message_id.clone()))?;

        let content = self
            .blob_store
            .get_blob(&metadata.storage_key)
            .await
            .map_err(|e| DomainError::StorageFailure(e.to_string()))?;

        Ok(AttachmentDownload { metadata, content })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn ensure_thread_open(authorized: &AuthorizedRequest) -> DomainResult<()> {
    if authorized.request.status == ServiceRequestStatus::Accepted {
        Ok(())
    } else {
        Err(DomainError::ThreadClosed(
            authorized.request.service_request_id.clone(),
        ))
    }
}
