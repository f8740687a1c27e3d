//! Per-request chat endpoints

use crate::domain::{
    DownloadAttachmentRequest, PostMessageRequest, ThreadRequest, UploadAttachmentRequest,
};
use crate::http::{
    ApiResult, AppState, Authenticated, JsonBody, MarkReadResponse, MessageResponse,
    PostMessageBody, UnreadCountResponse,
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        FromRequest, Multipart, Path, Request, State,
    },
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use common::auth::Principal;
use common::domain::DomainError;

/// JSON `{body}` posts a text message; a multipart body carries an attachment
pub async fn post_message(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
    request: Request,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(multipart_rejection)?;
        return store_attachment(&state, principal, id, multipart).await;
    }

    let JsonBody(body) = JsonBody::<PostMessageBody>::from_request(request, &state).await?;
    let message = state
        .messaging_service
        .post_message(PostMessageRequest {
            principal,
            service_request_id: id,
            body: body.body,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(message.into())))
}

/// Multipart upload: a required `file` part and an optional `body` caption
pub async fn upload_attachment(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    store_attachment(&state, principal, id, multipart).await
}

async fn store_attachment(
    state: &AppState,
    principal: Principal,
    service_request_id: String,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let mut file: Option<(String, Option<String>, Bytes)> = None;
    let mut caption: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "attachment".to_string());
                let mime_type = field.content_type().map(str::to_string);
                let content = field.bytes().await.map_err(multipart_error)?;
                file = Some((file_name, mime_type, content));
            }
            Some("body") => {
                caption = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let (file_name, mime_type, content) = file.ok_or_else(|| {
        DomainError::ValidationError("file: multipart part 'file' is required".to_string())
    })?;

    let message = state
        .messaging_service
        .upload_attachment(UploadAttachmentRequest {
            principal,
            service_request_id,
            file_name,
            mime_type,
            content,
            body: caption,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(message.into())))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .trim_start()
                .to_ascii_lowercase()
                .starts_with("multipart/form-data")
        })
}

/// Oldest first
pub async fn list_messages(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let messages = state
        .messaging_service
        .list_messages(ThreadRequest {
            principal,
            service_request_id: id,
        })
        .await?;

    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Json<UnreadCountResponse>> {
    let unread = state
        .messaging_service
        .unread_count(ThreadRequest {
            principal,
            service_request_id: id,
        })
        .await?;

    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Json<MarkReadResponse>> {
    let updated = state
        .messaging_service
        .mark_read(ThreadRequest {
            principal,
            service_request_id: id,
        })
        .await?;

    Ok(Json(MarkReadResponse { updated }))
}

pub async fn download_attachment(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path((id, message_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let download = state
        .messaging_service
        .download_attachment(DownloadAttachmentRequest {
            principal,
            service_request_id: id,
            message_id,
        })
        .await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        header_safe_file_name(&download.metadata.name)
    );

    Ok((
        [
            (CONTENT_TYPE, download.metadata.mime_type),
            (CONTENT_DISPOSITION, disposition),
        ],
        download.content,
    )
        .into_response())
}

fn multipart_error(error: MultipartError) -> DomainError {
    DomainError::ValidationError(format!("multipart: {}", error.body_text()))
}

fn multipart_rejection(rejection: MultipartRejection) -> DomainError {
    DomainError::ValidationError(format!("multipart: {}", rejection.body_text()))
}

/// Restrict a stored file name to characters that are safe inside a quoted header value
fn header_safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim().is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}
