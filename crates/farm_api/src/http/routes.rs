//! HTTP route handlers

pub mod device;
pub mod health;
pub mod message;
pub mod service_request;

use crate::http::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};

/// Headroom above the attachment ceiling for multipart framing and the body field
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.messaging_service.max_attachment_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_check))
        // Devices and the assignment ledger
        .route(
            "/devices",
            post(device::register_device).get(device::list_devices),
        )
        .route("/devices/available", get(device::list_available_devices))
        .route("/devices/assignments", get(device::list_open_assignments))
        .route("/devices/assign", post(device::assign_device))
        .route("/devices/:device_id", get(device::get_device))
        .route("/devices/:device_id/status", patch(device::set_device_status))
        .route("/devices/:device_id/release", post(device::release_device))
        .route(
            "/devices/:device_id/assignment",
            get(device::current_assignment),
        )
        .route("/devices/:device_id/history", get(device::assignment_history))
        // Service requests
        .route(
            "/service-requests",
            post(service_request::create_service_request)
                .get(service_request::list_service_requests),
        )
        .route(
            "/service-requests/:id",
            get(service_request::get_service_request),
        )
        .route(
            "/service-requests/:id/status",
            patch(service_request::transition_status),
        )
        .route(
            "/service-requests/:id/visit-record",
            post(service_request::record_visit_outcome).get(service_request::get_visit_record),
        )
        // Request chat
        .route(
            "/service-requests/:id/messages",
            post(message::post_message)
                .layer(DefaultBodyLimit::max(upload_limit))
                .get(message::list_messages),
        )
        .route(
            "/service-requests/:id/attachments",
            post(message::upload_attachment).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/service-requests/:id/messages/unread",
            get(message::unread_count),
        )
        .route("/service-requests/:id/messages/read", post(message::mark_read))
        .route(
            "/service-requests/:id/messages/:message_id/attachment",
            get(message::download_attachment),
        )
        .with_state(state)
}
