//! Service request lifecycle and visit outcome endpoints

use crate::domain::{
    CreateServiceRequestRequest, GetServiceRequestRequest, RecordVisitOutcomeRequest,
    TransitionStatusRequest,
};
use crate::http::{
    ApiResult, AppState, Authenticated, CreateServiceRequestBody, JsonBody,
    ServiceRequestResponse, TransitionStatusBody, VisitRecordBody, VisitRecordResponse,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common::domain::{ServiceRequestStatus, UrgencyLevel};

pub async fn create_service_request(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    JsonBody(body): JsonBody<CreateServiceRequestBody>,
) -> ApiResult<(StatusCode, Json<ServiceRequestResponse>)> {
    let urgency: UrgencyLevel = body.urgency_level.parse()?;

    let request = state
        .service_request_service
        .create_service_request(CreateServiceRequestRequest {
            principal,
            provider_id: body.provider_id,
            animal_id: body.animal_id,
            purpose: body.purpose,
            description: body.description,
            urgency,
            scheduled_time: body.scheduled_time,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(request.into())))
}

/// Requests the caller takes part in, newest first
pub async fn list_service_requests(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> ApiResult<Json<Vec<ServiceRequestResponse>>> {
    let requests = state
        .service_request_service
        .list_for_actor(&principal)
        .await?;
    Ok(Json(requests.into_iter().map(Into::into).collect()))
}

pub async fn get_service_request(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Json<ServiceRequestResponse>> {
    let request = state
        .service_request_service
        .get_service_request(GetServiceRequestRequest {
            principal,
            service_request_id: id,
        })
        .await?;

    Ok(Json(request.into()))
}

pub async fn transition_status(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<TransitionStatusBody>,
) -> ApiResult<Json<ServiceRequestResponse>> {
    let target: ServiceRequestStatus = body.status.parse()?;

    let request = state
        .service_request_service
        .transition_status(TransitionStatusRequest {
            principal,
            service_request_id: id,
            target,
            notes: body.notes,
        })
        .await?;

    Ok(Json(request.into()))
}

pub async fn record_visit_outcome(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<VisitRecordBody>,
) -> ApiResult<(StatusCode, Json<VisitRecordResponse>)> {
    let record = state
        .service_request_service
        .record_visit_outcome(RecordVisitOutcomeRequest {
            principal,
            service_request_id: id,
            diagnosis: body.diagnosis,
            treatment: body.treatment,
            fee_minor_units: body.fee,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(record.into())))
}

pub async fn get_visit_record(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> ApiResult<Json<VisitRecordResponse>> {
    let record = state
        .service_request_service
        .get_visit_record(GetServiceRequestRequest {
            principal,
            service_request_id: id,
        })
        .await?;

    Ok(Json(record.into()))
}
