//! Device registry and assignment ledger endpoints

use crate::domain::{
    AssignDeviceRequest, DeviceWithAssignment, GetDeviceRequest, RegisterDeviceRequest,
    ReleaseDeviceRequest, SetDeviceStatusRequest,
};
use crate::http::{
    ApiResult, AppState, AssignDeviceBody, AssignmentResponse, Authenticated, DeviceResponse,
    JsonBody, RegisterDeviceBody, ReleaseResponse, SetDeviceStatusBody,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common::domain::DeviceStatus;

pub async fn register_device(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    JsonBody(body): JsonBody<RegisterDeviceBody>,
) -> ApiResult<(StatusCode, Json<DeviceResponse>)> {
    let device = state
        .device_service
        .register_device(RegisterDeviceRequest {
            principal,
            external_id: body.external_id,
            name: body.name,
            description: body.description,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(device.into())))
}

pub async fn list_devices(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
) -> ApiResult<Json<Vec<DeviceResponse>>> {
    let devices = state.device_service.list_devices().await?;
    Ok(Json(devices.into_iter().map(Into::into).collect()))
}

/// Active devices with no open assignment
pub async fn list_available_devices(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
) -> ApiResult<Json<Vec<DeviceResponse>>> {
    let devices = state.ledger_service.list_available_devices().await?;
    Ok(Json(
        devices
            .into_iter()
            .map(|device| {
                DeviceWithAssignment {
                    device,
                    current_assignment: None,
                }
                .into()
            })
            .collect(),
    ))
}

pub async fn list_open_assignments(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
) -> ApiResult<Json<Vec<AssignmentResponse>>> {
    let records = state.ledger_service.list_open_assignments().await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

pub async fn assign_device(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    JsonBody(body): JsonBody<AssignDeviceBody>,
) -> ApiResult<Json<AssignmentResponse>> {
    let record = state
        .ledger_service
        .assign(AssignDeviceRequest {
            principal,
            device_external_id: body.device_id,
            animal_id: body.animal_id,
        })
        .await?;

    Ok(Json(record.into()))
}

pub async fn get_device(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
    Path(device_id): Path<String>,
) -> ApiResult<Json<DeviceResponse>> {
    let device = state
        .device_service
        .get_device(GetDeviceRequest {
            external_id: device_id,
        })
        .await?;

    Ok(Json(device.into()))
}

pub async fn set_device_status(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(device_id): Path<String>,
    JsonBody(body): JsonBody<SetDeviceStatusBody>,
) -> ApiResult<Json<DeviceResponse>> {
    let status: DeviceStatus = body.status.parse()?;

    let device = state
        .device_service
        .set_device_status(SetDeviceStatusRequest {
            principal,
            external_id: device_id,
            status,
        })
        .await?;

    Ok(Json(device.into()))
}

/// Idempotent; `released` is false when nothing was open
pub async fn release_device(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(device_id): Path<String>,
) -> ApiResult<Json<ReleaseResponse>> {
    let closed = state
        .ledger_service
        .release(ReleaseDeviceRequest {
            principal,
            device_external_id: device_id,
        })
        .await?;

    Ok(Json(ReleaseResponse {
        released: closed.is_some(),
        assignment: closed.map(Into::into),
    }))
}

pub async fn current_assignment(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Option<AssignmentResponse>>> {
    let record = state.ledger_service.current_assignment(&device_id).await?;
    Ok(Json(record.map(Into::into)))
}

/// Newest first
pub async fn assignment_history(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Vec<AssignmentResponse>>> {
    let records = state.ledger_service.history(&device_id).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}
