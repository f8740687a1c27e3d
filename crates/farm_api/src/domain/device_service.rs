use common::auth::{Principal, Role};
use common::domain::{
    AssignmentRecord, AssignmentRepository, CreateDeviceRepoInput, Device, DeviceRepository,
    DeviceStatus, DomainError, DomainResult, UpdateDeviceStatusRepoInput,
};
use garde::Validate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Service request for registering a device
#[derive(Debug, Clone, Validate)]
pub struct RegisterDeviceRequest {
    #[garde(skip)] // role checked by the service
    pub principal: Principal,
    #[garde(length(min = 1, max = 128))]
    pub external_id: String,
    #[garde(length(min = 1, max = 255))]
    pub name: String,
    #[garde(skip)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct SetDeviceStatusRequest {
    #[garde(skip)]
    pub principal: Principal,
    #[garde(length(min = 1))]
    pub external_id: String,
    #[garde(skip)]
    pub status: DeviceStatus,
}

#[derive(Debug, Clone, Validate)]
pub struct GetDeviceRequest {
    #[garde(length(min = 1))]
    pub external_id: String,
}

/// A device together with its derived current assignment
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceWithAssignment {
    pub device: Device,
    pub current_assignment: Option<AssignmentRecord>,
}

/// Device registry. The current animal is never stored on a device; it is
/// read from the assignment ledger on every call.
pub struct DeviceService {
    device_repository: Arc<dyn DeviceRepository>,
    assignment_repository: Arc<dyn AssignmentRepository>,
}

impl DeviceService {
    pub fn new(
        device_repository: Arc<dyn DeviceRepository>,
        assignment_repository: Arc<dyn AssignmentRepository>,
    ) -> Self {
        Self {
            device_repository,
            assignment_repository,
        }
    }

    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, external_id = %request.external_id))]
    pub async fn register_device(
        &self,
        request: RegisterDeviceRequest,
    ) -> DomainResult<DeviceWithAssignment> {
        common::garde::validate_struct(&request)?;
        request.principal.require_any_role(&[Role::Operator])?;

        let device_id = xid::new().to_string();
        debug!(device_id = %device_id, "registering device");

        let device = self
            .device_repository
            .create_device(CreateDeviceRepoInput {
                device_id,
                external_id: request.external_id,
                name: request.name,
                description: request.description.filter(|d| !d.trim().is_empty()),
            })
            .await?;

        Ok(DeviceWithAssignment {
            device,
            current_assignment: None,
        })
    }

    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, external_id = %request.external_id, status = %request.status))]
    pub async fn set_device_status(
        &self,
        request: SetDeviceStatusRequest,
    ) -> DomainResult<DeviceWithAssignment> {
        common::garde::validate_struct(&request)?;
        request.principal.require_any_role(&[Role::Operator])?;

        let device = self
            .device_repository
            .update_device_status(UpdateDeviceStatusRepoInput {
                external_id: request.external_id,
                status: request.status,
            })
            .await?;

        self.with_assignment(device).await
    }

    #[instrument(skip(self, request), fields(external_id = %request.external_id))]
    pub async fn get_device(&self, request: GetDeviceRequest) -> DomainResult<DeviceWithAssignment> {
        common::garde::validate_struct(&request)?;

        let device = self
            .device_repository
            .get_device_by_external_id(&request.external_id)
            .await?
            .ok_or_else(|| DomainError::DeviceNotFound(request.external_id.clone()))?;

        self.with_assignment(device).await
    }

    /// Every device, newest registration first
    #[instrument(skip(self))]
    pub async fn list_devices(&self) -> DomainResult<Vec<DeviceWithAssignment>> {
        let devices = self.device_repository.list_devices().await?;
        let mut open: HashMap<String, AssignmentRecord> = self
            .assignment_repository
            .list_open_assignments()
            .await?
            .into_iter()
            .map(|a| (a.device_id.clone(), a))
            .collect();

        debug!(count = devices.len(), "listed devices");
        Ok(devices
            .into_iter()
            .map(|device| {
                let current_assignment = open.remove(&device.device_id);
                DeviceWithAssignment {
                    device,
                    current_assignment,
                }
            })
            .collect())
    }

    async fn with_assignment(&self, device: Device) -> DomainResult<DeviceWithAssignment> {
        let current_assignment = self
            .assignment_repository
            .current_assignment(&device.device_id)
            .await?;
        Ok(DeviceWithAssignment {
            device,
            current_assignment,
        })
    }
}
