use common::auth::{Principal, Role};
use common::domain::{
    AssignmentRecord, AssignmentRepository, CloseAssignmentRepoInput, Device, DeviceRepository,
    DomainError, DomainResult, FarmDirectory, OpenAssignmentRepoInput,
};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Service request for attaching a device to an animal
#[derive(Debug, Clone, Validate)]
pub struct AssignDeviceRequest {
    #[garde(skip)]
    pub principal: Principal,
    #[garde(length(min = 1))]
    pub device_external_id: String,
    #[garde(length(min = 1))]
    pub animal_id: String,
}

#[derive(Debug, Clone, Validate)]
pub struct ReleaseDeviceRequest {
    #[garde(skip)]
    pub principal: Principal,
    #[garde(length(min = 1))]
    pub device_external_id: String,
}

const LEDGER_ROLES: &[Role] = &[Role::Farmer, Role::Operator];

/// Maintains device-to-animal assignment intervals.
///
/// Operators may manage any device. Farmers only touch assignments whose
/// animal they own.
pub struct AssignmentLedgerService {
    device_repository: Arc<dyn DeviceRepository>,
    assignment_repository: Arc<dyn AssignmentRepository>,
    directory: Arc<dyn FarmDirectory>,
}

impl AssignmentLedgerService {
    pub fn new(
        device_repository: Arc<dyn DeviceRepository>,
        assignment_repository: Arc<dyn AssignmentRepository>,
        directory: Arc<dyn FarmDirectory>,
    ) -> Self {
        Self {
            device_repository,
            assignment_repository,
            directory,
        }
    }

    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, device = %request.device_external_id, animal_id = %request.animal_id))]
    pub async fn assign(&self, request: AssignDeviceRequest) -> DomainResult<AssignmentRecord> {
        common::garde::validate_struct(&request)?;
        request.principal.require_any_role(LEDGER_ROLES)?;

        self.require_animal_access(&request.principal, &request.animal_id)
            .await?;

        let assignment_id = xid::new().to_string();
        debug!(assignment_id = %assignment_id, "opening assignment");

        self.assignment_repository
            .open_assignment(OpenAssignmentRepoInput {
                assignment_id,
                device_external_id: request.device_external_id,
                animal_id: request.animal_id,
            })
            .await
    }

    /// Close the device's open record. Returns `None` when nothing was open.
    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, device = %request.device_external_id))]
    pub async fn release(
        &self,
        request: ReleaseDeviceRequest,
    ) -> DomainResult<Option<AssignmentRecord>> {
        common::garde::validate_struct(&request)?;
        request.principal.require_any_role(LEDGER_ROLES)?;

        let device = self.resolve_device(&request.device_external_id).await?;
        let Some(current) = self
            .assignment_repository
            .current_assignment(&device.device_id)
            .await?
        else {
            debug!("device has no open assignment");
            return Ok(None);
        };

        // Operators can release devices whose animal has left the directory
        if !request.principal.has_role(Role::Operator) {
            self.require_animal_access(&request.principal, &current.animal_id)
                .await?;
        }

        // Closing by record id keeps a concurrent release from closing a newer interval
        self.assignment_repository
            .close_assignment(CloseAssignmentRepoInput {
                assignment_id: current.assignment_id,
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn current_assignment(
        &self,
        device_external_id: &str,
    ) -> DomainResult<Option<AssignmentRecord>> {
        let device = self.resolve_device(device_external_id).await?;
        self.assignment_repository
            .current_assignment(&device.device_id)
            .await
    }

    /// All intervals for a device, newest first
    #[instrument(skip(self))]
    pub async fn history(&self, device_external_id: &str) -> DomainResult<Vec<AssignmentRecord>> {
        let device = self.resolve_device(device_external_id).await?;
        self.assignment_repository
            .assignment_history(&device.device_id)
            .await
    }

    /// Active devices with no open record
    #[instrument(skip(self))]
    pub async fn list_available_devices(&self) -> DomainResult<Vec<Device>> {
        self.device_repository.list_available_devices().await
    }

    #[instrument(skip(self))]
    pub async fn list_open_assignments(&self) -> DomainResult<Vec<AssignmentRecord>> {
        self.assignment_repository.list_open_assignments().await
    }

    async fn resolve_device(&self, external_id: &str) -> DomainResult<Device> {
        self.device_repository
            .get_device_by_external_id(external_id)
            .await?
            .ok_or_else(|| DomainError::DeviceNotFound(external_id.to_string()))
    }

    async fn require_animal_access(&self, principal: &Principal, animal_id: &str) -> DomainResult<()> {
        let owner = self
            .directory
            .owner_of(animal_id)
            .await?
            .ok_or_else(|| DomainError::AnimalNotFound(animal_id.to_string()))?;

        if principal.has_role(Role::Farmer) && owner != principal.id {
            return Err(DomainError::PermissionDenied(format!(
                "animal {} belongs to another farmer",
                animal_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::domain::{
        DeviceStatus, MockAssignmentRepository, MockDeviceRepository, MockFarmDirectory,
    };

    fn device() -> Device {
        Device {
            device_id: "dev-1".to_string(),
            external_id: "D-100".to_string(),
            name: "Collar".to_string(),
            description: None,
            status: DeviceStatus::Active,
            created_at: None,
            updated_at: None,
        }
    }

    fn record(assignment_id: &str, animal_id: &str) -> AssignmentRecord {
        AssignmentRecord {
            assignment_id: assignment_id.to_string(),
            device_id: "dev-1".to_string(),
            animal_id: animal_id.to_string(),
            assigned_at: Utc::now(),
            removed_at: None,
        }
    }

    fn directory_owning(animal_id: &'static str, owner: &'static str) -> MockFarmDirectory {
        let mut directory = MockFarmDirectory::new();
        directory
            .expect_owner_of()
            .withf(move |id: &str| id == animal_id)
            .returning(move |_| Ok(Some(owner.to_string())));
        directory
    }

    fn farmer() -> Principal {
        Principal::new("1", Role::Farmer)
    }

    #[tokio::test]
    async fn test_assign_success() {
        let mut assignment_repo = MockAssignmentRepository::new();
        assignment_repo
            .expect_open_assignment()
            .withf(|input: &OpenAssignmentRepoInput| {
                !input.assignment_id.is_empty()
                    && input.device_external_id == "D-100"
                    && input.animal_id == "10"
            })
            .times(1)
            .return_once(|input| Ok(record(&input.assignment_id, &input.animal_id)));

        let service = AssignmentLedgerService::new(
            Arc::new(MockDeviceRepository::new()),
            Arc::new(assignment_repo),
            Arc::new(directory_owning("10", "1")),
        );

        let record = service
            .assign(AssignDeviceRequest {
                principal: farmer(),
                device_external_id: "D-100".to_string(),
                animal_id: "10".to_string(),
            })
            .await
            .unwrap();

        assert!(record.is_open());
        assert_eq!(record.animal_id, "10");
    }

    #[tokio::test]
    async fn test_assign_conflict_passes_through() {
        let mut assignment_repo = MockAssignmentRepository::new();
        assignment_repo
            .expect_open_assignment()
            .times(1)
            .return_once(|input| Err(DomainError::DeviceAlreadyAssigned(input.device_external_id)));

        let service = AssignmentLedgerService::new(
            Arc::new(MockDeviceRepository::new()),
            Arc::new(assignment_repo),
            Arc::new(directory_owning("11", "1")),
        );

        let result = service
            .assign(AssignDeviceRequest {
                principal: farmer(),
                device_external_id: "D-100".to_string(),
                animal_id: "11".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::DeviceAlreadyAssigned(_))));
    }

    #[tokio::test]
    async fn test_farmer_cannot_assign_foreign_animal() {
        let service = AssignmentLedgerService::new(
            Arc::new(MockDeviceRepository::new()),
            Arc::new(MockAssignmentRepository::new()),
            Arc::new(directory_owning("10", "2")),
        );

        let result = service
            .assign(AssignDeviceRequest {
                principal: farmer(),
                device_external_id: "D-100".to_string(),
                animal_id: "10".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_operator_may_assign_any_animal() {
        let mut assignment_repo = MockAssignmentRepository::new();
        assignment_repo
            .expect_open_assignment()
            .times(1)
            .return_once(|input| Ok(record(&input.assignment_id, &input.animal_id)));

        let service = AssignmentLedgerService::new(
            Arc::new(MockDeviceRepository::new()),
            Arc::new(assignment_repo),
            Arc::new(directory_owning("10", "2")),
        );

        let result = service
            .assign(AssignDeviceRequest {
                principal: Principal::new("op-1", Role::Operator),
                device_external_id: "D-100".to_string(),
                animal_id: "10".to_string(),
            })
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_veterinarian_cannot_assign() {
        let service = AssignmentLedgerService::new(
            Arc::new(MockDeviceRepository::new()),
            Arc::new(MockAssignmentRepository::new()),
            Arc::new(MockFarmDirectory::new()),
        );

        let result = service
            .assign(AssignDeviceRequest {
                principal: Principal::new("5", Role::Veterinarian),
                device_external_id: "D-100".to_string(),
                animal_id: "10".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_assign_unknown_animal() {
        let mut directory = MockFarmDirectory::new();
        directory.expect_owner_of().times(1).return_once(|_| Ok(None));

        let service = AssignmentLedgerService::new(
            Arc::new(MockDeviceRepository::new()),
            Arc::new(MockAssignmentRepository::new()),
            Arc::new(directory),
        );

        let result = service
            .assign(AssignDeviceRequest {
                principal: farmer(),
                device_external_id: "D-100".to_string(),
                animal_id: "404".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::AnimalNotFound(_))));
    }

    #[tokio::test]
    async fn test_release_without_open_record_is_noop() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device_by_external_id()
            .times(1)
            .return_once(|_| Ok(Some(device())));

        let mut assignment_repo = MockAssignmentRepository::new();
        assignment_repo
            .expect_current_assignment()
            .times(1)
            .return_once(|_| Ok(None));
        assignment_repo.expect_close_assignment().never();

        let service = AssignmentLedgerService::new(
            Arc::new(device_repo),
            Arc::new(assignment_repo),
            Arc::new(MockFarmDirectory::new()),
        );

        let result = service
            .release(ReleaseDeviceRequest {
                principal: farmer(),
                device_external_id: "D-100".to_string(),
            })
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_release_closes_current_record_by_id() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device_by_external_id()
            .times(1)
            .return_once(|_| Ok(Some(device())));

        let mut assignment_repo = MockAssignmentRepository::new();
        assignment_repo
            .expect_current_assignment()
            .withf(|device_id: &str| device_id == "dev-1")
            .times(1)
            .return_once(|_| Ok(Some(record("a-1", "10"))));
        assignment_repo
            .expect_close_assignment()
            .withf(|input: &CloseAssignmentRepoInput| input.assignment_id == "a-1")
            .times(1)
            .return_once(|_| {
                let mut closed = record("a-1", "10");
                closed.removed_at = Some(Utc::now());
                Ok(Some(closed))
            });

        let service = AssignmentLedgerService::new(
            Arc::new(device_repo),
            Arc::new(assignment_repo),
            Arc::new(directory_owning("10", "1")),
        );

        let closed = service
            .release(ReleaseDeviceRequest {
                principal: farmer(),
                device_external_id: "D-100".to_string(),
            })
            .await
            .unwrap()
            .unwrap();

        assert!(!closed.is_open());
    }

    #[tokio::test]
    async fn test_operator_releases_device_of_removed_animal() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device_by_external_id()
            .times(1)
            .return_once(|_| Ok(Some(device())));

        let mut assignment_repo = MockAssignmentRepository::new();
        assignment_repo
            .expect_current_assignment()
            .times(1)
            .return_once(|_| Ok(Some(record("a-1", "10"))));
        assignment_repo
            .expect_close_assignment()
            .withf(|input: &CloseAssignmentRepoInput| input.assignment_id == "a-1")
            .times(1)
            .return_once(|_| {
                let mut closed = record("a-1", "10");
                closed.removed_at = Some(Utc::now());
                Ok(Some(closed))
            });

        let mut directory = MockFarmDirectory::new();
        directory.expect_owner_of().never();

        let service = AssignmentLedgerService::new(
            Arc::new(device_repo),
            Arc::new(assignment_repo),
            Arc::new(directory),
        );

        let closed = service
            .release(ReleaseDeviceRequest {
                principal: Principal::new("9", Role::Operator),
                device_external_id: "D-100".to_string(),
            })
            .await
            .unwrap()
            .unwrap();

        assert!(closed.removed_at.is_some());
    }

    #[tokio::test]
    async fn test_farmer_cannot_release_device_of_removed_animal() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device_by_external_id()
            .times(1)
            .return_once(|_| Ok(Some(device())));

        let mut assignment_repo = MockAssignmentRepository::new();
        assignment_repo
            .expect_current_assignment()
            .times(1)
            .return_once(|_| Ok(Some(record("a-1", "10"))));
        assignment_repo.expect_close_assignment().never();

        let mut directory = MockFarmDirectory::new();
        directory.expect_owner_of().times(1).return_once(|_| Ok(None));

        let service = AssignmentLedgerService::new(
            Arc::new(device_repo),
            Arc::new(assignment_repo),
            Arc::new(directory),
        );

        let result = service
            .release(ReleaseDeviceRequest {
                principal: farmer(),
                device_external_id: "D-100".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::AnimalNotFound(_))));
    }

    #[tokio::test]
    async fn test_release_unknown_device() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_device_by_external_id()
            .times(1)
            .return_once(|_| Ok(None));

        let service = AssignmentLedgerService::new(
            Arc::new(device_repo),
            Arc::new(MockAssignmentRepository::new()),
            Arc::new(MockFarmDirectory::new()),
        );

        let result = service
            .release(ReleaseDeviceRequest {
                principal: farmer(),
                device_external_id: "D-404".to_string(),
            })
            .await;

        assert!(matches!(result, Err(DomainError::DeviceNotFound(_))));
    }
}
