use crate::domain::RequestAccessGuard;
use chrono::{DateTime, Utc};
use common::auth::{Principal, Role};
use common::domain::{
    CompareAndSetStatusRepoInput, CreateServiceRequestRepoInput, CreateVisitRecordRepoInput,
    DomainError, DomainResult, FarmDirectory, ServiceRequest, ServiceRequestRepository,
    ServiceRequestStatus, UrgencyLevel, VisitRecord, VisitRecordRepository,
};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Service request for opening a veterinary service request
#[derive(Debug, Clone, Validate)]
pub struct CreateServiceRequestRequest {
    #[garde(skip)]
    pub principal: Principal,
    #[garde(length(min = 1))]
    pub provider_id: String,
    #[garde(length(min = 1))]
    pub animal_id: String,
    #[garde(length(min = 1, max = 255))]
    pub purpose: String,
    #[garde(skip)]
    pub description: Option<String>,
    #[garde(skip)]
    pub urgency: UrgencyLevel,
    #[garde(skip)]
    pub scheduled_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Validate)]
pub struct GetServiceRequestRequest {
    #[garde(skip)]
    pub principal: Principal,
    #[garde(length(min = 1))]
    pub service_request_id: String,
}

#[derive(Debug, Clone, Validate)]
pub struct TransitionStatusRequest {
    #[garde(skip)]
    pub principal: Principal,
    #[garde(length(min = 1))]
    pub service_request_id: String,
    #[garde(skip)]
    pub target: ServiceRequestStatus,
    #[garde(skip)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct RecordVisitOutcomeRequest {
    #[garde(skip)]
    pub principal: Principal,
    #[garde(length(min = 1))]
    pub service_request_id: String,
    #[garde(length(min = 1, max = 4000))]
    pub diagnosis: String,
    #[garde(skip)]
    pub treatment: Option<String>,
    #[garde(skip)]
    pub fee_minor_units: Option<i64>,
}

/// Owns the service request state machine
pub struct ServiceRequestService {
    service_request_repository: Arc<dyn ServiceRequestRepository>,
    visit_record_repository: Arc<dyn VisitRecordRepository>,
    directory: Arc<dyn FarmDirectory>,
    guard: RequestAccessGuard,
}

impl ServiceRequestService {
    pub fn new(
        service_request_repository: Arc<dyn ServiceRequestRepository>,
        visit_record_repository: Arc<dyn VisitRecordRepository>,
        directory: Arc<dyn FarmDirectory>,
    ) -> Self {
        let guard = RequestAccessGuard::new(service_request_repository.clone());
        Self {
            service_request_repository,
            visit_record_repository,
            directory,
            guard,
        }
    }

    /// Create a request in `pending`. The requester must own the animal and
    /// the provider must be a registered veterinarian.
    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, provider_id = %request.provider_id, animal_id = %request.animal_id))]
    pub async fn create_service_request(
        &self,
        request: CreateServiceRequestRequest,
    ) -> DomainResult<ServiceRequest> {
        common::garde::validate_struct(&request)?;
        request.principal.require_any_role(&[Role::Farmer])?;

        let now = Utc::now();
        if request.scheduled_time <= now {
            return Err(DomainError::ScheduledTimeNotInFuture(
                request.scheduled_time.to_rfc3339(),
            ));
        }

        match self.directory.owner_of(&request.animal_id).await? {
            None => return Err(DomainError::AnimalNotFound(request.animal_id)),
            Some(owner) if owner != request.principal.id => {
                return Err(DomainError::PermissionDenied(format!(
                    "animal {} belongs to another farmer",
                    request.animal_id
                )))
            }
            Some(_) => {}
        }

        if !self.directory.is_veterinarian(&request.provider_id).await? {
            return Err(DomainError::ProviderNotFound(request.provider_id));
        }

        let service_request_id = xid::new().to_string();
        debug!(service_request_id = %service_request_id, "creating service request");

        self.service_request_repository
            .create_service_request(CreateServiceRequestRepoInput {
                service_request_id,
                requester_id: request.principal.id,
                provider_id: request.provider_id,
                animal_id: request.animal_id,
                purpose: request.purpose,
                description: request.description.filter(|d| !d.trim().is_empty()),
                urgency: request.urgency,
                scheduled_time: request.scheduled_time,
            })
            .await
    }

    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, service_request_id = %request.service_request_id))]
    pub async fn get_service_request(
        &self,
        request: GetServiceRequestRequest,
    ) -> DomainResult<ServiceRequest> {
        common::garde::validate_struct(&request)?;
        let authorized = self
            .guard
            .authorize(&request.service_request_id, &request.principal)
            .await?;
        Ok(authorized.request)
    }

    /// Requests the principal takes part in, newest first
    #[instrument(skip(self, principal), fields(principal_id = %principal.id))]
    pub async fn list_for_actor(&self, principal: &Principal) -> DomainResult<Vec<ServiceRequest>> {
        let requests = self
            .service_request_repository
            .list_service_requests_for_user(&principal.id)
            .await?;
        debug!(count = requests.len(), "listed service requests");
        Ok(requests)
    }

    /// Provider-driven status change
    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, service_request_id = %request.service_request_id, target = %request.target))]
    pub async fn transition_status(
        &self,
        request: TransitionStatusRequest,
    ) -> DomainResult<ServiceRequest> {
        common::garde::validate_struct(&request)?;
        let authorized = self
            .guard
            .authorize_provider(&request.service_request_id, &request.principal)
            .await?;

        let notes = request.notes.filter(|n| !n.trim().is_empty());
        if request.target == ServiceRequestStatus::Completed {
            return self
                .complete_request(&request.service_request_id, notes)
                .await;
        }

        let current = authorized.request.status;
        if !current.can_transition_to(request.target) {
            return Err(current.transition_error(request.target));
        }

        let updated = self
            .service_request_repository
            .compare_and_set_status(CompareAndSetStatusRepoInput {
                service_request_id: request.service_request_id.clone(),
                expected: ServiceRequestStatus::sources_of(request.target).to_vec(),
                target: request.target,
                notes,
            })
            .await?;

        match updated {
            Some(updated) => Ok(updated),
            // Lost a race with another transition
            None => Err(self
                .current_status(&request.service_request_id)
                .await?
                .transition_error(request.target)),
        }
    }

    /// Move an accepted request to `completed`. Completing an already
    /// completed request returns it unchanged.
    #[instrument(skip(self, notes))]
    pub async fn complete_request(
        &self,
        service_request_id: &str,
        notes: Option<String>,
    ) -> DomainResult<ServiceRequest> {
        let updated = self
            .service_request_repository
            .compare_and_set_status(CompareAndSetStatusRepoInput {
                service_request_id: service_request_id.to_string(),
                expected: ServiceRequestStatus::sources_of(ServiceRequestStatus::Completed)
                    .to_vec(),
                target: ServiceRequestStatus::Completed,
                notes,
            })
            .await?;

        if let Some(updated) = updated {
            debug!("service request completed");
            return Ok(updated);
        }

        let current = self
            .service_request_repository
            .get_service_request(service_request_id)
            .await?
            .ok_or_else(|| DomainError::ServiceRequestNotFound(service_request_id.to_string()))?;

        if current.status == ServiceRequestStatus::Completed {
            debug!("service request already completed");
            Ok(current)
        } else {
            Err(current.status.transition_error(ServiceRequestStatus::Completed))
        }
    }

    /// File the visit outcome and complete the request
    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, service_request_id = %request.service_request_id))]
    pub async fn record_visit_outcome(
        &self,
        request: RecordVisitOutcomeRequest,
    ) -> DomainResult<VisitRecord> {
        common::garde::validate_struct(&request)?;
        if matches!(request.fee_minor_units, Some(fee) if fee < 0) {
            return Err(DomainError::ValidationError(
                "fee: must not be negative".to_string(),
            ));
        }

        let authorized = self
            .guard
            .authorize_provider(&request.service_request_id, &request.principal)
            .await?;

        let status = authorized.request.status;
        if !matches!(
            status,
            ServiceRequestStatus::Accepted | ServiceRequestStatus::Completed
        ) {
            return Err(status.transition_error(ServiceRequestStatus::Completed));
        }

        let created = self
            .visit_record_repository
            .create_visit_record(CreateVisitRecordRepoInput {
                visit_record_id: xid::new().to_string(),
                service_request_id: request.service_request_id.clone(),
                recorded_by: request.principal.id,
                diagnosis: request.diagnosis,
                treatment: request.treatment.filter(|t| !t.trim().is_empty()),
                fee_minor_units: request.fee_minor_units,
            })
            .await;

        let record = match created {
            Ok(record) => record,
            // A record filed by an earlier attempt whose completion failed
            Err(DomainError::VisitRecordAlreadyExists(id))
                if status == ServiceRequestStatus::Accepted =>
            {
                debug!("visit record already filed, finishing completion");
                self.visit_record_repository
                    .get_visit_record(&request.service_request_id)
                    .await?
                    .ok_or(DomainError::VisitRecordAlreadyExists(id))?
            }
            Err(e) => return Err(e),
        };

        self.complete_request(&request.service_request_id, None)
            .await?;

        Ok(record)
    }

    #[instrument(skip(self, request), fields(principal_id = %request.principal.id, service_request_id = %request.service_request_id))]
    pub async fn get_visit_record(
        &self,
        request: GetServiceRequestRequest,
    ) -> DomainResult<VisitRecord> {
        common::garde::validate_struct(&request)?;
        self.guard
            .authorize(&request.service_request_id, &request.principal)
            .await?;

        self.visit_record_repository
            .get_visit_record(&request.service_request_id)
            .await?
            .ok_or_else(|| DomainError::VisitRecordNotFound(request.service_request_id.clone()))
    }

    async fn current_status(&self, service_request_id: &str) -> DomainResult<ServiceRequestStatus> {
        self.service_request_repository
            .get_service_request(service_request_id)
            .await?
            .map(|r| r.status)
            .ok_or_else(|| DomainError::ServiceRequestNotFound(service_request_id.to_string()))
    }
}
