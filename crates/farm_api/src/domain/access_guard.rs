use common::auth::{Principal, Role};
use common::domain::{DomainError, DomainResult, ServiceRequest, ServiceRequestRepository};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Which side of a service request a principal is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantRole {
    Requester,
    Provider,
}

/// The single participant predicate. Every gated request operation goes
/// through here; nothing else compares principal ids with request parties.
pub fn participant_role(request: &ServiceRequest, principal: &Principal) -> Option<ParticipantRole> {
    if principal.id == request.requester_id {
        Some(ParticipantRole::Requester)
    } else if principal.has_role(Role::Veterinarian) && principal.id == request.provider_id {
        Some(ParticipantRole::Provider)
    } else {
        None
    }
}

pub fn is_participant(request: &ServiceRequest, principal: &Principal) -> bool {
    participant_role(request, principal).is_some()
}

/// A service request loaded on behalf of one of its participants
#[derive(Debug, Clone)]
pub struct AuthorizedRequest {
    pub request: ServiceRequest,
    pub role: ParticipantRole,
}

impl AuthorizedRequest {
    pub fn is_provider(&self) -> bool {
        self.role == ParticipantRole::Provider
    }
}

/// Loads service requests and admits only their participants
pub struct RequestAccessGuard {
    service_request_repository: Arc<dyn ServiceRequestRepository>,
}

impl RequestAccessGuard {
    pub fn new(service_request_repository: Arc<dyn ServiceRequestRepository>) -> Self {
        Self {
            service_request_repository,
        }
    }

    #[instrument(skip(self, principal), fields(principal_id = %principal.id))]
    pub async fn authorize(
        &self,
        service_request_id: &str,
        principal: &Principal,
    ) -> DomainResult<AuthorizedRequest> {
        let request = self
            .service_request_repository
            .get_service_request(service_request_id)
            .await?
            .ok_or_else(|| DomainError::ServiceRequestNotFound(service_request_id.to_string()))?;

        match participant_role(&request, principal) {
            Some(role) => Ok(AuthorizedRequest { request, role }),
            None => {
                debug!("principal is not a participant");
                Err(DomainError::PermissionDenied(format!(
                    "not a participant of service request {}",
                    service_request_id
                )))
            }
        }
    }

    /// Like `authorize`, but only the assigned provider passes
    pub async fn authorize_provider(
        &self,
        service_request_id: &str,
        principal: &Principal,
    ) -> DomainResult<AuthorizedRequest> {
        let authorized = self.authorize(service_request_id, principal).await?;
        if !authorized.is_provider() {
            return Err(DomainError::PermissionDenied(format!(
                "only the provider may act on service request {}",
                service_request_id
            )));
        }
        Ok(authorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::domain::{MockServiceRequestRepository, ServiceRequestStatus, UrgencyLevel};

    fn request() -> ServiceRequest {
        ServiceRequest {
            service_request_id: "sr-1".to_string(),
            requester_id: "1".to_string(),
            provider_id: "5".to_string(),
            animal_id: "10".to_string(),
            purpose: "checkup".to_string(),
            description: None,
            urgency: UrgencyLevel::Medium,
            scheduled_time: Utc::now(),
            status: ServiceRequestStatus::Pending,
            notes: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn guard_with(request: Option<ServiceRequest>) -> RequestAccessGuard {
        let mut repo = MockServiceRequestRepository::new();
        repo.expect_get_service_request()
            .times(1)
            .return_once(move |_| Ok(request));
        RequestAccessGuard::new(Arc::new(repo))
    }

    #[test]
    fn test_participant_roles() {
        let request = request();
        assert_eq!(
            participant_role(&request, &Principal::new("1", Role::Farmer)),
            Some(ParticipantRole::Requester)
        );
        assert_eq!(
            participant_role(&request, &Principal::new("5", Role::Veterinarian)),
            Some(ParticipantRole::Provider)
        );
        assert!(!is_participant(&request, &Principal::new("7", Role::Farmer)));
        assert!(!is_participant(&request, &Principal::new("7", Role::Operator)));
    }

    #[test]
    fn test_provider_id_without_vet_role_is_not_participant() {
        let request = request();
        assert!(!is_participant(&request, &Principal::new("5", Role::Farmer)));
    }

    #[tokio::test]
    async fn test_authorize_outsider_denied() {
        let guard = guard_with(Some(request()));
        let result = guard
            .authorize("sr-1", &Principal::new("7", Role::Veterinarian))
            .await;
        assert!(matches!(result, Err(DomainError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_authorize_missing_request() {
        let guard = guard_with(None);
        let result = guard.authorize("sr-9", &Principal::new("1", Role::Farmer)).await;
        assert!(matches!(result, Err(DomainError::ServiceRequestNotFound(_))));
    }

    #[tokio::test]
    async fn test_authorize_provider_rejects_requester() {
        let guard = guard_with(Some(request()));
        let result = guard
            .authorize_provider("sr-1", &Principal::new("1", Role::Farmer))
            .await;
        assert!(matches!(result, Err(DomainError::PermissionDenied(_))));
    }
}
