use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// How urgently the farmer needs the visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Emergency,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::High => "high",
            UrgencyLevel::Emergency => "emergency",
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UrgencyLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(UrgencyLevel::Low),
            "medium" => Ok(UrgencyLevel::Medium),
            "high" => Ok(UrgencyLevel::High),
            "emergency" => Ok(UrgencyLevel::Emergency),
            other => Err(DomainError::InvalidUrgency(other.to_string())),
        }
    }
}

/// Lifecycle status of a service request.
///
/// ```text
/// pending  --accept-->   accepted
/// pending  --reject-->   rejected
/// accepted --complete--> completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceRequestStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl ServiceRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRequestStatus::Pending => "pending",
            ServiceRequestStatus::Accepted => "accepted",
            ServiceRequestStatus::Rejected => "rejected",
            ServiceRequestStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServiceRequestStatus::Rejected | ServiceRequestStatus::Completed
        )
    }

    /// Statuses from which `target` is directly reachable
    pub fn sources_of(target: ServiceRequestStatus) -> &'static [ServiceRequestStatus] {
        match target {
            ServiceRequestStatus::Pending => &[],
            ServiceRequestStatus::Accepted | ServiceRequestStatus::Rejected => {
                &[ServiceRequestStatus::Pending]
            }
            ServiceRequestStatus::Completed => &[ServiceRequestStatus::Accepted],
        }
    }

    pub fn can_transition_to(&self, target: ServiceRequestStatus) -> bool {
        Self::sources_of(target).contains(self)
    }

    /// Conflict error describing a refused move from `self` to `target`
    pub fn transition_error(&self, target: ServiceRequestStatus) -> DomainError {
        DomainError::InvalidStatusTransition {
            from: self.as_str().to_string(),
            to: target.as_str().to_string(),
        }
    }
}

impl fmt::Display for ServiceRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceRequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ServiceRequestStatus::Pending),
            "accepted" => Ok(ServiceRequestStatus::Accepted),
            "rejected" => Ok(ServiceRequestStatus::Rejected),
            "completed" => Ok(ServiceRequestStatus::Completed),
            other => Err(DomainError::InvalidStatus(format!(
                "unknown service request status '{}'",
                other
            ))),
        }
    }
}

/// A farmer's request for veterinary attention on one animal
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub service_request_id: String,
    pub requester_id: String,
    pub provider_id: String,
    pub animal_id: String,
    pub purpose: String,
    pub description: Option<String>,
    pub urgency: UrgencyLevel,
    pub scheduled_time: DateTime<Utc>,
    pub status: ServiceRequestStatus,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Repository input for creating a service request (ID already generated)
#[derive(Debug, Clone, PartialEq)]
pub struct CreateServiceRequestRepoInput {
    pub service_request_id: String,
    pub requester_id: String,
    pub provider_id: String,
    pub animal_id: String,
    pub purpose: String,
    pub description: Option<String>,
    pub urgency: UrgencyLevel,
    pub scheduled_time: DateTime<Utc>,
}

/// Conditional status write: applied only if the current status is one of
/// `expected`. `notes`, when present, replaces the stored notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareAndSetStatusRepoInput {
    pub service_request_id: String,
    pub expected: Vec<ServiceRequestStatus>,
    pub target: ServiceRequestStatus,
    pub notes: Option<String>,
}

/// Repository trait for service request persistence
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ServiceRequestRepository: Send + Sync {
    /// Persist a new request in `pending`
    async fn create_service_request(
        &self,
        input: CreateServiceRequestRepoInput,
    ) -> DomainResult<ServiceRequest>;

    async fn get_service_request(
        &self,
        service_request_id: &str,
    ) -> DomainResult<Option<ServiceRequest>>;

    /// Requests where the user is requester or provider, newest first
    async fn list_service_requests_for_user(
        &self,
        user_id: &str,
    ) -> DomainResult<Vec<ServiceRequest>>;

    /// Atomic status update serialized per request. Returns `None` when the
    /// request is missing or its status is not in `expected`.
    async fn compare_and_set_status(
        &self,
        input: CompareAndSetStatusRepoInput,
    ) -> DomainResult<Option<ServiceRequest>>;
}
