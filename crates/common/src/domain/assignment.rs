use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One interval during which a device was attached to an animal.
/// Open while `removed_at` is `None`; immutable once closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRecord {
    pub assignment_id: String,
    pub device_id: String,
    pub animal_id: String,
    pub assigned_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
}

impl AssignmentRecord {
    pub fn is_open(&self) -> bool {
        self.removed_at.is_none()
    }

    /// Whether the half-open intervals `[assigned_at, removed_at)` intersect.
    /// An open record extends to infinity.
    pub fn overlaps(&self, other: &AssignmentRecord) -> bool {
        let starts_before_other_ends = match other.removed_at {
            Some(end) => self.assigned_at < end,
            None => true,
        };
        let other_starts_before_self_ends = match self.removed_at {
            Some(end) => other.assigned_at < end,
            None => true,
        };
        starts_before_other_ends && other_starts_before_self_ends
    }
}

/// Repository input for opening an assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAssignmentRepoInput {
    pub assignment_id: String,
    pub device_external_id: String,
    pub animal_id: String,
}

/// Repository input for closing a specific open assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseAssignmentRepoInput {
    pub assignment_id: String,
}

/// Append-only ledger of device-to-animal intervals.
///
/// Mutations are serialized per device: implementations must make the
/// "no open record" check and the insert atomic.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Open a record for the device. Fails with DeviceNotFound,
    /// DeviceInactive, DeviceAlreadyAssigned or AnimalAlreadyAssigned.
    async fn open_assignment(&self, input: OpenAssignmentRepoInput)
        -> DomainResult<AssignmentRecord>;

    /// Close the given record if it is still open. Returns `None` when it
    /// was already closed.
    async fn close_assignment(
        &self,
        input: CloseAssignmentRepoInput,
    ) -> DomainResult<Option<AssignmentRecord>>;

    /// The open record for a device, if any
    async fn current_assignment(&self, device_id: &str) -> DomainResult<Option<AssignmentRecord>>;

    /// Every record for a device, newest first
    async fn assignment_history(&self, device_id: &str) -> DomainResult<Vec<AssignmentRecord>>;

    /// Every open record across all devices, newest first
    async fn list_open_assignments(&self) -> DomainResult<Vec<AssignmentRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(start_min: i64, end_min: Option<i64>) -> AssignmentRecord {
        let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        AssignmentRecord {
            assignment_id: format!("a-{}", start_min),
            device_id: "dev-1".to_string(),
            animal_id: "10".to_string(),
            assigned_at: base + Duration::minutes(start_min),
            removed_at: end_min.map(|m| base + Duration::minutes(m)),
        }
    }

    #[test]
    fn test_adjacent_intervals_do_not_overlap() {
        let first = record(0, Some(10));
        let second = record(10, None);
        assert!(!first.overlaps(&second));
        assert!(!second.overlaps(&first));
    }

    #[test]
    fn test_open_record_overlaps_later_start() {
        let open = record(0, None);
        let later = record(30, Some(40));
        assert!(open.overlaps(&later));
        assert!(open.is_open());
        assert!(!later.is_open());
    }
}
