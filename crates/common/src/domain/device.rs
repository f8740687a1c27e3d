use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Operational status of a monitoring device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    Active,
    Inactive,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(DeviceStatus::Active),
            "inactive" => Ok(DeviceStatus::Inactive),
            other => Err(DomainError::InvalidStatus(format!(
                "unknown device status '{}'",
                other
            ))),
        }
    }
}

/// Monitoring device. The animal it is attached to is never stored here;
/// it is derived from the assignment ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub device_id: String,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: DeviceStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Repository input for registering a device (ID already generated)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDeviceRepoInput {
    pub device_id: String,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Repository input for changing a device status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDeviceStatusRepoInput {
    pub external_id: String,
    pub status: DeviceStatus,
}

/// Repository trait for device registry persistence
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Register a device; fails with DeviceAlreadyExists on a duplicate external ID
    async fn create_device(&self, input: CreateDeviceRepoInput) -> DomainResult<Device>;

    /// Look a device up by its external identifier
    async fn get_device_by_external_id(&self, external_id: &str) -> DomainResult<Option<Device>>;

    /// All registered devices, newest first
    async fn list_devices(&self) -> DomainResult<Vec<Device>>;

    /// Active devices without an open assignment
    async fn list_available_devices(&self) -> DomainResult<Vec<Device>>;

    /// Change status. Deactivating a device with an open assignment fails
    /// with DeviceHasOpenAssignment; the check and write are atomic.
    async fn update_device_status(&self, input: UpdateDeviceStatusRepoInput)
        -> DomainResult<Device>;
}
