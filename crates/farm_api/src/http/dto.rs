//! JSON request and response bodies

use crate::domain::DeviceWithAssignment;
use chrono::{DateTime, Utc};
use common::domain::{AssignmentRecord, ChatMessage, ServiceRequest, VisitRecord};
use serde::{Deserialize, Deserializer, Serialize};

/// Ids arrive as strings or bare integers depending on the client
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

fn default_urgency() -> String {
    "medium".to_string()
}

// ---- devices ----

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceBody {
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetDeviceStatusBody {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignDeviceBody {
    /// External identifier of the device
    pub device_id: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub animal_id: String,
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub assignment_id: String,
    pub device_id: String,
    pub animal_id: String,
    pub assigned_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
}

impl From<AssignmentRecord> for AssignmentResponse {
    fn from(record: AssignmentRecord) -> Self {
        Self {
            assignment_id: record.assignment_id,
            device_id: record.device_id,
            animal_id: record.animal_id,
            assigned_at: record.assigned_at,
            removed_at: record.removed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub current_assignment: Option<AssignmentResponse>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<DeviceWithAssignment> for DeviceResponse {
    fn from(value: DeviceWithAssignment) -> Self {
        let device = value.device;
        Self {
            id: device.device_id,
            external_id: device.external_id,
            name: device.name,
            description: device.description,
            status: device.status.to_string(),
            current_assignment: value.current_assignment.map(Into::into),
            created_at: device.created_at,
            updated_at: device.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: bool,
    pub assignment: Option<AssignmentResponse>,
}

// ---- service requests ----

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequestBody {
    #[serde(deserialize_with = "deserialize_id")]
    pub provider_id: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub animal_id: String,
    pub purpose: String,
    pub scheduled_time: DateTime<Utc>,
    #[serde(default = "default_urgency")]
    pub urgency_level: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionStatusBody {
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ServiceRequestResponse {
    pub id: String,
    pub requester_id: String,
    pub provider_id: String,
    pub animal_id: String,
    pub purpose: String,
    pub description: Option<String>,
    pub urgency_level: String,
    pub scheduled_time: DateTime<Utc>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<ServiceRequest> for ServiceRequestResponse {
    fn from(request: ServiceRequest) -> Self {
        Self {
            id: request.service_request_id,
            requester_id: request.requester_id,
            provider_id: request.provider_id,
            animal_id: request.animal_id,
            purpose: request.purpose,
            description: request.description,
            urgency_level: request.urgency.to_string(),
            scheduled_time: request.scheduled_time,
            status: request.status.to_string(),
            notes: request.notes,
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VisitRecordBody {
    pub diagnosis: String,
    #[serde(default)]
    pub treatment: Option<String>,
    /// Minor currency units
    #[serde(default)]
    pub fee: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct VisitRecordResponse {
    pub id: String,
    pub service_request_id: String,
    pub recorded_by: String,
    pub diagnosis: String,
    pub treatment: Option<String>,
    pub fee: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<VisitRecord> for VisitRecordResponse {
    fn from(record: VisitRecord) -> Self {
        Self {
            id: record.visit_record_id,
            service_request_id: record.service_request_id,
            recorded_by: record.recorded_by,
            diagnosis: record.diagnosis,
            treatment: record.treatment,
            fee: record.fee_minor_units,
            created_at: record.created_at,
        }
    }
}

// ---- messages ----

#[derive(Debug, Deserialize)]
pub struct PostMessageBody {
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AttachmentResponse {
    pub name: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub download_path: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub service_request_id: String,
    pub sender_id: String,
    pub body: Option<String>,
    pub attachment: Option<AttachmentResponse>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for MessageResponse {
    fn from(message: ChatMessage) -> Self {
        // Storage keys stay internal; clients fetch through the API
        let attachment = message.attachment.map(|a| AttachmentResponse {
            name: a.name,
            size_bytes: a.size_bytes,
            mime_type: a.mime_type,
            download_path: format!(
                "/service-requests/{}/messages/{}/attachment",
                message.service_request_id, message.message_id
            ),
        });

        Self {
            id: message.message_id,
            service_request_id: message.service_request_id,
            sender_id: message.sender_id,
            body: message.body,
            attachment,
            is_read: message.is_read,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
