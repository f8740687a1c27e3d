use crate::domain::{
    AssignmentRecord, AssignmentRepository, ChatMessage, ChatMessageRepository,
    CloseAssignmentRepoInput, CompareAndSetStatusRepoInput, CreateChatMessageRepoInput,
    CreateDeviceRepoInput, CreateServiceRequestRepoInput, CreateVisitRecordRepoInput, Device,
    DeviceRepository, DeviceStatus, DomainError, DomainResult, MarkThreadReadRepoInput,
    OpenAssignmentRepoInput, ServiceRequest, ServiceRequestRepository, ServiceRequestStatus,
    UpdateDeviceStatusRepoInput, VisitRecord, VisitRecordRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct FarmState {
    /// Registration order is kept so listings are stable
    devices: Vec<Device>,
    /// Append-only; records are only ever closed in place
    assignments: Vec<AssignmentRecord>,
    service_requests: HashMap<String, ServiceRequest>,
    /// Append-only, in insertion order
    messages: Vec<ChatMessage>,
    visit_records: HashMap<String, VisitRecord>,
}

impl FarmState {
    fn device_by_external_id(&self, external_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.external_id == external_id)
    }

    fn open_record_for_device(&self, device_id: &str) -> Option<&AssignmentRecord> {
        self.assignments
            .iter()
            .find(|a| a.device_id == device_id && a.is_open())
    }

    fn open_record_for_animal(&self, animal_id: &str) -> Option<&AssignmentRecord> {
        self.assignments
            .iter()
            .find(|a| a.animal_id == animal_id && a.is_open())
    }

    fn last_removed_at(&self, device_id: &str) -> Option<DateTime<Utc>> {
        self.assignments
            .iter()
            .filter(|a| a.device_id == device_id)
            .filter_map(|a| a.removed_at)
            .max()
    }
}

/// In-memory implementation of every farm repository.
///
/// A single write lock covers check-and-write sequences, which serializes
/// assignment and status mutations the way row locks do in Postgres.
#[derive(Clone, Default)]
pub struct InMemoryFarmStore {
    state: Arc<RwLock<FarmState>>,
}

impl InMemoryFarmStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Equal timestamps keep the later-inserted record first
fn newest_first(mut records: Vec<AssignmentRecord>) -> Vec<AssignmentRecord> {
    records.reverse();
    records.sort_by(|a, b| b.assigned_at.cmp(&a.assigned_at));
    records
}

#[async_trait]
impl DeviceRepository for InMemoryFarmStore {
    async fn create_device(&self, input: CreateDeviceRepoInput) -> DomainResult<Device> {
        let mut state = self.state.write().await;
        if state.device_by_external_id(&input.external_id).is_some() {
            return Err(DomainError::DeviceAlreadyExists(input.external_id));
        }

        let now = Utc::now();
        let device = Device {
            device_id: input.device_id,
            external_id: input.external_id,
            name: input.name,
            description: input.description,
            status: DeviceStatus::Active,
            created_at: Some(now),
            updated_at: Some(now),
        };
        state.devices.push(device.clone());
        debug!(device_id = %device.device_id, "registered device");
        Ok(device)
    }

    async fn get_device_by_external_id(&self, external_id: &str) -> DomainResult<Option<Device>> {
        let state = self.state.read().await;
        Ok(state.device_by_external_id(external_id).cloned())
    }

    async fn list_devices(&self) -> DomainResult<Vec<Device>> {
        let state = self.state.read().await;
        Ok(state.devices.iter().rev().cloned().collect())
    }

    async fn list_available_devices(&self) -> DomainResult<Vec<Device>> {
        let state = self.state.read().await;
        Ok(state
            .devices
            .iter()
            .rev()
            .filter(|d| d.status == DeviceStatus::Active)
            .filter(|d| state.open_record_for_device(&d.device_id).is_none())
            .cloned()
            .collect())
    }

    async fn update_device_status(
        &self,
        input: UpdateDeviceStatusRepoInput,
    ) -> DomainResult<Device> {
        let mut state = self.state.write().await;
        let device_id = state
            .device_by_external_id(&input.external_id)
            .map(|d| d.device_id.clone())
            .ok_or_else(|| DomainError::DeviceNotFound(input.external_id.clone()))?;

        if input.status == DeviceStatus::Inactive
            && state.open_record_for_device(&device_id).is_some()
        {
            return Err(DomainError::DeviceHasOpenAssignment(input.external_id));
        }

        let device = state
            .devices
            .iter_mut()
            .find(|d| d.device_id == device_id)
            .ok_or_else(|| DomainError::DeviceNotFound(input.external_id.clone()))?;
        device.status = input.status;
        device.updated_at = Some(Utc::now());
        Ok(device.clone())
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryFarmStore {
    async fn open_assignment(
        &self,
        input: OpenAssignmentRepoInput,
    ) -> DomainResult<AssignmentRecord> {
        let mut state = self.state.write().await;

        let device = state
            .device_by_external_id(&input.device_external_id)
            .ok_or_else(|| DomainError::DeviceNotFound(input.device_external_id.clone()))?;
        if device.status == DeviceStatus::Inactive {
            return Err(DomainError::DeviceInactive(input.device_external_id));
        }
        let device_id = device.device_id.clone();

        if state.open_record_for_device(&device_id).is_some() {
            return Err(DomainError::DeviceAlreadyAssigned(input.device_external_id));
        }
        if state.open_record_for_animal(&input.animal_id).is_some() {
            return Err(DomainError::AnimalAlreadyAssigned(input.animal_id));
        }

        // A new interval never starts before the previous one ended
        let now = Utc::now();
        let assigned_at = match state.last_removed_at(&device_id) {
            Some(last) if last > now => last,
            _ => now,
        };

        let record = AssignmentRecord {
            assignment_id: input.assignment_id,
            device_id,
            animal_id: input.animal_id,
            assigned_at,
            removed_at: None,
        };
        state.assignments.push(record.clone());
        Ok(record)
    }

    async fn close_assignment(
        &self,
        input: CloseAssignmentRepoInput,
    ) -> DomainResult<Option<AssignmentRecord>> {
        let mut state = self.state.write().await;
        let record = state
            .assignments
            .iter_mut()
            .find(|a| a.assignment_id == input.assignment_id && a.is_open());

        Ok(record.map(|r| {
            let now = Utc::now();
            r.removed_at = Some(if now < r.assigned_at { r.assigned_at } else { now });
            r.clone()
        }))
    }

    async fn current_assignment(&self, device_id: &str) -> DomainResult<Option<AssignmentRecord>> {
        let state = self.state.read().await;
        Ok(state.open_record_for_device(device_id).cloned())
    }

    async fn assignment_history(&self, device_id: &str) -> DomainResult<Vec<AssignmentRecord>> {
        let state = self.state.read().await;
        let records = state
            .assignments
            .iter()
            .filter(|a| a.device_id == device_id)
            .cloned()
            .collect();
        Ok(newest_first(records))
    }

    async fn list_open_assignments(&self) -> DomainResult<Vec<AssignmentRecord>> {
        let state = self.state.read().await;
        let records = state
            .assignments
            .iter()
            .filter(|a| a.is_open())
            .cloned()
            .collect();
        Ok(newest_first(records))
    }
}

#[async_trait]
impl ServiceRequestRepository for InMemoryFarmStore {
    async fn create_service_request(
        &self,
        input: CreateServiceRequestRepoInput,
    ) -> DomainResult<ServiceRequest> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let request = ServiceRequest {
            service_request_id: input.service_request_id,
            requester_id: input.requester_id,
            provider_id: input.provider_id,
            animal_id: input.animal_id,
            purpose: input.purpose,
            description: input.description,
            urgency: input.urgency,
            scheduled_time: input.scheduled_time,
            status: ServiceRequestStatus::Pending,
            notes: None,
            created_at: Some(now),
            updated_at: Some(now),
        };
        state
            .service_requests
            .insert(request.service_request_id.clone(), request.clone());
        Ok(request)
    }

    async fn get_service_request(
        &self,
        service_request_id: &str,
    ) -> DomainResult<Option<ServiceRequest>> {
        let state = self.state.read().await;
        Ok(state.service_requests.get(service_request_id).cloned())
    }

    async fn list_service_requests_for_user(
        &self,
        user_id: &str,
    ) -> DomainResult<Vec<ServiceRequest>> {
        let state = self.state.read().await;
        let mut requests: Vec<ServiceRequest> = state
            .service_requests
            .values()
            .filter(|r| r.requester_id == user_id || r.provider_id == user_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.service_request_id.cmp(&a.service_request_id))
        });
        Ok(requests)
    }

    async fn compare_and_set_status(
        &self,
        input: CompareAndSetStatusRepoInput,
    ) -> DomainResult<Option<ServiceRequest>> {
        let mut state = self.state.write().await;
        let Some(request) = state.service_requests.get_mut(&input.service_request_id) else {
            return Ok(None);
        };
        if !input.expected.contains(&request.status) {
            return Ok(None);
        }

        request.status = input.target;
        if input.notes.is_some() {
            request.notes = input.notes;
        }
        request.updated_at = Some(Utc::now());
        Ok(Some(request.clone()))
    }
}

#[async_trait]
impl ChatMessageRepository for InMemoryFarmStore {
    async fn create_message(&self, input: CreateChatMessageRepoInput) -> DomainResult<ChatMessage> {
        let mut state = self.state.write().await;
        let message = ChatMessage {
            message_id: input.message_id,
            service_request_id: input.service_request_id,
            sender_id: input.sender_id,
            body: input.body,
            attachment: input.attachment,
            is_read: false,
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, service_request_id: &str) -> DomainResult<Vec<ChatMessage>> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.service_request_id == service_request_id)
            .cloned()
            .collect())
    }

    async fn get_message(
        &self,
        service_request_id: &str,
        message_id: &str,
    ) -> DomainResult<Option<ChatMessage>> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .find(|m| m.service_request_id == service_request_id && m.message_id == message_id)
            .cloned())
    }

    async fn mark_thread_read(&self, input: MarkThreadReadRepoInput) -> DomainResult<u64> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for message in state.messages.iter_mut().filter(|m| {
            m.service_request_id == input.service_request_id
                && m.sender_id != input.reader_id
                && !m.is_read
        }) {
            message.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn count_unread(&self, service_request_id: &str, reader_id: &str) -> DomainResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| {
                m.service_request_id == service_request_id
                    && m.sender_id != reader_id
                    && !m.is_read
            })
            .count() as u64)
    }
}

#[async_trait]
impl VisitRecordRepository for InMemoryFarmStore {
    async fn create_visit_record(
        &self,
        input: CreateVisitRecordRepoInput,
    ) -> DomainResult<VisitRecord> {
        let mut state = self.state.write().await;
        if state.visit_records.contains_key(&input.service_request_id) {
            return Err(DomainError::VisitRecordAlreadyExists(
                input.service_request_id,
            ));
        }

        let record = VisitRecord {
            visit_record_id: input.visit_record_id,
            service_request_id: input.service_request_id,
            recorded_by: input.recorded_by,
            diagnosis: input.diagnosis,
            treatment: input.treatment,
            fee_minor_units: input.fee_minor_units,
            created_at: Utc::now(),
        };
        state
            .visit_records
            .insert(record.service_request_id.clone(), record.clone());
        Ok(record)
    }

    async fn get_visit_record(&self, service_request_id: &str) -> DomainResult<Option<VisitRecord>> {
        let state = self.state.read().await;
        Ok(state.visit_records.get(service_request_id).cloned())
    }
}
