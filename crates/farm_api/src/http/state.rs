use crate::domain::{
    AssignmentLedgerService, DeviceService, MessagingService, ServiceRequestService,
};
use common::auth::IdentityProvider;
use common::blob::BlobStore;
use common::domain::{
    AssignmentRepository, ChatMessageRepository, DeviceRepository, FarmDirectory,
    ServiceRequestRepository, VisitRecordRepository,
};
use common::memory::{InMemoryBlobStore, InMemoryDirectory, InMemoryFarmStore};
use std::sync::Arc;

/// Storage and collaborator adapters the services are built from
#[derive(Clone)]
pub struct FarmAdapters {
    pub devices: Arc<dyn DeviceRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub service_requests: Arc<dyn ServiceRequestRepository>,
    pub chat_messages: Arc<dyn ChatMessageRepository>,
    pub visit_records: Arc<dyn VisitRecordRepository>,
    pub directory: Arc<dyn FarmDirectory>,
    pub blob_store: Arc<dyn BlobStore>,
}

impl FarmAdapters {
    /// Every repository backed by one in-memory store
    pub fn in_memory(
        store: InMemoryFarmStore,
        directory: InMemoryDirectory,
        blob_store: InMemoryBlobStore,
    ) -> Self {
        let store = Arc::new(store);
        Self {
            devices: store.clone(),
            assignments: store.clone(),
            service_requests: store.clone(),
            chat_messages: store.clone(),
            visit_records: store,
            directory: Arc::new(directory),
            blob_store: Arc::new(blob_store),
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub device_service: Arc<DeviceService>,
    pub ledger_service: Arc<AssignmentLedgerService>,
    pub service_request_service: Arc<ServiceRequestService>,
    pub messaging_service: Arc<MessagingService>,
    pub identity_provider: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(
        adapters: FarmAdapters,
        identity_provider: Arc<dyn IdentityProvider>,
        max_attachment_bytes: usize,
    ) -> Self {
        let device_service = Arc::new(DeviceService::new(
            adapters.devices.clone(),
            adapters.assignments.clone(),
        ));
        let ledger_service = Arc::new(AssignmentLedgerService::new(
            adapters.devices,
            adapters.assignments,
            adapters.directory.clone(),
        ));
        let service_request_service = Arc::new(ServiceRequestService::new(
            adapters.service_requests.clone(),
            adapters.visit_records,
            adapters.directory,
        ));
        let messaging_service = Arc::new(MessagingService::new(
            adapters.service_requests,
            adapters.chat_messages,
            adapters.blob_store,
            max_attachment_bytes,
        ));

        Self {
            device_service,
            ledger_service,
            service_request_service,
            messaging_service,
            identity_provider,
        }
    }
}
