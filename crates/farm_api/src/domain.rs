mod access_guard;
mod assignment_ledger_service;
mod device_service;
mod messaging_service;
mod service_request_service;

pub use access_guard::*;
pub use assignment_ledger_service::*;
pub use device_service::*;
pub use messaging_service::*;
pub use service_request_service::*;
