mod assignment;
mod chat_message;
mod device;
mod directory;
mod result;
mod service_request;
mod visit_record;

pub use assignment::*;
pub use chat_message::*;
pub use device::*;
pub use directory::*;
pub use result::*;
pub use service_request::*;
pub use visit_record::*;
