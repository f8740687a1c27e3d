mod assignment_repository;
mod chat_message_repository;
mod client;
mod config;
mod device_repository;
mod directory;
mod migrations;
mod service_request_repository;
mod visit_record_repository;

pub use assignment_repository::*;
pub use chat_message_repository::*;
pub use client::*;
pub use config::*;
pub use device_repository::*;
pub use directory::*;
pub use migrations::*;
pub use service_request_repository::*;
pub use visit_record_repository::*;
