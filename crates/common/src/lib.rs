pub mod auth;
pub mod blob;
pub mod domain;
pub mod garde;
pub mod memory;
pub mod postgres;
pub mod telemetry;
