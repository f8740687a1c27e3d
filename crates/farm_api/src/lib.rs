pub mod domain;
pub mod farm_api;
pub mod http;

pub use domain::*;
pub use farm_api::*;
pub use http::*;
