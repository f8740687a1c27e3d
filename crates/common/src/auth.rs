mod config;
mod jwt;
mod principal;
mod traits;

pub use config::*;
pub use jwt::*;
pub use principal::*;
pub use traits::*;
