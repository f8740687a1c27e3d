mod dto;
mod error;
mod extract;
mod identity;
mod routes;
mod server;
mod state;

pub use dto::*;
pub use error::*;
pub use extract::*;
pub use identity::*;
pub use routes::*;
pub use server::*;
pub use state::*;
