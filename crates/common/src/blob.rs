mod nats_object_store;
mod traits;

pub use nats_object_store::*;
pub use traits::*;
