mod blob_store;
mod directory;
mod farm_store;

pub use blob_store::*;
pub use directory::*;
pub use farm_store::*;
