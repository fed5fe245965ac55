// Re-export needed modules for testing
pub mod api;
pub mod models;
pub mod session;
pub mod sync;

// Re-export main types for convenience
pub use models::*;
pub use sync::{SyncEngine, SyncEvent};
