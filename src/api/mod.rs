//! Read-only service over committed state
//!
//! Nothing here triggers a chain read. Every response pairs module data with
//! the EL meta it was read together with, or reports
//! [`Served::TooEarly`] when that pairing cannot be trusted yet.

mod service;
pub mod types;

pub use service::KeysApi;
pub use types::ModuleKeys;
pub use types::ModuleKeysAndOperators;
pub use types::ModuleMeta;
pub use types::ModuleOperators;
pub use types::ModuleValidators;
pub use types::Served;
pub use types::SyncStatus;
