//! CLI command handlers
//!
//! This module is organized by functional domains:
//! - init: Database initialization and reset
//! - sync: Worker start, single pass, status and stop
//! - modules: Module, operator and key queries
//! - info: Meta and configuration display

pub mod info;
pub mod init;
pub mod modules;
pub mod sync;
pub mod utils;

// Re-export all public handlers
pub use info::*;
pub use init::*;
pub use modules::*;
pub use sync::*;
pub use utils::*;
