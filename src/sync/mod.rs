//! Background synchronization
//!
//! - [`Synchronizer`]: keeps module operators and keys in step with the
//!   execution layer and owns EL meta
//! - [`ConsensusTracker`]: records the finalized consensus-layer snapshot
//! - [`WorkerRuntime`]: runs both on independent intervals
//! - [`is_too_early`]: the EL/CL consistency gate used by readers

pub mod consensus;
pub mod gate;
pub mod lock_file;
pub mod synchronizer;
pub mod worker;

pub use consensus::ConsensusTick;
pub use consensus::ConsensusTracker;
pub use gate::is_too_early;
pub use lock_file::WorkerLockFile;
pub use lock_file::WorkerLockManager;
pub use lock_file::WorkerStatus;
pub use synchronizer::ModuleOutcome;
pub use synchronizer::Synchronizer;
pub use synchronizer::TickReport;
pub use worker::OnceReport;
pub use worker::WorkerRuntime;
pub use worker::WorkerSettings;
