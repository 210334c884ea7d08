// crates/server/src/jobs/mod.rs
//! Supervised background executors.
//!
//! Provides:
//! - `TaskSupervisor`: spawns one detached executor per task and finalizes
//!   the record if the executor errors or panics
//! - `ActiveExecutor`: snapshot of a locally running executor

pub mod runner;
pub mod types;

pub use runner::TaskSupervisor;
pub use types::ActiveExecutor;
