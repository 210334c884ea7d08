// crates/core/src/lib.rs
pub mod engine;
pub mod error;
pub mod retry;
pub mod store;
pub mod task;

pub use engine::{
    FailureKind, GenerationContext, GenerationEngine, GenerationError, GenerationOutput,
    HttpGenerationEngine, ItemDescriptor,
};
pub use error::*;
pub use retry::RetryPolicy;
pub use store::{ContentStore, Ledger, LedgerError, StoreError, UnmeteredLedger};
pub use task::*;
