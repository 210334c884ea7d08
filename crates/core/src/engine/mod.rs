// crates/core/src/engine/mod.rs
//! Generation engine integration.
//!
//! Provides the `GenerationEngine` trait the executor calls once per work
//! item, and `HttpGenerationEngine`, which forwards each call to a remote
//! generation service.

pub mod http;
pub mod provider;
pub mod types;

pub use http::HttpGenerationEngine;
pub use provider::GenerationEngine;
pub use types::{FailureKind, GenerationContext, GenerationError, GenerationOutput, ItemDescriptor};
