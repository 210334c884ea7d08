// crates/core/src/engine/provider.rs
//! GenerationEngine trait defining the interface for content generators.

use async_trait::async_trait;

use super::types::{GenerationContext, GenerationError, GenerationOutput, ItemDescriptor};

/// Produces the content for one work item.
///
/// Implementations must classify every failure as transient (worth
/// retrying) or terminal (every later item would fail the same way).
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Generate content for `item`, given the context threaded from the
    /// previous item of the same task.
    async fn generate(
        &self,
        item: &ItemDescriptor,
        context: GenerationContext,
    ) -> Result<GenerationOutput, GenerationError>;

    /// Engine name for logging (e.g. "http").
    fn name(&self) -> &str;
}
