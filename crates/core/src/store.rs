// crates/core/src/store.rs
//! Content store and ledger collaborator contracts.

use async_trait::async_trait;
use thiserror::Error;

use crate::task::ItemId;

/// Persisting finished content failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("content store error: {0}")]
pub struct StoreError(pub String);

/// The ledger refused or could not charge a unit of work.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient credits: {0}")]
    InsufficientCredits(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Durable home of generated content. Saves must be idempotent: the same
/// `(subject, item)` may be written more than once.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn save(&self, subject: &str, item: ItemId, content: &str) -> Result<(), StoreError>;
}

/// Authorizes and charges each unit of work. Any failure aborts the task.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn charge(&self, subject: &str, item: ItemId) -> Result<(), LedgerError>;
}

/// Ledger that authorizes everything, for deployments without billing.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnmeteredLedger;

#[async_trait]
impl Ledger for UnmeteredLedger {
    async fn charge(&self, _subject: &str, _item: ItemId) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unmetered_ledger_always_charges() {
        assert!(UnmeteredLedger.charge("bookA", 99).await.is_ok());
    }

    #[test]
    fn test_ledger_error_display() {
        let err = LedgerError::InsufficientCredits("balance 0".to_string());
        assert_eq!(err.to_string(), "insufficient credits: balance 0");
    }
}
