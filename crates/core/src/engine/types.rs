// crates/core/src/engine/types.rs
//! Request/response/error types for the generation engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorClass;
use crate::task::{ItemId, TaskId, TaskKind};

/// Describes the work item being generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDescriptor {
    pub task_id: TaskId,
    pub subject: String,
    pub kind: TaskKind,
    pub item_id: ItemId,
    /// Last item of the task's coverage when this item was picked.
    pub last_item_id: ItemId,
}

/// Opaque state carried from one item to the next within an executor run
/// (e.g. a running synopsis of earlier chapters).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationContext(pub serde_json::Value);

impl GenerationContext {
    pub fn empty() -> Self {
        Self(serde_json::Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }
}

/// Successful generation of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub content: String,
    #[serde(default)]
    pub context: GenerationContext,
}

/// Whether a failed attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    Terminal,
}

impl FailureKind {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Transient => ErrorClass::Transient,
            Self::Terminal => ErrorClass::Terminal,
        }
    }
}

/// A failed generation attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind:?} generation failure: {message}")]
pub struct GenerationError {
    pub kind: FailureKind,
    pub message: String,
}

impl GenerationError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Terminal,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_constructors() {
        let err = GenerationError::transient("rate limited");
        assert!(err.is_transient());
        assert_eq!(err.kind.class(), ErrorClass::Transient);

        let err = GenerationError::terminal("credits exhausted");
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Terminal generation failure: credits exhausted");
    }

    #[test]
    fn test_output_deserializes_without_context() {
        let out: GenerationOutput = serde_json::from_str(r#"{"content":"Chapter 1"}"#).unwrap();
        assert_eq!(out.content, "Chapter 1");
        assert!(out.context.is_empty());
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let item = ItemDescriptor {
            task_id: "t".to_string(),
            subject: "bookA".to_string(),
            kind: TaskKind::Outline,
            item_id: 3,
            last_item_id: 9,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["itemId"], 3);
        assert_eq!(json["lastItemId"], 9);
        assert_eq!(json["kind"], "outline");
    }
}
