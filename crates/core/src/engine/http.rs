// crates/core/src/engine/http.rs
//! Generation engine backed by a remote HTTP service.
//!
//! Each item is a `POST {endpoint}` with body `{"item": ..., "context": ...}`;
//! the service answers `{"content": "...", "context": ...}`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use super::provider::GenerationEngine;
use super::types::{FailureKind, GenerationContext, GenerationError, GenerationOutput, ItemDescriptor};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    item: &'a ItemDescriptor,
    context: &'a GenerationContext,
}

/// Calls a remote generation service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGenerationEngine {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGenerationEngine {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::terminal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Map an HTTP status to a failure kind.
///
/// Timeouts, rate limits and server errors are worth retrying; payment
/// required and other client errors will fail again for every item.
pub fn classify_status(status: StatusCode) -> FailureKind {
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        FailureKind::Transient
    } else {
        FailureKind::Terminal
    }
}

#[async_trait]
impl GenerationEngine for HttpGenerationEngine {
    async fn generate(
        &self,
        item: &ItemDescriptor,
        context: GenerationContext,
    ) -> Result<GenerationOutput, GenerationError> {
        let body = GenerateRequest {
            item,
            context: &context,
        };
        let t0 = Instant::now();

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    item = item.item_id,
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    timeout = e.is_timeout(),
                    "generation request failed"
                );
                // Connection and timeout problems are network weather.
                GenerationError::transient(format!("request to generation service failed: {e}"))
            })?;

        let status = response.status();
        tracing::debug!(
            item = item.item_id,
            status = status.as_u16(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "generation service responded"
        );
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            let message = if snippet.is_empty() {
                format!("generation service returned {status}")
            } else {
                format!("generation service returned {status}: {snippet}")
            };
            return Err(GenerationError {
                kind: classify_status(status),
                message,
            });
        }

        response
            .json::<GenerationOutput>()
            .await
            .map_err(|e| GenerationError::transient(format!("malformed generation response: {e}")))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), FailureKind::Transient);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), FailureKind::Transient);
        assert_eq!(classify_status(StatusCode::REQUEST_TIMEOUT), FailureKind::Transient);
        assert_eq!(classify_status(StatusCode::PAYMENT_REQUIRED), FailureKind::Terminal);
        assert_eq!(classify_status(StatusCode::UNPROCESSABLE_ENTITY), FailureKind::Terminal);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        let engine =
            HttpGenerationEngine::new("http://127.0.0.1:9/generate", Duration::from_millis(500))
                .unwrap();
        let item = ItemDescriptor {
            task_id: "t".to_string(),
            subject: "bookA".to_string(),
            kind: crate::task::TaskKind::Chapters,
            item_id: 1,
            last_item_id: 1,
        };
        let err = engine
            .generate(&item, GenerationContext::empty())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(engine.name(), "http");
        assert_eq!(engine.endpoint(), "http://127.0.0.1:9/generate");
    }
}
