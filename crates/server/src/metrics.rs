//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Metric definitions for the task lifecycle
//! - Helper functions for recording metrics

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use taskforge_core::{Resolution, TaskStatus};

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup, before any metrics are recorded.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!(
        "taskforge_tasks_created_total",
        "Create-or-extend requests by resolution"
    );
    describe_counter!(
        "taskforge_items_total",
        "Work items processed by outcome (completed, failed, retried)"
    );
    describe_counter!(
        "taskforge_tasks_finalized_total",
        "Tasks finalized by terminal status"
    );
    describe_counter!(
        "taskforge_trailing_writes_total",
        "Results that arrived after their task was finalized elsewhere"
    );
    describe_counter!(
        "taskforge_tasks_reaped_total",
        "Running tasks failed as stalled"
    );
    describe_counter!(
        "taskforge_tasks_resumed_total",
        "Idle tasks taken over by a fresh executor"
    );
    describe_gauge!("taskforge_monitors_active", "Open monitor streams");
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_task_resolved(resolution: Resolution) {
    counter!("taskforge_tasks_created_total", "resolution" => resolution.as_str()).increment(1);
}

/// Item outcome labels.
pub mod outcome {
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
    pub const RETRIED: &str = "retried";
}

pub fn record_item(outcome: &'static str) {
    counter!("taskforge_items_total", "outcome" => outcome).increment(1);
}

pub fn record_task_finalized(status: TaskStatus) {
    counter!("taskforge_tasks_finalized_total", "status" => status.as_str()).increment(1);
}

pub fn record_trailing_write() {
    counter!("taskforge_trailing_writes_total").increment(1);
}

pub fn record_reaped(count: usize) {
    if count > 0 {
        counter!("taskforge_tasks_reaped_total").increment(count as u64);
    }
}

pub fn record_task_resumed() {
    counter!("taskforge_tasks_resumed_total").increment(1);
}

pub fn monitor_attached() {
    gauge!("taskforge_monitors_active").increment(1.0);
}

pub fn monitor_detached() {
    gauge!("taskforge_monitors_active").decrement(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_task_resolved(Resolution::Created);
        record_item(outcome::COMPLETED);
        record_task_finalized(TaskStatus::Failed);
        record_trailing_write();
        record_reaped(0);
        monitor_attached();
        monitor_detached();
    }

    #[test]
    fn test_init_then_render() {
        init_metrics();
        record_task_resolved(Resolution::Superseded);
        let output = render_metrics().expect("metrics initialized");
        assert!(output.contains("taskforge_tasks_created_total"));
    }
}
