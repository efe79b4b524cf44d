//! Call-outcome telemetry.
//!
//! A [`TelemetrySink`] receives one [`CallRecord`] per guarded call. Records
//! are only produced when the orchestrator has a sink configured and the
//! caller attached a [`CallContext`]; otherwise nothing is emitted.

use crate::errors::ReliabilityError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Token counts reported by the guarded operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input_tokens: u32,
    /// Completion tokens
    pub output_tokens: u32,
}

/// Metadata attached to a guarded call before it runs.
///
/// Clones share the usage slot, so an operation holding a clone can report
/// token counts that end up in the record.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    model: Option<String>,
    endpoint: Option<String>,
    usage: Arc<Mutex<Option<TokenUsage>>>,
}

impl CallContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the endpoint identifier.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Model identifier, if set.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Endpoint identifier, if set.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Records token usage; the last report wins.
    pub fn record_usage(&self, input_tokens: u32, output_tokens: u32) {
        *self.usage.lock() = Some(TokenUsage {
            input_tokens,
            output_tokens,
        });
    }

    /// Token usage reported so far.
    pub fn usage(&self) -> Option<TokenUsage> {
        *self.usage.lock()
    }
}

/// Outcome of a guarded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// The call returned a value
    Success,
    /// The call returned an error
    Error,
}

/// Structured record of one guarded call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    /// Breaker guarding the call
    pub breaker: String,
    /// Operation name passed to the orchestrator
    pub operation: String,
    /// Model identifier from the call context
    pub model: Option<String>,
    /// Endpoint identifier from the call context
    pub endpoint: Option<String>,
    /// Wall time including backoff, in milliseconds
    pub latency_ms: u64,
    /// Prompt tokens, when reported
    pub input_tokens: Option<u32>,
    /// Completion tokens, when reported
    pub output_tokens: Option<u32>,
    /// Attempts made; 0 when the circuit rejected the call
    pub attempts: u32,
    /// Overall outcome
    pub status: CallStatus,
    /// `ReliabilityError::error_type` of the final error
    pub error_type: Option<String>,
    /// Display text of the final error
    pub error_message: Option<String>,
    /// When the call finished
    pub timestamp: DateTime<Utc>,
}

impl CallRecord {
    pub(crate) fn new<T>(
        breaker: &str,
        operation: &str,
        context: &CallContext,
        latency: Duration,
        attempts: u32,
        result: &Result<T, ReliabilityError>,
    ) -> Self {
        let usage = context.usage();
        let (status, error_type, error_message) = match result {
            Ok(_) => (CallStatus::Success, None, None),
            Err(e) => (
                CallStatus::Error,
                Some(e.error_type().to_string()),
                Some(e.to_string()),
            ),
        };

        Self {
            breaker: breaker.to_string(),
            operation: operation.to_string(),
            model: context.model.clone(),
            endpoint: context.endpoint.clone(),
            latency_ms: latency.as_millis() as u64,
            input_tokens: usage.map(|u| u.input_tokens),
            output_tokens: usage.map(|u| u.output_tokens),
            attempts,
            status,
            error_type,
            error_message,
            timestamp: Utc::now(),
        }
    }
}

/// Receiver of call records.
///
/// Implementations must not block for long; they run on the caller's task
/// after the outcome is known.
pub trait TelemetrySink: Send + Sync {
    /// Consumes one record.
    fn record(&self, record: &CallRecord);
}

/// Sink that logs each record as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn record(&self, record: &CallRecord) {
        tracing::info!(
            target: "reliability::telemetry",
            breaker = %record.breaker,
            operation = %record.operation,
            model = record.model.as_deref().unwrap_or(""),
            endpoint = record.endpoint.as_deref().unwrap_or(""),
            latency_ms = record.latency_ms,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            attempts = record.attempts,
            status = ?record.status,
            error_type = record.error_type.as_deref(),
            "Guarded call finished"
        );
    }
}

/// Sink that keeps records in memory.
#[derive(Debug, Default)]
pub struct InMemoryTelemetrySink {
    records: Mutex<Vec<CallRecord>>,
}

impl InMemoryTelemetrySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received so far.
    pub fn records(&self) -> Vec<CallRecord> {
        self.records.lock().clone()
    }

    /// Drops all records.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl TelemetrySink for InMemoryTelemetrySink {
    fn record(&self, record: &CallRecord) {
        self.records.lock().push(record.clone());
    }
}
