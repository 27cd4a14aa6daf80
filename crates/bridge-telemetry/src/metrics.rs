//! Metric names and the instrument set used by the translation handlers

use std::time::Instant;

use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

pub const BRIDGE_REQUEST_COUNT: &str = "bridge.request.count";
pub const BRIDGE_REQUEST_DURATION: &str = "bridge.request.duration";
pub const BRIDGE_STREAM_CHUNKS: &str = "bridge.stream.chunks";
pub const BRIDGE_BACKEND_ERRORS: &str = "bridge.backend.errors";

/// Instruments recorded per translated request
#[derive(Clone)]
pub struct BridgeMetrics {
    requests: Counter<u64>,
    duration: Histogram<f64>,
    stream_chunks: Counter<u64>,
    backend_errors: Counter<u64>,
}

impl BridgeMetrics {
    /// Instruments bound to the global meter provider
    ///
    /// Without an exporter the global provider is a no-op, so recording is
    /// always safe.
    pub fn new() -> Self {
        let meter = global::meter("gemini-bridge");

        Self {
            requests: meter
                .u64_counter(BRIDGE_REQUEST_COUNT)
                .with_description("Translated requests by operation and outcome")
                .build(),
            duration: meter
                .f64_histogram(BRIDGE_REQUEST_DURATION)
                .with_unit("s")
                .with_description("Time spent serving a translated request")
                .build(),
            stream_chunks: meter
                .u64_counter(BRIDGE_STREAM_CHUNKS)
                .with_description("Chunks written to streaming responses")
                .build(),
            backend_errors: meter
                .u64_counter(BRIDGE_BACKEND_ERRORS)
                .with_description("Backend failures by error type")
                .build(),
        }
    }

    pub fn record_request(&self, operation: &'static str, model: &str, success: bool, start: Instant) {
        let attributes = [
            KeyValue::new("operation", operation),
            KeyValue::new("model", model.to_owned()),
            KeyValue::new("success", success),
        ];

        self.requests.add(1, &attributes);
        self.duration.record(start.elapsed().as_secs_f64(), &attributes);
    }

    pub fn record_chunk(&self, model: &str) {
        self.stream_chunks.add(1, &[KeyValue::new("model", model.to_owned())]);
    }

    pub fn record_backend_error(&self, error_type: &'static str) {
        self.backend_errors.add(1, &[KeyValue::new("error.type", error_type)]);
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
