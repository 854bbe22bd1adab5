//! Outcome events and the sinks that consume them.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One timed backend operation, in the shape the reporting side expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    /// Backend tag (`"chroma"` or `"weaviate"`).
    pub request_type: String,
    /// Operation name, e.g. `find_similar_environment_entities`.
    pub name: String,
    /// Wall-clock duration of the operation in milliseconds.
    pub response_time_ms: f64,
    /// Always 0; kept for compatibility with the reporting side.
    pub response_length: usize,
    /// Serialized result on success.
    pub response: Option<JsonValue>,
    /// Always empty.
    pub context: BTreeMap<String, JsonValue>,
    /// Failure description on error.
    pub exception: Option<String>,
}

impl RequestEvent {
    /// Creates the event for a successful operation.
    #[must_use]
    pub fn success(
        request_type: impl Into<String>,
        name: impl Into<String>,
        response_time_ms: f64,
        response: Option<JsonValue>,
    ) -> Self {
        Self {
            request_type: request_type.into(),
            name: name.into(),
            response_time_ms,
            response_length: 0,
            response,
            context: BTreeMap::new(),
            exception: None,
        }
    }

    /// Creates the event for a failed operation.
    #[must_use]
    pub fn failure(
        request_type: impl Into<String>,
        name: impl Into<String>,
        response_time_ms: f64,
        exception: impl Into<String>,
    ) -> Self {
        Self {
            request_type: request_type.into(),
            name: name.into(),
            response_time_ms,
            response_length: 0,
            response: None,
            context: BTreeMap::new(),
            exception: Some(exception.into()),
        }
    }

    /// Returns true when the operation failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.exception.is_some()
    }
}

/// Consumer of outcome events.
///
/// Implementations must tolerate concurrent delivery from many virtual users.
pub trait EventSink: Send + Sync {
    /// Accepts one event. Must not block on network I/O.
    fn emit(&self, event: RequestEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: RequestEvent) {
        (**self).emit(event);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RequestEvent>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<RequestEvent> {
        self.events.lock().clone()
    }

    /// Number of events received so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true when nothing has been received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drains and returns all events.
    pub fn take(&self) -> Vec<RequestEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: RequestEvent) {
        self.events.lock().push(event);
    }
}

/// Delivers each event to several sinks in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    /// Creates a fan-out over `sinks`.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    /// Adds another downstream sink (builder pattern).
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: RequestEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}
