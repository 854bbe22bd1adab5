//! Timed operation wrapper.
//!
//! Every backend call runs through [`run_timed`], which measures it on a
//! monotonic clock, turns any failure (including a panic while extracting the
//! result) into a failed [`RequestEvent`], and hands exactly one event to the
//! sink. Failures never propagate past this boundary; callers match on
//! [`Outcome`] instead.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::error;

use crate::event::{EventSink, RequestEvent};

/// A wrapped operation that failed. Already logged and reported.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{operation} failed: {message}")]
pub struct OperationFailure {
    /// Operation name the failure was reported under.
    pub operation: String,
    /// Textual description of the underlying failure.
    pub message: String,
}

/// Result of a timed operation.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Outcome<T> {
    /// The operation completed and its result was reported.
    Success(T),
    /// The operation failed; the failure was logged and reported.
    Failure(OperationFailure),
}

impl<T> Outcome<T> {
    /// Returns true for [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Converts into the success value, discarding the failure.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Returns the failure, if any.
    pub fn failure(&self) -> Option<&OperationFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Maps the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Failure(failure) => Outcome::Failure(failure),
        }
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> Result<T, OperationFailure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}

/// Runs `operation`, reports its outcome to `sink` and returns it.
///
/// The duration covers the whole await of `operation`. Unit results are
/// reported with an empty `response`.
pub async fn run_timed<T, E, Fut>(
    request_type: &str,
    name: &str,
    operation: Fut,
    sink: &dyn EventSink,
) -> Outcome<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    T: Serialize,
{
    let start = Instant::now();
    let result = AssertUnwindSafe(operation).catch_unwind().await;
    let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    let message = match result {
        Ok(Ok(value)) => match response_value(&value) {
            Ok(response) => {
                sink.emit(RequestEvent::success(
                    request_type,
                    name,
                    response_time_ms,
                    response,
                ));
                return Outcome::Success(value);
            }
            Err(err) => format!("unserializable response: {err}"),
        },
        Ok(Err(err)) => err.to_string(),
        Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
    };

    error!(request_type, "Error in {}: {}", name, message);
    sink.emit(RequestEvent::failure(
        request_type,
        name,
        response_time_ms,
        message.clone(),
    ));
    Outcome::Failure(OperationFailure {
        operation: name.to_string(),
        message,
    })
}

fn response_value<T: Serialize>(value: &T) -> serde_json::Result<Option<JsonValue>> {
    let json = serde_json::to_value(value)?;
    Ok(if json.is_null() { None } else { Some(json) })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::event::MemorySink;
    use std::collections::BTreeMap;
    use std::time::Duration;

    #[tokio::test]
    async fn test_success_emits_one_event() {
        let sink = MemorySink::new();
        let outcome = run_timed(
            "chroma",
            "list_collections",
            async { Ok::<_, CoreError>(vec!["dhh".to_string()]) },
            &sink,
        )
        .await;

        assert_eq!(outcome.ok(), Some(vec!["dhh".to_string()]));
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].request_type, "chroma");
        assert_eq!(events[0].name, "list_collections");
        assert!(events[0].exception.is_none());
        assert!(events[0].response_time_ms >= 0.0);
        assert_eq!(events[0].response, Some(serde_json::json!(["dhh"])));
    }

    #[tokio::test]
    async fn test_failure_is_absorbed() {
        let sink = MemorySink::new();
        let outcome: Outcome<u64> = run_timed(
            "weaviate",
            "get_object_count_dhh",
            async { Err(CoreError::Transport("connection refused".to_string())) },
            &sink,
        )
        .await;

        let failure = outcome.failure().cloned().unwrap();
        assert_eq!(failure.operation, "get_object_count_dhh");
        assert_eq!(failure.message, "transport error: connection refused");
        assert!(!outcome.is_success());

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].response.is_none());
        assert_eq!(
            events[0].exception.as_deref(),
            Some("transport error: connection refused")
        );
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let sink = MemorySink::new();
        let outcome: Outcome<Vec<String>> = run_timed(
            "chroma",
            "find_similar_environment_entities",
            async {
                let groups: Vec<Vec<String>> = Vec::new();
                let first = groups[0].clone();
                Ok::<_, CoreError>(first)
            },
            &sink,
        )
        .await;

        assert!(outcome.failure().unwrap().message.starts_with("panicked:"));
        assert_eq!(sink.len(), 1);
        assert!(sink.events()[0].is_failure());
    }

    #[tokio::test]
    async fn test_unit_result_reports_no_response() {
        let sink = MemorySink::new();
        let outcome = run_timed("chroma", "noop", async { Ok::<_, CoreError>(()) }, &sink).await;

        assert!(outcome.is_success());
        assert!(sink.events()[0].response.is_none());
    }

    #[tokio::test]
    async fn test_unserializable_response_is_failure() {
        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], 1u8);

        let sink = MemorySink::new();
        let outcome = run_timed("chroma", "odd", async move { Ok::<_, CoreError>(bad) }, &sink).await;

        assert!(outcome
            .failure()
            .unwrap()
            .message
            .starts_with("unserializable response"));
        assert!(sink.events()[0].is_failure());
    }

    #[tokio::test]
    async fn test_duration_covers_operation() {
        let sink = MemorySink::new();
        let _ = run_timed(
            "chroma",
            "slow",
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, CoreError>(())
            },
            &sink,
        )
        .await;

        assert!(sink.events()[0].response_time_ms >= 5.0);
    }

    #[test]
    fn test_outcome_helpers() {
        let outcome: Outcome<u32> = Outcome::Success(2);
        assert_eq!(outcome.clone().map(|v| v * 2).ok(), Some(4));
        assert_eq!(outcome.into_result(), Ok(2));

        let failed: Outcome<u32> = Outcome::Failure(OperationFailure {
            operation: "op".to_string(),
            message: "bad".to_string(),
        });
        assert_eq!(failed.failure().unwrap().to_string(), "op failed: bad");
        assert!(failed.ok().is_none());
    }
}
