//! Call records
//!
//! A [`CallRecord`] is created exactly once per completed (or failed) call
//! attempt and never modified afterwards.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Method and URL of an intercepted request, captured at call entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub method: String,
    pub url: String,
}

impl RequestSummary {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
        }
    }
}

impl<B> From<&http::Request<B>> for RequestSummary {
    fn from(request: &http::Request<B>) -> Self {
        Self::new(request.method().as_str(), request.uri().to_string())
    }
}

impl fmt::Display for RequestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// The request currently (or most recently) in flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRequest {
    #[serde(flatten)]
    pub request: RequestSummary,
    pub started_at: DateTime<Utc>,
}

/// How a recorded call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// 2xx response
    Success,
    /// Any other HTTP status, including a synthesized 500
    HttpError,
    /// No response: transport error or simulated failure
    Failed,
}

/// Immutable record of one intercepted call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Unique record ID
    pub id: Uuid,

    pub url: String,

    pub method: String,

    /// Wall-clock time at call entry
    pub start_time: DateTime<Utc>,

    /// Elapsed time from entry to recording, in milliseconds
    pub duration_ms: u64,

    /// HTTP status, or [`CallRecord::FAILED_STATUS`] when no response was produced
    pub status_code: i32,
}

impl CallRecord {
    /// Sentinel status for calls that ended in an error
    pub const FAILED_STATUS: i32 = -1;

    pub fn new(
        request: &RequestSummary,
        start_time: DateTime<Utc>,
        duration_ms: u64,
        status_code: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: request.url.clone(),
            method: request.method.clone(),
            start_time,
            duration_ms,
            status_code,
        }
    }

    /// Create a record for a call that produced no response
    pub fn failed(request: &RequestSummary, start_time: DateTime<Utc>, duration_ms: u64) -> Self {
        Self::new(request, start_time, duration_ms, Self::FAILED_STATUS)
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        let millis = i64::try_from(self.duration_ms).unwrap_or(i64::MAX);
        self.start_time + ChronoDuration::milliseconds(millis)
    }

    pub fn is_failure(&self) -> bool {
        self.status_code == Self::FAILED_STATUS
    }

    pub fn outcome(&self) -> CallOutcome {
        match self.status_code {
            Self::FAILED_STATUS => CallOutcome::Failed,
            200..=299 => CallOutcome::Success,
            _ => CallOutcome::HttpError,
        }
    }
}

impl fmt::Display for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_failure() {
            write!(
                f,
                "{} {} Failed ({}ms)",
                self.method, self.url, self.duration_ms
            )
        } else {
            write!(
                f,
                "{} {} Status: {} ({}ms)",
                self.method, self.url, self.status_code, self.duration_ms
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RequestSummary {
        RequestSummary::new("GET", "https://example.com/users")
    }

    #[test]
    fn test_end_time() {
        let start = Utc::now();
        let record = CallRecord::new(&summary(), start, 250, 200);
        assert_eq!(record.end_time() - start, ChronoDuration::milliseconds(250));
    }

    #[test]
    fn test_outcome() {
        let start = Utc::now();
        assert_eq!(
            CallRecord::new(&summary(), start, 1, 204).outcome(),
            CallOutcome::Success
        );
        assert_eq!(
            CallRecord::new(&summary(), start, 1, 500).outcome(),
            CallOutcome::HttpError
        );
        assert_eq!(
            CallRecord::new(&summary(), start, 1, 404).outcome(),
            CallOutcome::HttpError
        );

        let failed = CallRecord::failed(&summary(), start, 1);
        assert!(failed.is_failure());
        assert_eq!(failed.outcome(), CallOutcome::Failed);
    }

    #[test]
    fn test_records_get_unique_ids() {
        let start = Utc::now();
        let a = CallRecord::new(&summary(), start, 1, 200);
        let b = CallRecord::new(&summary(), start, 1, 200);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_summary_from_http_request() {
        let request = http::Request::post("http://localhost:8080/api?q=1")
            .body(())
            .unwrap();
        let summary = RequestSummary::from(&request);
        assert_eq!(summary.method, "POST");
        assert_eq!(summary.url, "http://localhost:8080/api?q=1");
        assert_eq!(summary.to_string(), "POST http://localhost:8080/api?q=1");
    }

    #[test]
    fn test_display() {
        let start = Utc::now();
        let record = CallRecord::failed(&summary(), start, 12);
        assert_eq!(record.to_string(), "GET https://example.com/users Failed (12ms)");
    }

    #[test]
    fn test_serialize() {
        let record = CallRecord::new(&summary(), Utc::now(), 5, 200);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status_code"], 200);
        assert_eq!(json["method"], "GET");
        assert_eq!(json["duration_ms"], 5);
    }
}
