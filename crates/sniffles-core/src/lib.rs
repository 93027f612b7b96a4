//! Sniffles Core Library
//!
//! Network-call interception and instrumentation for HTTP clients. Sits in a
//! client's request/response pipeline, records metadata about every call and
//! can inject synthetic failures, latency or infinite stalls for testing.
//!
//! # Modules
//!
//! - [`interceptor`] - The [`Sniffles`] service object and interception pipeline
//! - [`layer`] - Tower middleware adapter
//! - [`history`] - Bounded call history
//! - [`policy`] - Live fault injection policy
//! - [`record`] - Call records and request summaries
//! - [`events`] - Event broadcasting and sinks for observers
//! - [`config`] - Configuration and defaults
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```no_run
//! use sniffles_core::{FailureKind, Sniffles};
//! use tower::ServiceBuilder;
//!
//! # fn wrap<S>(client: S) {
//! let sniffles = Sniffles::new();
//! let client = ServiceBuilder::new().layer(sniffles.layer()).service(client);
//!
//! // From a settings screen or a test harness:
//! sniffles.set_failure(true, FailureKind::Timeout);
//! # let _ = client;
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod interceptor;
pub mod layer;
pub mod policy;
pub mod record;

// Re-export commonly used types
pub use config::{FaultConfig, SnifflesConfig};
pub use error::{InterceptError, Result, SimulatedFault, SnifflesError};
pub use events::{EventSink, NoOpEventSink, SnifflesEvent, StdoutEventSink};
pub use history::HistoryLog;
pub use interceptor::{InterceptedResponse, Sniffles};
pub use layer::{SnifflesLayer, SnifflesService};
pub use policy::{FailureKind, FaultPolicy, FaultPolicySnapshot};
pub use record::{CallOutcome, CallRecord, LastRequest, RequestSummary};
