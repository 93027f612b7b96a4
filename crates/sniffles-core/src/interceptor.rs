//! Interception pipeline
//!
//! [`Sniffles`] owns the fault policy, the call history and the event
//! broadcaster. Clones share the same state, so one instance can sit in front
//! of any number of HTTP clients while a control surface drives it.
//!
//! [`Sniffles::intercept`] is transport-agnostic: it takes a request summary
//! and a closure producing the real call. The tower middleware in
//! [`crate::layer`] is a thin adapter over it.

use chrono::Utc;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::SnifflesConfig;
use crate::error::{InterceptError, Result, SimulatedFault};
use crate::events::SnifflesEvent;
use crate::history::HistoryLog;
use crate::policy::{FailureKind, FaultPolicy, FaultPolicySnapshot};
use crate::record::{CallRecord, LastRequest, RequestSummary};

/// A response the pipeline can inspect and fabricate
pub trait InterceptedResponse: Sized {
    /// HTTP status code of the response
    fn status_code(&self) -> u16;

    /// Build a well-formed, bodiless `500 Internal Server Error`
    fn synthesized_server_error() -> Self;
}

impl<B: Default> InterceptedResponse for http::Response<B> {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }

    fn synthesized_server_error() -> Self {
        let mut response = http::Response::new(B::default());
        *response.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
        *response.version_mut() = http::Version::HTTP_11;
        response
    }
}

struct Shared {
    policy: FaultPolicy,
    history: HistoryLog,
    last_request: Mutex<Option<LastRequest>>,
    events: broadcast::Sender<SnifflesEvent>,
}

/// Handle to one interceptor instance
#[derive(Clone)]
pub struct Sniffles {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Sniffles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sniffles")
            .field("policy", &self.shared.policy.snapshot())
            .field("history_len", &self.shared.history.len())
            .finish()
    }
}

impl Default for Sniffles {
    fn default() -> Self {
        Self::new()
    }
}

impl Sniffles {
    /// Create an interceptor with default configuration
    pub fn new() -> Self {
        Self::build(&SnifflesConfig::default())
    }

    /// Create an interceptor from a validated configuration
    pub fn with_config(config: SnifflesConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(&config))
    }

    fn build(config: &SnifflesConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            shared: Arc::new(Shared {
                policy: FaultPolicy::from_snapshot(config.faults.into()),
                history: HistoryLog::new(config.history_capacity),
                last_request: Mutex::new(None),
                events,
            }),
        }
    }

    /// Tower layer routing calls through this instance
    pub fn layer(&self) -> crate::layer::SnifflesLayer {
        crate::layer::SnifflesLayer::new(self.clone())
    }

    /// Turn failure injection on or off with the given kind
    pub fn set_failure(&self, enabled: bool, kind: FailureKind) {
        self.shared.policy.set_failure(enabled, kind);
        info!("Failure injection {} ({})", on_off(enabled), kind);
        self.policy_changed();
    }

    /// Delay every subsequent call by `delay`
    pub fn set_delay(&self, delay: Duration) {
        self.shared.policy.set_delay(delay);
        info!("Injected delay set to {}ms", delay.as_millis());
        self.policy_changed();
    }

    /// Make subsequent calls never complete
    pub fn set_infinite_loading(&self, enabled: bool) {
        self.shared.policy.set_infinite_stall(enabled);
        info!("Infinite loading {}", on_off(enabled));
        self.policy_changed();
    }

    /// Disable every fault
    pub fn reset_policy(&self) {
        self.shared.policy.reset();
        info!("Fault policy reset");
        self.policy_changed();
    }

    /// Drop every recorded call
    pub fn clear_history(&self) {
        let dropped = self.shared.history.clear();
        info!("History cleared ({} entries)", dropped);
        let _ = self.shared.events.send(SnifflesEvent::HistoryCleared);
    }

    /// Current fault policy
    pub fn policy(&self) -> FaultPolicySnapshot {
        self.shared.policy.snapshot()
    }

    /// Snapshot of the history, newest last
    pub fn request_history(&self) -> Vec<CallRecord> {
        self.shared.history.snapshot()
    }

    /// Most recently recorded call
    pub fn latest_record(&self) -> Option<CallRecord> {
        self.shared.history.latest()
    }

    /// The most recent request to enter the pipeline, completed or not
    pub fn last_request(&self) -> Option<LastRequest> {
        self.shared.last_request.lock().clone()
    }

    /// Maximum number of calls kept in history
    pub fn history_capacity(&self) -> usize {
        self.shared.history.capacity()
    }

    /// Subscribe to events published after this call
    ///
    /// `Recorded` events arrive in the same order as the records appear in
    /// [`Sniffles::request_history`].
    pub fn subscribe(&self) -> broadcast::Receiver<SnifflesEvent> {
        self.shared.events.subscribe()
    }

    /// Run one call through the pipeline.
    ///
    /// Exactly one [`CallRecord`] is appended on every exit path: real
    /// response, real transport error, simulated failure and synthesized 500.
    /// If the returned future is dropped while delayed or stalled, nothing is
    /// recorded.
    pub async fn intercept<T, E, F, Fut>(
        &self,
        request: RequestSummary,
        proceed: F,
    ) -> std::result::Result<T, InterceptError<E>>
    where
        T: InterceptedResponse,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let started = Instant::now();
        let start_time = Utc::now();
        *self.shared.last_request.lock() = Some(LastRequest {
            request: request.clone(),
            started_at: start_time,
        });

        let policy = &self.shared.policy;

        if policy.infinite_stall() {
            debug!("Stalling {} indefinitely", request);
            std::future::pending::<()>().await;
        }

        let delay = policy.delay();
        if !delay.is_zero() {
            debug!("Delaying {} by {}ms", request, delay.as_millis());
            tokio::time::sleep(delay).await;
        }

        if policy.failure_enabled() {
            match policy.failure_kind() {
                FailureKind::Network => {
                    self.record(CallRecord::failed(&request, start_time, elapsed_ms(started)));
                    return Err(InterceptError::Simulated(SimulatedFault::Network));
                }
                FailureKind::Timeout => {
                    self.record(CallRecord::failed(&request, start_time, elapsed_ms(started)));
                    return Err(InterceptError::Simulated(SimulatedFault::Timeout));
                }
                FailureKind::ServerError => {
                    let response = T::synthesized_server_error();
                    self.record(CallRecord::new(
                        &request,
                        start_time,
                        elapsed_ms(started),
                        i32::from(response.status_code()),
                    ));
                    return Ok(response);
                }
            }
        }

        match proceed().await {
            Ok(response) => {
                self.record(CallRecord::new(
                    &request,
                    start_time,
                    elapsed_ms(started),
                    i32::from(response.status_code()),
                ));
                Ok(response)
            }
            Err(err) => {
                self.record(CallRecord::failed(&request, start_time, elapsed_ms(started)));
                Err(InterceptError::Transport(err))
            }
        }
    }

    fn record(&self, record: CallRecord) {
        debug!("Recorded {}", record);
        let events = &self.shared.events;
        self.shared.history.append_with(record, |record| {
            // No subscribers is not an error
            let _ = events.send(SnifflesEvent::Recorded(record.clone()));
        });
    }

    fn policy_changed(&self) {
        let _ = self
            .shared
            .events
            .send(SnifflesEvent::PolicyChanged(self.shared.policy.snapshot()));
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}
