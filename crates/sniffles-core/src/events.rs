//! Event fan-out
//!
//! [`Sniffles`](crate::Sniffles) publishes a [`SnifflesEvent`] on a broadcast
//! channel whenever a call is recorded, the history is cleared or the policy
//! changes. Observers either consume the receiver directly or hand it to
//! [`forward_events`] together with an [`EventSink`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::policy::FaultPolicySnapshot;
use crate::record::{CallOutcome, CallRecord};

/// Something observers may want to react to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SnifflesEvent {
    /// A call completed and was appended to history
    Recorded(CallRecord),
    /// History was emptied
    HistoryCleared,
    /// A control command changed the fault policy
    PolicyChanged(FaultPolicySnapshot),
}

/// Event sink for emitting events to listeners
///
/// Abstracts emission so the same subscription can drive a CLI printer,
/// a UI bridge or a test collector.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// A call was recorded
    async fn emit_record(&self, record: &CallRecord) -> Result<(), String>;

    /// History was cleared
    async fn emit_history_cleared(&self) -> Result<(), String>;

    /// Fault policy changed
    async fn emit_policy_changed(&self, policy: &FaultPolicySnapshot) -> Result<(), String>;
}

/// No-op event sink
#[derive(Debug, Default, Clone)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit_record(&self, _record: &CallRecord) -> Result<(), String> {
        Ok(())
    }

    async fn emit_history_cleared(&self) -> Result<(), String> {
        Ok(())
    }

    async fn emit_policy_changed(&self, _policy: &FaultPolicySnapshot) -> Result<(), String> {
        Ok(())
    }
}

/// Stdout event sink for CLI mode - prints events to console
#[derive(Debug, Default, Clone)]
pub struct StdoutEventSink {
    /// Whether to print in JSON format
    pub json_output: bool,
}

impl StdoutEventSink {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    fn print_json(&self, event: &SnifflesEvent) -> Result<(), String> {
        let line = serde_json::to_string(event).map_err(|e| e.to_string())?;
        println!("{line}");
        Ok(())
    }
}

#[async_trait]
impl EventSink for StdoutEventSink {
    async fn emit_record(&self, record: &CallRecord) -> Result<(), String> {
        if self.json_output {
            return self.print_json(&SnifflesEvent::Recorded(record.clone()));
        }
        println!("{}", format_record_line(record));
        Ok(())
    }

    async fn emit_history_cleared(&self) -> Result<(), String> {
        if self.json_output {
            return self.print_json(&SnifflesEvent::HistoryCleared);
        }
        println!("History cleared");
        Ok(())
    }

    async fn emit_policy_changed(&self, policy: &FaultPolicySnapshot) -> Result<(), String> {
        if self.json_output {
            return self.print_json(&SnifflesEvent::PolicyChanged(*policy));
        }
        let failure = if policy.failure_enabled {
            policy.failure_kind.to_string()
        } else {
            "off".to_string()
        };
        println!(
            "Policy: failure={} delay={}ms stall={}",
            failure, policy.delay_ms, policy.infinite_stall
        );
        Ok(())
    }
}

/// Pump events from `receiver` into `sink` until the sender side closes.
///
/// Sink errors are logged and skipped. A lagging receiver logs how many events
/// it missed and keeps going.
pub async fn forward_events<S: EventSink + ?Sized>(
    mut receiver: broadcast::Receiver<SnifflesEvent>,
    sink: &S,
) {
    loop {
        let event = match receiver.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                warn!("Event observer lagged, {} events dropped", missed);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let result = match &event {
            SnifflesEvent::Recorded(record) => sink.emit_record(record).await,
            SnifflesEvent::HistoryCleared => sink.emit_history_cleared().await,
            SnifflesEvent::PolicyChanged(policy) => sink.emit_policy_changed(policy).await,
        };

        if let Err(e) = result {
            debug!("Event sink rejected event: {}", e);
        }
    }
}

fn format_record_line(record: &CallRecord) -> String {
    let marker = match record.outcome() {
        CallOutcome::Success => "✓",
        CallOutcome::HttpError => "!",
        CallOutcome::Failed => "✗",
    };
    format!(
        "[{}] {} {}",
        record.start_time.format("%H:%M:%S%.3f"),
        marker,
        record
    )
}
