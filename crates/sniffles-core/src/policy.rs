//! Fault injection policy
//!
//! Every field is an independent atomic. The interception path reads each
//! field at the moment it needs it, so a change made mid-request applies to
//! calls already in flight. There is no cross-field atomicity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

/// Kind of failure injected when failures are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Fail with a simulated connectivity error
    #[default]
    Network,
    /// Fail with a simulated timeout
    Timeout,
    /// Answer with a synthesized 500 without touching the transport
    ServerError,
}

impl FailureKind {
    pub const ALL: [FailureKind; 3] = [
        FailureKind::Network,
        FailureKind::Timeout,
        FailureKind::ServerError,
    ];

    fn as_u8(self) -> u8 {
        match self {
            FailureKind::Network => 0,
            FailureKind::Timeout => 1,
            FailureKind::ServerError => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => FailureKind::Timeout,
            2 => FailureKind::ServerError,
            _ => FailureKind::Network,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Network => write!(f, "network"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::ServerError => write!(f, "server_error"),
        }
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "network" => Ok(FailureKind::Network),
            "timeout" => Ok(FailureKind::Timeout),
            "server_error" | "server-error" | "500" => Ok(FailureKind::ServerError),
            other => Err(format!(
                "unknown failure kind '{other}' (expected network, timeout or server_error)"
            )),
        }
    }
}

/// Point-in-time copy of the policy, for display and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FaultPolicySnapshot {
    pub failure_enabled: bool,
    pub failure_kind: FailureKind,
    pub delay_ms: u64,
    pub infinite_stall: bool,
}

/// Live, process-wide fault policy
#[derive(Debug, Default)]
pub struct FaultPolicy {
    failure_enabled: AtomicBool,
    failure_kind: AtomicU8,
    delay_ms: AtomicU64,
    infinite_stall: AtomicBool,
}

impl FaultPolicy {
    /// All faults disabled, zero delay
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy starting from the given settings
    pub fn from_snapshot(snapshot: FaultPolicySnapshot) -> Self {
        let policy = Self::new();
        policy.apply(snapshot);
        policy
    }

    /// Whether failure injection is on
    pub fn failure_enabled(&self) -> bool {
        self.failure_enabled.load(Ordering::Acquire)
    }

    /// Failure kind used when injection is on
    pub fn failure_kind(&self) -> FailureKind {
        FailureKind::from_u8(self.failure_kind.load(Ordering::Acquire))
    }

    /// Delay applied before every call
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Acquire))
    }

    /// Whether calls never complete
    pub fn infinite_stall(&self) -> bool {
        self.infinite_stall.load(Ordering::Acquire)
    }

    /// Enable or disable failures and select the kind in one call.
    ///
    /// The two stores are independent; a concurrent reader may observe one
    /// without the other.
    pub fn set_failure(&self, enabled: bool, kind: FailureKind) {
        self.set_failure_kind(kind);
        self.set_failure_enabled(enabled);
    }

    /// Toggle failure injection, keeping the kind
    pub fn set_failure_enabled(&self, enabled: bool) {
        self.failure_enabled.store(enabled, Ordering::Release);
    }

    /// Change the failure kind, keeping the toggle
    pub fn set_failure_kind(&self, kind: FailureKind) {
        self.failure_kind.store(kind.as_u8(), Ordering::Release);
    }

    /// Set the per-call delay
    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::Release);
    }

    /// Toggle the infinite stall
    pub fn set_infinite_stall(&self, enabled: bool) {
        self.infinite_stall.store(enabled, Ordering::Release);
    }

    /// Back to all-disabled
    pub fn reset(&self) {
        self.apply(FaultPolicySnapshot::default());
    }

    /// Overwrite every field from a snapshot
    pub fn apply(&self, snapshot: FaultPolicySnapshot) {
        self.set_failure(snapshot.failure_enabled, snapshot.failure_kind);
        self.set_delay(Duration::from_millis(snapshot.delay_ms));
        self.set_infinite_stall(snapshot.infinite_stall);
    }

    /// Point-in-time copy of every field
    pub fn snapshot(&self) -> FaultPolicySnapshot {
        FaultPolicySnapshot {
            failure_enabled: self.failure_enabled(),
            failure_kind: self.failure_kind(),
            delay_ms: self.delay_ms.load(Ordering::Acquire),
            infinite_stall: self.infinite_stall(),
        }
    }
}
