//! Events delivered to the orchestrator
//!
//! Every input the orchestrator reacts to is one variant of [`Event`]. The
//! dispatcher hands them over one at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;
use zeroize::Zeroizing;

use keyguard_core::{
    Alarm, AutoLockSecurityState, LockState, LockType, LockVariant, PasswordAttemptState,
    PendingAlarm, Pid, ProximityKind, SettingChange, VerifyOutcome,
};

/// Why the display turned off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayOffSource {
    PowerButton,
    Timeout,
    Proximity,
    /// Requested by a running app
    Event,
}

/// Protective cover (hall sensor) state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverState {
    Open,
    Closed,
}

/// Password typed into the lock UI
///
/// Zeroized on drop and never printed.
pub struct PasswordCandidate(Zeroizing<String>);

impl PasswordCandidate {
    pub fn new(candidate: String) -> Self {
        Self(Zeroizing::new(candidate))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordCandidate(***)")
    }
}

/// Optional reply channel for events that answer their sender
pub struct Reply<T>(Option<oneshot::Sender<T>>);

impl<T> Reply<T> {
    /// A reply nobody waits for
    pub fn none() -> Self {
        Self(None)
    }

    /// A reply and the receiver that gets it
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self(Some(tx)), rx)
    }

    pub fn send(self, value: T) {
        if let Some(tx) = self.0 {
            // The requester may have gone away
            let _ = tx.send(value);
        }
    }
}

impl<T> fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Reply(pending)"),
            None => f.write_str("Reply(none)"),
        }
    }
}

/// Answer to a password attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptReply {
    pub outcome: VerifyOutcome,
    pub remaining_attempts: u32,
    /// Seconds left in the input block window, if one is running
    pub block_remaining_secs: Option<u32>,
}

/// Read-only view of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorSnapshot {
    pub state: LockState,
    pub lock_type: LockType,
    pub lock_process_id: Option<Pid>,
    pub variant: Option<LockVariant>,
    pub started_at: Option<DateTime<Utc>>,
    /// Whether unlocking currently needs a verified password
    pub requires_password: bool,
    pub attempts: PasswordAttemptState,
    pub block_remaining_secs: Option<u32>,
    pub idle_alarm: Option<PendingAlarm>,
    pub display_on: bool,
    pub cover_closed: bool,
    pub call_active: bool,
    pub security: AutoLockSecurityState,
}

/// Orchestrator input
#[derive(Debug)]
pub enum Event {
    DisplayOn,
    DisplayOff(DisplayOffSource),
    CoverChanged(CoverState),
    ProximityAlert {
        kind: ProximityKind,
        strength: Option<i32>,
    },
    /// Radio link to the paired device came up or went down
    ProximityLinkChanged {
        connected: bool,
    },
    CallStateChanged {
        active: bool,
    },
    ProcessExited(Pid),
    SettingChanged(SettingChange),
    PasswordAttempt {
        candidate: PasswordCandidate,
        reply: Reply<AttemptReply>,
    },
    /// Password verified outside keyguard's own tracker
    PasswordVerified,
    ExternalUnlockRequest {
        reply: Reply<bool>,
    },
    AlarmFired(Alarm),
    Snapshot {
        reply: Reply<OrchestratorSnapshot>,
    },
}

impl Event {
    /// Bus topic name, used for logging
    pub fn topic(&self) -> &'static str {
        match self {
            Event::DisplayOn => "display.on",
            Event::DisplayOff(_) => "display.off",
            Event::CoverChanged(_) => "cover.changed",
            Event::ProximityAlert { .. } => "proximity.alert",
            Event::ProximityLinkChanged { .. } => "proximity.link",
            Event::CallStateChanged { .. } => "call.state",
            Event::ProcessExited(_) => "process.exited",
            Event::SettingChanged(_) => "settings.changed",
            Event::PasswordAttempt { .. } => "password.attempt",
            Event::PasswordVerified => "password.verified",
            Event::ExternalUnlockRequest { .. } => "unlock.request",
            Event::AlarmFired(_) => "alarm.fired",
            Event::Snapshot { .. } => "status.query",
        }
    }
}
