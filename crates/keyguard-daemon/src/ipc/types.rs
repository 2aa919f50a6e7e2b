//! IPC protocol types

use serde::{Deserialize, Serialize};

use keyguard_core::{ProximityKind, VerifyOutcome};

use crate::event::{CoverState, DisplayOffSource, Event, OrchestratorSnapshot};

/// Platform signals relayed onto the event bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum BusSignal {
    DisplayOn,
    DisplayOff {
        source: DisplayOffSource,
    },
    Cover {
        state: CoverState,
    },
    ProximityAlert {
        kind: ProximityKind,
        #[serde(default)]
        strength: Option<i32>,
    },
    CallState {
        active: bool,
    },
}

impl BusSignal {
    pub fn into_event(self) -> Event {
        match self {
            BusSignal::DisplayOn => Event::DisplayOn,
            BusSignal::DisplayOff { source } => Event::DisplayOff(source),
            BusSignal::Cover { state } => Event::CoverChanged(state),
            BusSignal::ProximityAlert { kind, strength } => Event::ProximityAlert { kind, strength },
            BusSignal::CallState { active } => Event::CallStateChanged { active },
        }
    }
}

/// IPC request types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcRequest {
    /// Check if the daemon is running
    Ping,

    /// Orchestrator snapshot
    Status,

    /// Relay a platform signal
    Publish { signal: BusSignal },

    /// Password typed into the lock UI
    VerifyPassword { password: String },

    /// Password verified by another component
    PasswordVerified,

    /// Out-of-band unlock
    UnlockRequest,

    /// Write a policy key
    SetSetting { key: String, value: String },

    /// Link state from the radio service
    ProximityLinkReport {
        connected: bool,
        #[serde(default)]
        strength: Option<i32>,
    },

    /// Exit of a lock process observed outside the launcher
    LockProcessExited { pid: u32 },
}

/// IPC response types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    /// Success with no data
    Ok,

    Pong { version: String },

    Error { message: String },

    Status { snapshot: OrchestratorSnapshot },

    /// Password attempt result
    Attempt {
        outcome: VerifyOutcome,
        remaining_attempts: u32,
        block_remaining_secs: Option<u32>,
    },

    Unlock { granted: bool },
}
