//! Lock session state
//!
//! A [`LockSession`] exists from the moment a lock process has been started
//! until the device unlocks. Holding the process id inside the session makes
//! "a process id is tracked iff the device is not unlocked" true by
//! construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating system process id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lock state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Unlocked,
    /// Lock process started, not yet confirmed running
    Launching,
    Locked,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockState::Unlocked => "unlocked",
            LockState::Launching => "launching",
            LockState::Locked => "locked",
        };
        f.write_str(s)
    }
}

/// Which flavor of lock screen the UI should present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockVariant {
    #[default]
    Normal,
    /// Relaunched after the lock UI died without an unlock
    Recovery,
    /// Locked on request of a running app; return to it after unlock
    BackToApp,
}

impl LockVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockVariant::Normal => "normal",
            LockVariant::Recovery => "recovery",
            LockVariant::BackToApp => "back-to-app",
        }
    }
}

/// An active (non-unlocked) lock session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSession {
    state: LockState,
    lock_process_id: Pid,
    requested_variant: LockVariant,
    started_at: DateTime<Utc>,
}

impl LockSession {
    /// Start a session for a freshly launched lock process
    pub fn launching(pid: Pid, variant: LockVariant, started_at: DateTime<Utc>) -> Self {
        Self {
            state: LockState::Launching,
            lock_process_id: pid,
            requested_variant: variant,
            started_at,
        }
    }

    /// Confirm the lock process is up
    pub fn mark_locked(&mut self) {
        self.state = LockState::Locked;
    }

    /// Track a replacement lock process (recovery relaunch)
    pub fn replace_process(&mut self, pid: Pid, variant: LockVariant) {
        self.state = LockState::Launching;
        self.lock_process_id = pid;
        self.requested_variant = variant;
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn lock_process_id(&self) -> Pid {
        self.lock_process_id
    }

    pub fn requested_variant(&self) -> LockVariant {
        self.requested_variant
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether `pid` is the tracked lock process
    pub fn owns(&self, pid: Pid) -> bool {
        self.lock_process_id == pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let now = Utc::now();
        let mut session = LockSession::launching(Pid(100), LockVariant::Normal, now);
        assert_eq!(session.state(), LockState::Launching);
        assert!(session.owns(Pid(100)));
        assert!(!session.owns(Pid(101)));

        session.mark_locked();
        assert_eq!(session.state(), LockState::Locked);
        assert_eq!(session.started_at(), now);
    }

    #[test]
    fn test_replace_process_keeps_start_time() {
        let now = Utc::now();
        let mut session = LockSession::launching(Pid(100), LockVariant::Normal, now);
        session.mark_locked();
        session.replace_process(Pid(200), LockVariant::Recovery);

        assert_eq!(session.state(), LockState::Launching);
        assert_eq!(session.lock_process_id(), Pid(200));
        assert_eq!(session.requested_variant(), LockVariant::Recovery);
        assert_eq!(session.started_at(), now);
    }
}
