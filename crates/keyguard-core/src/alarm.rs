//! Generation-tagged alarm bookkeeping
//!
//! Every scheduled alarm carries a generation drawn from one monotonically
//! increasing counter. Cancelling an alarm just forgets its generation; a
//! fired alarm is honored only if its generation is still tracked for its
//! kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Alarm generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an alarm is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    /// Delayed idle lock after a display timeout
    IdleLock,
    /// One-second tick of the password block window
    BlockTick,
    /// Retry of failed settings store writes
    SettingsRetry,
    /// Delayed relaunch of a secure lock screen that keeps exiting
    RecoveryRelaunch,
}

/// A scheduled (or fired) alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alarm {
    pub kind: AlarmKind,
    pub generation: Generation,
}

/// The tracked alarm of a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAlarm {
    pub generation: Generation,
    pub fire_at: DateTime<Utc>,
}

/// At most one pending alarm per kind
#[derive(Debug, Default)]
pub struct AlarmTracker {
    last_generation: u64,
    pending: BTreeMap<AlarmKind, PendingAlarm>,
}

impl AlarmTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new alarm of `kind`
    ///
    /// Returns the new alarm and the one it replaced, which the caller
    /// should cancel with the scheduler.
    pub fn arm(&mut self, kind: AlarmKind, fire_at: DateTime<Utc>) -> (Alarm, Option<Alarm>) {
        self.last_generation += 1;
        let generation = Generation(self.last_generation);

        let replaced = self
            .pending
            .insert(kind, PendingAlarm { generation, fire_at })
            .map(|old| Alarm {
                kind,
                generation: old.generation,
            });

        (Alarm { kind, generation }, replaced)
    }

    /// Stop tracking the alarm of `kind`
    pub fn disarm(&mut self, kind: AlarmKind) -> Option<Alarm> {
        self.pending.remove(&kind).map(|pending| Alarm {
            kind,
            generation: pending.generation,
        })
    }

    pub fn pending(&self, kind: AlarmKind) -> Option<&PendingAlarm> {
        self.pending.get(&kind)
    }

    /// Consume a fired alarm
    ///
    /// Fails with [`Error::StaleAlarmFired`] if the generation is no longer
    /// the tracked one.
    pub fn accept(&mut self, alarm: Alarm) -> Result<PendingAlarm> {
        match self.pending.get(&alarm.kind) {
            Some(pending) if pending.generation == alarm.generation => {
                let pending = *pending;
                self.pending.remove(&alarm.kind);
                Ok(pending)
            }
            _ => Err(Error::StaleAlarmFired(alarm.generation.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fired_alarm_accepted_once() {
        let mut tracker = AlarmTracker::new();
        let (alarm, replaced) = tracker.arm(AlarmKind::IdleLock, Utc::now());
        assert!(replaced.is_none());

        assert!(tracker.accept(alarm).is_ok());
        assert_eq!(
            tracker.accept(alarm),
            Err(Error::StaleAlarmFired(alarm.generation.0))
        );
    }

    #[test]
    fn test_rearm_makes_old_generation_stale() {
        let mut tracker = AlarmTracker::new();
        let (first, _) = tracker.arm(AlarmKind::IdleLock, Utc::now());
        let (second, replaced) = tracker.arm(AlarmKind::IdleLock, Utc::now());

        assert_eq!(replaced, Some(first));
        assert!(second.generation > first.generation);
        assert!(tracker.accept(first).is_err());
        assert!(tracker.accept(second).is_ok());
    }

    #[test]
    fn test_disarm_makes_alarm_stale() {
        let mut tracker = AlarmTracker::new();
        let (alarm, _) = tracker.arm(AlarmKind::IdleLock, Utc::now());
        assert_eq!(tracker.disarm(AlarmKind::IdleLock), Some(alarm));
        assert!(tracker.pending(AlarmKind::IdleLock).is_none());
        assert!(tracker.accept(alarm).is_err());
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut tracker = AlarmTracker::new();
        let (idle, _) = tracker.arm(AlarmKind::IdleLock, Utc::now());
        let (tick, _) = tracker.arm(AlarmKind::BlockTick, Utc::now());

        tracker.disarm(AlarmKind::BlockTick);
        assert!(tracker.accept(tick).is_err());
        assert!(tracker.accept(idle).is_ok());
    }
}
