//! Settings store keys and values
//!
//! The settings store is an external key/value service. These types name the
//! keys keyguard reads and publishes, and turn raw store entries into typed
//! policy changes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::policy::LockType;
use crate::session::LockState;

/// Keys keyguard reads from or publishes to the settings store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    /// Selected lock type
    LockType,
    /// Delay before an idle (timeout) lock, in seconds
    AccessibilityLockDelay,
    /// App id of a vendor-supplied lock screen
    SelectedLockAppId,
    /// Whether the lock UI plays sounds
    SoundEnabled,
    /// Published: password attempts left before an input block
    PasswordAttemptsLeft,
    /// Published: tri-state idle lock state
    IdleLockState,
    /// Paired companion device for auto-lock
    PairedDeviceId,
    /// Signal strength below which the paired device is out of range
    OutOfRangeThreshold,
    /// Signal strength above which the paired device is in range
    InRangeThreshold,
}

impl SettingKey {
    /// All known keys
    pub const ALL: [SettingKey; 9] = [
        SettingKey::LockType,
        SettingKey::AccessibilityLockDelay,
        SettingKey::SelectedLockAppId,
        SettingKey::SoundEnabled,
        SettingKey::PasswordAttemptsLeft,
        SettingKey::IdleLockState,
        SettingKey::PairedDeviceId,
        SettingKey::OutOfRangeThreshold,
        SettingKey::InRangeThreshold,
    ];

    /// Store name of the key
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::LockType => "lock_type",
            SettingKey::AccessibilityLockDelay => "accessibility_lock_delay",
            SettingKey::SelectedLockAppId => "selected_lock_app_id",
            SettingKey::SoundEnabled => "sound_enabled",
            SettingKey::PasswordAttemptsLeft => "password_attempts_left",
            SettingKey::IdleLockState => "idle_lock_state",
            SettingKey::PairedDeviceId => "paired_device_id",
            SettingKey::OutOfRangeThreshold => "out_of_range_threshold",
            SettingKey::InRangeThreshold => "in_range_threshold",
        }
    }

    /// Keys written by keyguard for other components to read
    pub fn is_published(&self) -> bool {
        matches!(
            self,
            SettingKey::PasswordAttemptsLeft | SettingKey::IdleLockState
        )
    }

    /// Parse a raw command-line value into the value type this key stores
    pub fn parse_value(&self, raw: &str) -> Result<SettingValue> {
        let invalid = |reason: String| Error::InvalidSetting {
            key: self.as_str().to_string(),
            reason,
        };

        match self {
            SettingKey::LockType => {
                let lock_type = LockType::from_str(raw)?;
                Ok(SettingValue::Text(lock_type.as_str().to_string()))
            }
            SettingKey::SelectedLockAppId | SettingKey::PairedDeviceId => {
                Ok(SettingValue::Text(raw.to_string()))
            }
            SettingKey::SoundEnabled => match raw {
                "true" | "on" | "1" => Ok(SettingValue::Bool(true)),
                "false" | "off" | "0" => Ok(SettingValue::Bool(false)),
                other => Err(invalid(format!("expected a boolean, got {:?}", other))),
            },
            _ => raw
                .parse::<i64>()
                .map(SettingValue::Int)
                .map_err(|e| invalid(e.to_string())),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SettingKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::InvalidSetting {
                key: s.to_string(),
                reason: "unknown key".to_string(),
            })
    }
}

/// A value held by the settings store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl SettingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            SettingValue::Int(i) => Some(*i != 0),
            SettingValue::Text(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(i) => Some(*i),
            SettingValue::Text(s) => s.parse().ok(),
            SettingValue::Bool(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{}", b),
            SettingValue::Int(i) => write!(f, "{}", i),
            SettingValue::Text(s) => f.write_str(s),
        }
    }
}

/// Externally published idle lock state
///
/// Stored as an integer so readers can compare without string parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleLockState {
    Unlocked,
    Locked,
    Launching,
}

impl IdleLockState {
    /// Integer code written to the store
    pub fn code(&self) -> i64 {
        match self {
            IdleLockState::Unlocked => 0,
            IdleLockState::Locked => 1,
            IdleLockState::Launching => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(IdleLockState::Unlocked),
            1 => Some(IdleLockState::Locked),
            2 => Some(IdleLockState::Launching),
            _ => None,
        }
    }
}

impl From<LockState> for IdleLockState {
    fn from(state: LockState) -> Self {
        match state {
            LockState::Unlocked => IdleLockState::Unlocked,
            LockState::Launching => IdleLockState::Launching,
            LockState::Locked => IdleLockState::Locked,
        }
    }
}

impl From<IdleLockState> for SettingValue {
    fn from(state: IdleLockState) -> Self {
        SettingValue::Int(state.code())
    }
}

/// A typed change to one of the policy keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", content = "value", rename_all = "snake_case")]
pub enum SettingChange {
    LockType(LockType),
    AccessibilityLockDelay(u32),
    SelectedLockAppId(String),
    SoundEnabled(bool),
    PairedDeviceId(String),
    OutOfRangeThreshold(i32),
    InRangeThreshold(i32),
}

impl SettingChange {
    /// Convert a raw store entry into a policy change
    ///
    /// Published keys yield `Ok(None)`: keyguard writes them, it does not
    /// react to them.
    pub fn from_entry(key: SettingKey, value: &SettingValue) -> Result<Option<Self>> {
        let invalid = |reason: &str| Error::InvalidSetting {
            key: key.as_str().to_string(),
            reason: format!("{} (got {})", reason, value),
        };

        let change = match key {
            SettingKey::LockType => {
                let raw = value.as_text().ok_or_else(|| invalid("expected text"))?;
                SettingChange::LockType(LockType::from_str(raw)?)
            }
            SettingKey::AccessibilityLockDelay => {
                let secs = value
                    .as_int()
                    .and_then(|i| u32::try_from(i).ok())
                    .ok_or_else(|| invalid("expected a non-negative integer"))?;
                SettingChange::AccessibilityLockDelay(secs)
            }
            SettingKey::SelectedLockAppId => SettingChange::SelectedLockAppId(
                value
                    .as_text()
                    .ok_or_else(|| invalid("expected text"))?
                    .to_string(),
            ),
            SettingKey::SoundEnabled => {
                SettingChange::SoundEnabled(value.as_bool().ok_or_else(|| invalid("expected a boolean"))?)
            }
            SettingKey::PairedDeviceId => SettingChange::PairedDeviceId(
                value
                    .as_text()
                    .ok_or_else(|| invalid("expected text"))?
                    .to_string(),
            ),
            SettingKey::OutOfRangeThreshold => SettingChange::OutOfRangeThreshold(
                value
                    .as_int()
                    .and_then(|i| i32::try_from(i).ok())
                    .ok_or_else(|| invalid("expected a dBm integer"))?,
            ),
            SettingKey::InRangeThreshold => SettingChange::InRangeThreshold(
                value
                    .as_int()
                    .and_then(|i| i32::try_from(i).ok())
                    .ok_or_else(|| invalid("expected a dBm integer"))?,
            ),
            SettingKey::PasswordAttemptsLeft | SettingKey::IdleLockState => return Ok(None),
        };

        Ok(Some(change))
    }

    /// The key this change applies to
    pub fn key(&self) -> SettingKey {
        match self {
            SettingChange::LockType(_) => SettingKey::LockType,
            SettingChange::AccessibilityLockDelay(_) => SettingKey::AccessibilityLockDelay,
            SettingChange::SelectedLockAppId(_) => SettingKey::SelectedLockAppId,
            SettingChange::SoundEnabled(_) => SettingKey::SoundEnabled,
            SettingChange::PairedDeviceId(_) => SettingKey::PairedDeviceId,
            SettingChange::OutOfRangeThreshold(_) => SettingKey::OutOfRangeThreshold,
            SettingChange::InRangeThreshold(_) => SettingKey::InRangeThreshold,
        }
    }

    /// The store value for this change
    pub fn value(&self) -> SettingValue {
        match self {
            SettingChange::LockType(t) => SettingValue::Text(t.as_str().to_string()),
            SettingChange::AccessibilityLockDelay(secs) => SettingValue::Int(i64::from(*secs)),
            SettingChange::SelectedLockAppId(id) | SettingChange::PairedDeviceId(id) => {
                SettingValue::Text(id.clone())
            }
            SettingChange::SoundEnabled(b) => SettingValue::Bool(*b),
            SettingChange::OutOfRangeThreshold(dbm) | SettingChange::InRangeThreshold(dbm) => {
                SettingValue::Int(i64::from(*dbm))
            }
        }
    }
}
