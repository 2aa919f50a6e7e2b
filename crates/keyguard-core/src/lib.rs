//! Keyguard Core - Lock policy and state types
//!
//! This crate holds the pure, I/O-free pieces of the keyguard lock daemon:
//! the lock policy and its per-type strategy table, the lock session state,
//! password attempt accounting, proximity-driven auto-lock security and the
//! generation-tagged alarm bookkeeping. The daemon crate owns the event loop
//! and all collaborators.

pub mod alarm;
pub mod attempts;
pub mod error;
pub mod policy;
pub mod security;
pub mod session;
pub mod settings;

pub use alarm::{Alarm, AlarmKind, AlarmTracker, Generation, PendingAlarm};
pub use attempts::{PasswordAttemptState, PasswordAttemptTracker, VerifyOutcome};
pub use error::{Error, Result};
pub use policy::{AppSelector, LockPolicy, LockStrategy, LockType, PasswordGate};
pub use security::{AutoLockSecurity, AutoLockSecurityState, PairedDevice, Proximity, ProximityKind};
pub use session::{LockSession, LockState, LockVariant, Pid};
pub use settings::{IdleLockState, SettingChange, SettingKey, SettingValue};

/// Maximum password attempts before an input block
pub const MAX_ATTEMPTS: u32 = 5;

/// Minimum accepted password length (characters)
pub const MIN_PASSWORD_LENGTH: usize = 4;

/// Maximum accepted password length (characters)
pub const MAX_PASSWORD_LENGTH: usize = 16;

/// Length of the input block window after exhausting attempts
pub const BLOCK_WINDOW_SECS: u32 = 30;

/// Default out-of-range threshold for the paired device (dBm)
pub const DEFAULT_OUT_OF_RANGE_DBM: i32 = -80;

/// Default in-range threshold for the paired device (dBm)
pub const DEFAULT_IN_RANGE_DBM: i32 = -60;
