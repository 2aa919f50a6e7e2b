//! Error types for keyguard core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Launch failed but may succeed if retried
    #[error("Transient launch failure: {0}")]
    TransientLaunchFailure(String),

    /// Launch cannot succeed for this app id
    #[error("Permanent launch failure: {0}")]
    PermanentLaunchFailure(String),

    #[error("Settings store unavailable: {0}")]
    SettingsStoreUnavailable(String),

    /// Password candidate outside the accepted length range
    #[error("Invalid password input: {0}")]
    InvalidPasswordInput(String),

    /// A lock was requested while one is already up
    #[error("Lock already requested")]
    ConcurrentLockRequest,

    /// An alarm fired whose generation is no longer tracked
    #[error("Stale alarm fired (generation {0})")]
    StaleAlarmFired(u64),

    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Out-of-range threshold {out_of_range_dbm} dBm must be below in-range threshold {in_range_dbm} dBm")]
    InvalidThresholds {
        out_of_range_dbm: i32,
        in_range_dbm: i32,
    },
}
