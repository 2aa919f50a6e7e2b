//! Collaborator interfaces
//!
//! The orchestrator talks to the platform only through these traits. All of
//! them are synchronous: a call either completes quickly or starts work whose
//! result comes back later as an [`Event`](crate::event::Event).

use std::sync::Arc;
use std::time::Duration;

use keyguard_core::{Alarm, LockVariant, PairedDevice, Pid, SettingKey, SettingValue};

use crate::error::Result;

/// Parameters handed to a lock screen app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchParams {
    pub variant: LockVariant,
    pub sound_enabled: bool,
    /// Whether the UI must collect a password before dismissing
    pub password_required: bool,
}

/// Why a launch failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    /// Worth retrying the same app
    #[error("retryable launch failure: {0}")]
    Retryable(String),

    /// The app cannot be started
    #[error("permanent launch failure: {0}")]
    Permanent(String),
}

impl From<LaunchError> for keyguard_core::Error {
    fn from(e: LaunchError) -> Self {
        match e {
            LaunchError::Retryable(reason) => keyguard_core::Error::TransientLaunchFailure(reason),
            LaunchError::Permanent(reason) => keyguard_core::Error::PermanentLaunchFailure(reason),
        }
    }
}

/// Starts and supervises lock screen processes
///
/// Process exits are reported as `Event::ProcessExited`.
pub trait ProcessLauncher: Send {
    /// Start `app_id`, returning its pid
    fn launch(&mut self, app_id: &str, params: &LaunchParams) -> std::result::Result<Pid, LaunchError>;

    /// Whether `pid` is alive (queried, not assumed)
    fn is_running(&self, pid: Pid) -> bool;

    /// Ask a live lock process to reset itself instead of launching a second one
    fn restart(&mut self, pid: Pid) -> std::result::Result<(), LaunchError>;

    /// Ask `pid` to exit
    fn terminate(&mut self, pid: Pid);
}

/// Persistent key/value settings
///
/// Change notifications for policy keys are delivered as
/// `Event::SettingChanged`.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: SettingKey) -> Result<Option<SettingValue>>;

    fn set(&self, key: SettingKey, value: SettingValue) -> Result<()>;
}

/// One-shot wake-ups, fired as `Event::AlarmFired`
pub trait AlarmScheduler: Send {
    fn schedule(&mut self, alarm: Alarm, after: Duration);

    /// Best effort; a late firing is discarded by its generation
    fn cancel(&mut self, alarm: Alarm);
}

/// Radio link to the paired companion device
///
/// Proximity alerts arrive as `Event::ProximityAlert`.
pub trait ProximityLink: Send {
    /// Start monitoring `device`
    fn enable(&mut self, device: &PairedDevice);

    /// Stop monitoring and release the radio
    fn disable(&mut self);

    fn is_connected(&self) -> bool;

    /// Current signal strength in dBm, if connected
    fn current_strength(&self) -> Option<i32>;
}

/// Checks a candidate against the lock password
pub trait PasswordVerifier: Send {
    fn matches(&self, candidate: &str) -> bool;
}

/// Everything the orchestrator needs from the outside world
pub struct Collaborators {
    pub launcher: Box<dyn ProcessLauncher>,
    pub settings: Arc<dyn SettingsStore>,
    pub alarms: Box<dyn AlarmScheduler>,
    pub proximity: Box<dyn ProximityLink>,
    pub verifier: Box<dyn PasswordVerifier>,
}
