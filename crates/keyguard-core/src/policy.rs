//! Lock policy and the per-type strategy table
//!
//! Every behavior that differs by lock type is looked up once in
//! [`LockType::strategy`] instead of re-branching at each call site.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::settings::SettingChange;

/// Built-in lock screen app ids
pub mod apps {
    pub const SWIPE: &str = "keyguard.swipe";
    pub const SIMPLE_PASSWORD: &str = "keyguard.simple-password";
    pub const PASSWORD: &str = "keyguard.password";
    pub const AUTO_LOCK: &str = "keyguard.auto-lock";
    /// Last-resort lock screen used when the primary app cannot start
    pub const DEFAULT: &str = "keyguard.default";
}

/// Lock-screen behavior selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    /// No lock screen
    #[default]
    None,
    /// Swipe to dismiss
    Swipe,
    /// Numeric PIN
    SimplePassword,
    /// Full alphanumeric password
    Password,
    /// Password required only while the paired device is away
    AutoLock,
    /// Vendor-supplied lock screen app
    Other,
}

impl LockType {
    pub const ALL: [LockType; 6] = [
        LockType::None,
        LockType::Swipe,
        LockType::SimplePassword,
        LockType::Password,
        LockType::AutoLock,
        LockType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LockType::None => "none",
            LockType::Swipe => "swipe",
            LockType::SimplePassword => "simple_password",
            LockType::Password => "password",
            LockType::AutoLock => "auto_lock",
            LockType::Other => "other",
        }
    }

    /// Strategy entry for this lock type
    pub fn strategy(&self) -> &'static LockStrategy {
        match self {
            LockType::None => &STRATEGIES[0],
            LockType::Swipe => &STRATEGIES[1],
            LockType::SimplePassword => &STRATEGIES[2],
            LockType::Password => &STRATEGIES[3],
            LockType::AutoLock => &STRATEGIES[4],
            LockType::Other => &STRATEGIES[5],
        }
    }

    /// Password or PIN lock
    pub fn is_password(&self) -> bool {
        matches!(self, LockType::Password | LockType::SimplePassword)
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        LockType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidSetting {
                key: "lock_type".to_string(),
                reason: format!("unknown lock type {:?}", s),
            })
    }
}

/// How the lock screen app id is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppSelector {
    /// Nothing is launched
    NoApp,
    /// A fixed built-in app
    Builtin(&'static str),
    /// The app named by `LockPolicy::selected_lock_app_id`
    Selected,
}

/// When unlocking requires a verified password
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordGate {
    Never,
    Always,
    /// Only while the paired device is not known to be in range
    WhenFar,
}

/// Per-lock-type behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockStrategy {
    pub app_selector: AppSelector,
    /// Lock process exit counts as a user dismiss, unless gated
    pub auto_unlock_on_exit: bool,
    pub password_gate: PasswordGate,
}

static STRATEGIES: [LockStrategy; 6] = [
    // None
    LockStrategy {
        app_selector: AppSelector::NoApp,
        auto_unlock_on_exit: true,
        password_gate: PasswordGate::Never,
    },
    // Swipe
    LockStrategy {
        app_selector: AppSelector::Builtin(apps::SWIPE),
        auto_unlock_on_exit: true,
        password_gate: PasswordGate::Never,
    },
    // SimplePassword
    LockStrategy {
        app_selector: AppSelector::Builtin(apps::SIMPLE_PASSWORD),
        auto_unlock_on_exit: false,
        password_gate: PasswordGate::Always,
    },
    // Password
    LockStrategy {
        app_selector: AppSelector::Builtin(apps::PASSWORD),
        auto_unlock_on_exit: false,
        password_gate: PasswordGate::Always,
    },
    // AutoLock
    LockStrategy {
        app_selector: AppSelector::Builtin(apps::AUTO_LOCK),
        auto_unlock_on_exit: true,
        password_gate: PasswordGate::WhenFar,
    },
    // Other
    LockStrategy {
        app_selector: AppSelector::Selected,
        auto_unlock_on_exit: true,
        password_gate: PasswordGate::Never,
    },
];

impl LockStrategy {
    /// Whether unlocking needs a verified password
    ///
    /// `device_far` is the auto-lock security verdict; it only matters for
    /// [`PasswordGate::WhenFar`].
    pub fn password_required(&self, device_far: bool) -> bool {
        match self.password_gate {
            PasswordGate::Never => false,
            PasswordGate::Always => true,
            PasswordGate::WhenFar => device_far,
        }
    }

    /// Whether a bare lock process exit unlocks the device
    pub fn unlocks_on_exit(&self, device_far: bool) -> bool {
        self.auto_unlock_on_exit && !self.password_required(device_far)
    }
}

/// Lock policy as read from the settings store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LockPolicy {
    pub lock_type: LockType,
    pub accessibility_lock_delay_seconds: u32,
    pub sound_enabled: bool,
    pub selected_lock_app_id: String,
}

impl LockPolicy {
    pub fn strategy(&self) -> &'static LockStrategy {
        self.lock_type.strategy()
    }

    /// Concrete app id for the current lock type, `None` if nothing launches
    pub fn app_id(&self) -> Option<&str> {
        match self.strategy().app_selector {
            AppSelector::NoApp => None,
            AppSelector::Builtin(id) => Some(id),
            AppSelector::Selected if self.selected_lock_app_id.is_empty() => Some(apps::DEFAULT),
            AppSelector::Selected => Some(&self.selected_lock_app_id),
        }
    }

    /// Delay before an idle lock, `None` when the lock is immediate
    pub fn idle_lock_delay(&self) -> Option<Duration> {
        match self.accessibility_lock_delay_seconds {
            0 => None,
            secs => Some(Duration::from_secs(u64::from(secs))),
        }
    }

    /// Apply a policy change, returning whether anything changed
    ///
    /// Changes to auto-lock device keys are not part of the policy and are
    /// ignored here.
    pub fn apply(&mut self, change: &SettingChange) -> bool {
        match change {
            SettingChange::LockType(t) => replace(&mut self.lock_type, *t),
            SettingChange::AccessibilityLockDelay(secs) => {
                replace(&mut self.accessibility_lock_delay_seconds, *secs)
            }
            SettingChange::SoundEnabled(b) => replace(&mut self.sound_enabled, *b),
            SettingChange::SelectedLockAppId(id) => {
                replace(&mut self.selected_lock_app_id, id.clone())
            }
            SettingChange::PairedDeviceId(_)
            | SettingChange::OutOfRangeThreshold(_)
            | SettingChange::InRangeThreshold(_) => false,
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_table_gates() {
        assert!(!LockType::Swipe.strategy().password_required(true));
        assert!(LockType::Password.strategy().password_required(false));
        assert!(LockType::SimplePassword.strategy().password_required(false));
        assert!(LockType::AutoLock.strategy().password_required(true));
        assert!(!LockType::AutoLock.strategy().password_required(false));
    }

    #[test]
    fn test_exit_unlocks_only_ungated_types() {
        assert!(LockType::Swipe.strategy().unlocks_on_exit(true));
        assert!(LockType::Other.strategy().unlocks_on_exit(true));
        assert!(!LockType::Password.strategy().unlocks_on_exit(false));
        assert!(!LockType::SimplePassword.strategy().unlocks_on_exit(false));
        assert!(!LockType::AutoLock.strategy().unlocks_on_exit(true));
        assert!(LockType::AutoLock.strategy().unlocks_on_exit(false));
    }

    #[test]
    fn test_app_id_resolution() {
        let mut policy = LockPolicy::default();
        assert_eq!(policy.app_id(), None);

        policy.lock_type = LockType::Password;
        assert_eq!(policy.app_id(), Some(apps::PASSWORD));

        policy.lock_type = LockType::Other;
        assert_eq!(policy.app_id(), Some(apps::DEFAULT));

        policy.selected_lock_app_id = "vendor.lockscreen".to_string();
        assert_eq!(policy.app_id(), Some("vendor.lockscreen"));
    }

    #[test]
    fn test_apply_reports_changes() {
        let mut policy = LockPolicy::default();
        assert!(policy.apply(&SettingChange::LockType(LockType::Swipe)));
        assert!(!policy.apply(&SettingChange::LockType(LockType::Swipe)));
        assert!(!policy.apply(&SettingChange::InRangeThreshold(-40)));
        assert!(policy.apply(&SettingChange::AccessibilityLockDelay(15)));
        assert_eq!(policy.idle_lock_delay(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_lock_type_parse() {
        for t in LockType::ALL {
            assert_eq!(t.as_str().parse::<LockType>().unwrap(), t);
        }
        assert!("pattern".parse::<LockType>().is_err());
    }
}
