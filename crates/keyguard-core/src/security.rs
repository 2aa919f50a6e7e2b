//! Proximity-driven auto-lock security
//!
//! With the auto-lock lock type, a password is required only while the
//! paired companion device is away. The monitor starts `Far` and falls back
//! to `Far` whenever it stops or loses track of the device, so a password is
//! required unless the device is positively known to be in range.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{DEFAULT_IN_RANGE_DBM, DEFAULT_OUT_OF_RANGE_DBM};

/// Proximity verdict for the paired device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Proximity {
    /// In range, no password required
    Near,
    /// Away or unknown, password required
    Far,
}

/// Proximity alert reported by the radio service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityKind {
    InRange,
    OutOfRange,
}

/// The paired device and its signal thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDevice {
    pub id: String,
    pub out_of_range_dbm: i32,
    pub in_range_dbm: i32,
}

impl Default for PairedDevice {
    fn default() -> Self {
        Self {
            id: String::new(),
            out_of_range_dbm: DEFAULT_OUT_OF_RANGE_DBM,
            in_range_dbm: DEFAULT_IN_RANGE_DBM,
        }
    }
}

impl PairedDevice {
    /// Check `out_of_range_dbm < in_range_dbm`
    pub fn validate(&self) -> Result<()> {
        if self.out_of_range_dbm >= self.in_range_dbm {
            return Err(Error::InvalidThresholds {
                out_of_range_dbm: self.out_of_range_dbm,
                in_range_dbm: self.in_range_dbm,
            });
        }
        Ok(())
    }
}

/// Snapshot of the auto-lock security state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoLockSecurityState {
    pub requires_password: bool,
    pub paired_device_id: String,
    pub out_of_range_dbm: i32,
    pub in_range_dbm: i32,
}

/// Auto-lock security monitor state
#[derive(Debug, Clone)]
pub struct AutoLockSecurity {
    proximity: Proximity,
    device: PairedDevice,
    active: bool,
}

impl AutoLockSecurity {
    /// Create an inactive monitor for `device`
    ///
    /// Invalid thresholds fall back to the defaults.
    pub fn new(device: PairedDevice) -> Self {
        let device = match device.validate() {
            Ok(()) => device,
            Err(_) => PairedDevice {
                id: device.id,
                ..PairedDevice::default()
            },
        };

        Self {
            proximity: Proximity::Far,
            device,
            active: false,
        }
    }

    pub fn proximity(&self) -> Proximity {
        self.proximity
    }

    pub fn requires_password(&self) -> bool {
        self.proximity == Proximity::Far
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn device(&self) -> &PairedDevice {
        &self.device
    }

    /// Start monitoring; returns false if already active
    pub fn activate(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.proximity = Proximity::Far;
        true
    }

    /// Stop monitoring and require a password again
    pub fn deactivate(&mut self) {
        self.active = false;
        self.proximity = Proximity::Far;
    }

    /// Apply an asynchronous proximity alert
    ///
    /// Returns the new verdict if it changed. Alerts are ignored while the
    /// monitor is inactive.
    pub fn on_alert(&mut self, kind: ProximityKind) -> Option<Proximity> {
        if !self.active {
            return None;
        }
        let next = match kind {
            ProximityKind::InRange => Proximity::Near,
            ProximityKind::OutOfRange => Proximity::Far,
        };
        self.transition(next)
    }

    /// Apply a polled signal strength
    ///
    /// At or above the in-range threshold the device is `Near`; at or below
    /// the out-of-range threshold it is `Far`. Between the two the verdict
    /// is unchanged.
    pub fn on_strength(&mut self, dbm: i32) -> Option<Proximity> {
        if !self.active {
            return None;
        }
        if dbm >= self.device.in_range_dbm {
            self.transition(Proximity::Near)
        } else if dbm <= self.device.out_of_range_dbm {
            self.transition(Proximity::Far)
        } else {
            None
        }
    }

    /// The radio lost the paired device; its range is unknown again
    pub fn on_link_lost(&mut self) -> Option<Proximity> {
        if !self.active {
            return None;
        }
        self.transition(Proximity::Far)
    }

    /// Switch to another paired device; its range is unknown so this forces `Far`
    pub fn set_paired_device(&mut self, id: String) {
        if self.device.id != id {
            self.device.id = id;
            self.proximity = Proximity::Far;
        }
    }

    /// Update thresholds, rejecting `out >= in`
    pub fn set_thresholds(&mut self, out_of_range_dbm: i32, in_range_dbm: i32) -> Result<()> {
        let candidate = PairedDevice {
            id: self.device.id.clone(),
            out_of_range_dbm,
            in_range_dbm,
        };
        candidate.validate()?;
        self.device = candidate;
        Ok(())
    }

    pub fn state(&self) -> AutoLockSecurityState {
        AutoLockSecurityState {
            requires_password: self.requires_password(),
            paired_device_id: self.device.id.clone(),
            out_of_range_dbm: self.device.out_of_range_dbm,
            in_range_dbm: self.device.in_range_dbm,
        }
    }

    fn transition(&mut self, next: Proximity) -> Option<Proximity> {
        if self.proximity == next {
            return None;
        }
        self.proximity = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> PairedDevice {
        PairedDevice {
            id: "watch-01".to_string(),
            out_of_range_dbm: -80,
            in_range_dbm: -60,
        }
    }

    #[test]
    fn test_starts_fail_secure() {
        let security = AutoLockSecurity::new(device());
        assert!(security.requires_password());
        assert!(!security.is_active());
    }

    #[test]
    fn test_alerts_ignored_while_inactive() {
        let mut security = AutoLockSecurity::new(device());
        assert_eq!(security.on_alert(ProximityKind::InRange), None);
        assert!(security.requires_password());
    }

    #[test]
    fn test_alert_transitions() {
        let mut security = AutoLockSecurity::new(device());
        security.activate();

        assert_eq!(security.on_alert(ProximityKind::InRange), Some(Proximity::Near));
        assert!(!security.requires_password());
        assert_eq!(security.on_alert(ProximityKind::InRange), None);
        assert_eq!(security.on_alert(ProximityKind::OutOfRange), Some(Proximity::Far));
        assert!(security.requires_password());
    }

    #[test]
    fn test_link_loss_requires_password() {
        let mut security = AutoLockSecurity::new(device());
        assert_eq!(security.on_link_lost(), None);

        security.activate();
        security.on_alert(ProximityKind::InRange);
        assert_eq!(security.on_link_lost(), Some(Proximity::Far));
        assert!(security.requires_password());
        assert_eq!(security.on_link_lost(), None);
    }

    #[test]
    fn test_strength_hysteresis() {
        let mut security = AutoLockSecurity::new(device());
        security.activate();

        assert_eq!(security.on_strength(-70), None);
        assert_eq!(security.on_strength(-55), Some(Proximity::Near));
        assert_eq!(security.on_strength(-70), None);
        assert_eq!(security.on_strength(-85), Some(Proximity::Far));
    }

    #[test]
    fn test_deactivate_forces_far() {
        let mut security = AutoLockSecurity::new(device());
        security.activate();
        security.on_alert(ProximityKind::InRange);
        security.deactivate();
        assert!(security.requires_password());
        assert!(!security.is_active());
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut security = AutoLockSecurity::new(device());
        assert!(matches!(
            security.set_thresholds(-50, -60),
            Err(Error::InvalidThresholds { .. })
        ));
        assert_eq!(security.device().out_of_range_dbm, -80);
        assert!(security.set_thresholds(-90, -50).is_ok());
    }

    #[test]
    fn test_invalid_initial_thresholds_use_defaults() {
        let security = AutoLockSecurity::new(PairedDevice {
            id: "watch".to_string(),
            out_of_range_dbm: -40,
            in_range_dbm: -40,
        });
        assert_eq!(security.device().out_of_range_dbm, DEFAULT_OUT_OF_RANGE_DBM);
        assert_eq!(security.device().in_range_dbm, DEFAULT_IN_RANGE_DBM);
        assert_eq!(security.device().id, "watch");
    }

    #[test]
    fn test_changing_device_forces_far() {
        let mut security = AutoLockSecurity::new(device());
        security.activate();
        security.on_alert(ProximityKind::InRange);
        security.set_paired_device("phone-02".to_string());
        assert!(security.requires_password());
    }
}
