//! Proximity link fed by the radio service
//!
//! The radio service owns the actual connection to the paired device and
//! reports link state over IPC. Alerts and link changes go through the event
//! bus; this link only answers the orchestrator's enable/disable and polling
//! calls.

use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use keyguard_core::PairedDevice;

use crate::adapters::ProximityLink;

#[derive(Debug, Default)]
struct LinkState {
    enabled: bool,
    connected: bool,
    strength: Option<i32>,
}

/// Shared link state; clones see the same link
#[derive(Debug, Clone, Default)]
pub struct ReportedProximityLink {
    state: Arc<Mutex<LinkState>>,
}

impl ReportedProximityLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a link report from the radio service
    pub fn report(&self, connected: bool, strength: Option<i32>) {
        if let Ok(mut state) = self.state.lock() {
            debug!("Proximity link report: connected={} strength={:?}", connected, strength);
            state.connected = connected;
            state.strength = if connected { strength } else { None };
        }
    }

    /// Whether the orchestrator currently wants proximity monitoring
    pub fn is_enabled(&self) -> bool {
        self.state.lock().map(|state| state.enabled).unwrap_or(false)
    }
}

impl ProximityLink for ReportedProximityLink {
    fn enable(&mut self, device: &PairedDevice) {
        if let Ok(mut state) = self.state.lock() {
            info!("Proximity monitoring enabled for {:?}", device.id);
            state.enabled = true;
        }
    }

    fn disable(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            info!("Proximity monitoring disabled");
            state.enabled = false;
        }
    }

    fn is_connected(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.enabled && state.connected)
            .unwrap_or(false)
    }

    fn current_strength(&self) -> Option<i32> {
        self.state
            .lock()
            .ok()
            .filter(|state| state.enabled && state.connected)
            .and_then(|state| state.strength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_link_reports_nothing() {
        let link = ReportedProximityLink::new();
        link.report(true, Some(-40));

        assert!(!link.is_connected());
        assert_eq!(link.current_strength(), None);
    }

    #[test]
    fn test_enabled_link_shares_reports() {
        let mut link = ReportedProximityLink::new();
        let reporter = link.clone();

        link.enable(&PairedDevice {
            id: "watch".to_string(),
            ..PairedDevice::default()
        });
        reporter.report(true, Some(-45));

        assert!(link.is_connected());
        assert_eq!(link.current_strength(), Some(-45));
        assert!(reporter.is_enabled());

        reporter.report(false, Some(-45));
        assert_eq!(link.current_strength(), None);

        link.disable();
        assert!(!reporter.is_enabled());
    }
}
