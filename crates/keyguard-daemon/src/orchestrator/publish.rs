//! Externally published state and the settings write retry

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use keyguard_core::{AlarmKind, IdleLockState, SettingKey, SettingValue};

use super::{Orchestrator, SETTINGS_RETRY_INITIAL};

impl Orchestrator {
    pub(super) fn publish_state(&mut self) {
        let state = IdleLockState::from(self.state());
        self.publish(SettingKey::IdleLockState, state.into());
    }

    pub(super) fn publish_attempts(&mut self) {
        let left = i64::from(self.attempts.remaining_attempts());
        self.publish(SettingKey::PasswordAttemptsLeft, SettingValue::Int(left));
    }

    /// Write a published key, keeping it for retry if the store refuses
    fn publish(&mut self, key: SettingKey, value: SettingValue) {
        match self.settings.set(key, value.clone()) {
            Ok(()) => {
                // A newer value supersedes any failed one
                self.unpublished.remove(&key);
            }
            Err(e) => {
                warn!("Could not publish {} = {}: {}", key, value, e);
                self.unpublished.insert(key, value);
                self.schedule_settings_retry();
            }
        }
    }

    fn schedule_settings_retry(&mut self) {
        if self.alarms.pending(AlarmKind::SettingsRetry).is_some() {
            return;
        }
        let after = self.settings_backoff;
        debug!("Retrying settings writes in {}s", after.as_secs());
        self.arm_alarm(AlarmKind::SettingsRetry, after);
    }

    /// Retry every write still pending
    pub(super) fn flush_unpublished(&mut self) {
        let pending = std::mem::take(&mut self.unpublished);
        let mut failed = BTreeMap::new();

        for (key, value) in pending {
            if let Err(e) = self.settings.set(key, value.clone()) {
                debug!("Settings retry of {} failed: {}", key, e);
                failed.insert(key, value);
            }
        }

        if failed.is_empty() {
            info!("Published state written to the settings store");
            self.settings_backoff = SETTINGS_RETRY_INITIAL;
            return;
        }

        self.unpublished = failed;
        self.settings_backoff = (self.settings_backoff * 2).min(self.config.settings_retry_max);
        self.schedule_settings_retry();
    }
}
