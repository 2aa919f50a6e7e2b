//! Lock orchestrator
//!
//! The single authoritative lock state machine:
//!
//! ```text
//! Unlocked -> Launching -> Locked -> Unlocked
//!                 |
//!                 +-> Unlocked (launch gave up)
//! ```
//!
//! The orchestrator exclusively owns the lock policy, the lock session, the
//! password attempt tracker and the auto-lock security state. It is driven
//! one [`Event`] at a time by the [`Dispatcher`](crate::bus::Dispatcher), and
//! every handler leaves the session in one of the well-defined states: errors
//! from collaborators are logged and converted to a safe state, never
//! propagated.

mod launch;
mod password;
mod publish;

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use keyguard_core::{
    Alarm, AlarmKind, AlarmTracker, AutoLockSecurity, LockPolicy, LockSession, LockState,
    LockType, PairedDevice, PasswordAttemptTracker, PendingAlarm, Pid, ProximityKind,
    SettingChange, SettingKey, SettingValue,
};

use crate::adapters::{
    AlarmScheduler, Collaborators, PasswordVerifier, ProcessLauncher, ProximityLink,
    SettingsStore,
};
use crate::event::{CoverState, DisplayOffSource, Event, OrchestratorSnapshot};

/// First delay of the settings write retry backoff
const SETTINGS_RETRY_INITIAL: Duration = Duration::from_secs(1);

/// Orchestrator tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Attempts of the primary lock app before falling back
    pub launch_retry_count: u32,
    pub launch_retry_interval: Duration,
    pub fallback_app_id: String,
    pub block_window_secs: u32,
    pub max_attempts: u32,
    pub settings_retry_max: Duration,
    /// A secure lock process exiting sooner than this counts towards the
    /// crash streak
    pub recovery_window: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            launch_retry_count: 3,
            launch_retry_interval: Duration::from_millis(200),
            fallback_app_id: keyguard_core::policy::apps::DEFAULT.to_string(),
            block_window_secs: keyguard_core::BLOCK_WINDOW_SECS,
            max_attempts: keyguard_core::MAX_ATTEMPTS,
            settings_retry_max: Duration::from_secs(60),
            recovery_window: Duration::from_secs(10),
        }
    }
}

/// The lock state machine
pub struct Orchestrator {
    config: OrchestratorConfig,

    policy: LockPolicy,
    session: Option<LockSession>,
    attempts: PasswordAttemptTracker,
    security: AutoLockSecurity,
    alarms: AlarmTracker,

    /// Seconds left in the password input block window
    block_remaining_secs: Option<u32>,
    display_on: bool,
    cover_closed: bool,
    call_active: bool,
    /// Lock request held back while the cover is closed
    deferred_lock: Option<DisplayOffSource>,

    /// When the current lock process was started
    process_started: Option<Instant>,
    /// Consecutive short-lived exits of secure lock processes
    recovery_streak: u32,

    /// Published values the settings store refused, latest per key
    unpublished: BTreeMap<SettingKey, SettingValue>,
    settings_backoff: Duration,

    launcher: Box<dyn ProcessLauncher>,
    settings: Arc<dyn SettingsStore>,
    scheduler: Box<dyn AlarmScheduler>,
    proximity: Box<dyn ProximityLink>,
    verifier: Box<dyn PasswordVerifier>,
}

impl Orchestrator {
    /// Create an orchestrator in the `Unlocked` state
    pub fn new(
        config: OrchestratorConfig,
        policy: LockPolicy,
        device: PairedDevice,
        collaborators: Collaborators,
    ) -> Self {
        let attempts = PasswordAttemptTracker::new(config.max_attempts);

        Self {
            config,
            policy,
            session: None,
            attempts,
            security: AutoLockSecurity::new(device),
            alarms: AlarmTracker::new(),
            block_remaining_secs: None,
            display_on: true,
            cover_closed: false,
            call_active: false,
            deferred_lock: None,
            process_started: None,
            recovery_streak: 0,
            unpublished: BTreeMap::new(),
            settings_backoff: SETTINGS_RETRY_INITIAL,
            launcher: collaborators.launcher,
            settings: collaborators.settings,
            scheduler: collaborators.alarms,
            proximity: collaborators.proximity,
            verifier: collaborators.verifier,
        }
    }

    /// Publish the initial state and start policy-dependent monitors
    pub fn start(&mut self) {
        info!("Orchestrator starting with lock type {}", self.policy.lock_type);
        self.publish_state();
        self.publish_attempts();
        if self.policy.lock_type == LockType::AutoLock {
            self.enable_auto_lock();
        }
    }

    /// Release timers and the radio link
    pub fn shutdown(&mut self) {
        for kind in [
            AlarmKind::IdleLock,
            AlarmKind::BlockTick,
            AlarmKind::SettingsRetry,
            AlarmKind::RecoveryRelaunch,
        ] {
            self.cancel_alarm(kind);
        }
        if self.security.is_active() {
            self.disable_auto_lock();
        }
    }

    /// Handle one event to completion
    pub fn handle(&mut self, event: Event) {
        debug!("Handling {}", event.topic());

        match event {
            Event::DisplayOn => self.display_on(),
            Event::DisplayOff(source) => self.display_off(source),
            Event::CoverChanged(state) => self.cover_changed(state),
            Event::ProximityAlert { kind, strength } => self.proximity_alert(kind, strength),
            Event::ProximityLinkChanged { connected } => self.proximity_link_changed(connected),
            Event::CallStateChanged { active } => {
                debug!("Call active: {}", active);
                self.call_active = active;
            }
            Event::ProcessExited(pid) => self.lock_process_exited(pid),
            Event::SettingChanged(change) => self.apply_setting(change),
            Event::PasswordAttempt { candidate, reply } => {
                let answer = self.password_attempt(candidate.as_str());
                reply.send(answer);
            }
            Event::PasswordVerified => self.external_password_verified(),
            Event::ExternalUnlockRequest { reply } => {
                let granted = self.external_unlock_request();
                reply.send(granted);
            }
            Event::AlarmFired(alarm) => self.alarm_fired(alarm),
            Event::Snapshot { reply } => reply.send(self.snapshot()),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> LockState {
        self.session
            .as_ref()
            .map(LockSession::state)
            .unwrap_or(LockState::Unlocked)
    }

    pub fn lock_process_id(&self) -> Option<Pid> {
        self.session.as_ref().map(LockSession::lock_process_id)
    }

    pub fn session(&self) -> Option<&LockSession> {
        self.session.as_ref()
    }

    pub fn policy(&self) -> &LockPolicy {
        &self.policy
    }

    pub fn attempts(&self) -> &PasswordAttemptTracker {
        &self.attempts
    }

    pub fn security(&self) -> &AutoLockSecurity {
        &self.security
    }

    pub fn pending_alarm(&self, kind: AlarmKind) -> Option<&PendingAlarm> {
        self.alarms.pending(kind)
    }

    /// Whether unlocking currently needs a verified password
    pub fn requires_password(&self) -> bool {
        self.policy
            .strategy()
            .password_required(self.security.requires_password())
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        OrchestratorSnapshot {
            state: self.state(),
            lock_type: self.policy.lock_type,
            lock_process_id: self.lock_process_id(),
            variant: self.session.as_ref().map(LockSession::requested_variant),
            started_at: self.session.as_ref().map(LockSession::started_at),
            requires_password: self.requires_password(),
            attempts: self.attempts.state(),
            block_remaining_secs: self.block_remaining_secs,
            idle_alarm: self.alarms.pending(AlarmKind::IdleLock).copied(),
            display_on: self.display_on,
            cover_closed: self.cover_closed,
            call_active: self.call_active,
            security: self.security.state(),
        }
    }

    // ------------------------------------------------------------------
    // Display, cover and proximity
    // ------------------------------------------------------------------

    pub(super) fn display_off(&mut self, source: DisplayOffSource) {
        self.display_on = false;

        if self.policy.lock_type == LockType::None {
            debug!("Display off ({:?}) with no lock type", source);
            return;
        }

        if source == DisplayOffSource::Timeout && self.session.is_none() {
            if let Some(delay) = self.policy.idle_lock_delay() {
                let alarm = self.arm_alarm(AlarmKind::IdleLock, delay);
                info!(
                    "Idle lock scheduled in {}s (generation {})",
                    delay.as_secs(),
                    alarm.generation
                );
                return;
            }
        }

        self.request_lock(source);
    }

    fn display_on(&mut self) {
        self.display_on = true;
        self.cancel_alarm(AlarmKind::IdleLock);

        if self.state() == LockState::Locked && self.policy.lock_type == LockType::None {
            info!("Display on with lock type none; dismissing lock screen");
            self.unlock(true);
        }
    }

    /// Idle lock alarm fired with a current generation
    fn idle_timeout_elapsed(&mut self) {
        if self.policy.lock_type == LockType::None {
            debug!("Idle lock alarm with no lock type");
            return;
        }
        info!("Idle lock delay elapsed");
        self.request_lock(DisplayOffSource::Timeout);
    }

    fn cover_changed(&mut self, state: CoverState) {
        match state {
            CoverState::Closed => {
                debug!("Cover closed");
                self.cover_closed = true;
            }
            CoverState::Open => {
                debug!("Cover opened");
                self.cover_closed = false;
                if let Some(source) = self.deferred_lock.take() {
                    info!("Running lock request deferred while covered");
                    self.request_lock(source);
                }
            }
        }
    }

    fn proximity_alert(&mut self, kind: ProximityKind, strength: Option<i32>) {
        if !self.security.is_active() {
            debug!("Ignoring proximity alert {:?}: auto-lock inactive", kind);
            return;
        }

        if let Some(proximity) = self.security.on_alert(kind) {
            info!(
                "Paired device {:?} (strength {:?} dBm); password required: {}",
                proximity,
                strength,
                self.security.requires_password()
            );
        }
    }

    fn proximity_link_changed(&mut self, connected: bool) {
        if !self.security.is_active() {
            debug!("Ignoring proximity link change: auto-lock inactive");
            return;
        }

        if connected {
            self.poll_proximity();
        } else if self.security.on_link_lost().is_some() {
            info!("Lost link to paired device; password required");
        }
    }

    fn enable_auto_lock(&mut self) {
        if !self.security.activate() {
            return;
        }
        info!("Auto-lock monitor enabled for {:?}", self.security.device().id);
        self.proximity.enable(self.security.device());
        self.poll_proximity();
    }

    fn disable_auto_lock(&mut self) {
        self.security.deactivate();
        self.proximity.disable();
        info!("Auto-lock monitor disabled");
    }

    /// One-shot strength query while connected
    fn poll_proximity(&mut self) {
        if !self.security.is_active() || !self.proximity.is_connected() {
            return;
        }
        if let Some(dbm) = self.proximity.current_strength() {
            if let Some(proximity) = self.security.on_strength(dbm) {
                info!("Polled paired device at {} dBm: {:?}", dbm, proximity);
            }
        }
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    fn apply_setting(&mut self, change: SettingChange) {
        match change {
            SettingChange::PairedDeviceId(id) => {
                self.security.set_paired_device(id);
                if self.security.is_active() {
                    self.proximity.disable();
                    self.proximity.enable(self.security.device());
                    self.poll_proximity();
                }
            }
            SettingChange::OutOfRangeThreshold(dbm) => {
                let in_range = self.security.device().in_range_dbm;
                if let Err(e) = self.security.set_thresholds(dbm, in_range) {
                    warn!("Rejecting threshold change: {}", e);
                }
            }
            SettingChange::InRangeThreshold(dbm) => {
                let out_of_range = self.security.device().out_of_range_dbm;
                if let Err(e) = self.security.set_thresholds(out_of_range, dbm) {
                    warn!("Rejecting threshold change: {}", e);
                }
            }
            change => {
                let previous = self.policy.lock_type;
                if !self.policy.apply(&change) {
                    return;
                }
                debug!("Policy updated: {:?}", change);
                if self.policy.lock_type != previous {
                    self.lock_type_changed(previous);
                }
            }
        }
    }

    fn lock_type_changed(&mut self, previous: LockType) {
        let current = self.policy.lock_type;
        info!("Lock type changed: {} -> {}", previous, current);

        // A new policy starts a fresh attempt round
        self.attempts = PasswordAttemptTracker::new(self.config.max_attempts);
        if self.block_remaining_secs.take().is_some() {
            self.cancel_alarm(AlarmKind::BlockTick);
        }
        self.publish_attempts();

        if current == LockType::None {
            self.cancel_alarm(AlarmKind::IdleLock);
            self.deferred_lock = None;
        }

        if current == LockType::AutoLock {
            self.enable_auto_lock();
        } else if self.security.is_active() {
            self.disable_auto_lock();
        }
    }

    // ------------------------------------------------------------------
    // Unlocking
    // ------------------------------------------------------------------

    /// End the session; `terminate` asks the lock process to exit
    fn unlock(&mut self, terminate: bool) {
        if let Some(session) = self.session.take() {
            let pid = session.lock_process_id();
            if terminate {
                self.launcher.terminate(pid);
            }
            info!("Unlocked (lock process {})", pid);
        }
        self.deferred_lock = None;
        self.process_started = None;
        self.recovery_streak = 0;
        self.cancel_alarm(AlarmKind::RecoveryRelaunch);
        self.publish_state();
    }

    // ------------------------------------------------------------------
    // Alarms
    // ------------------------------------------------------------------

    fn alarm_fired(&mut self, alarm: Alarm) {
        if let Err(e) = self.alarms.accept(alarm) {
            debug!("Discarding {:?} alarm: {}", alarm.kind, e);
            return;
        }

        match alarm.kind {
            AlarmKind::IdleLock => self.idle_timeout_elapsed(),
            AlarmKind::BlockTick => self.block_tick(),
            AlarmKind::SettingsRetry => self.flush_unpublished(),
            AlarmKind::RecoveryRelaunch => self.recovery_relaunch_due(),
        }
    }

    fn arm_alarm(&mut self, kind: AlarmKind, after: Duration) -> Alarm {
        let fire_at = Utc::now()
            + chrono::Duration::from_std(after).unwrap_or_else(|_| chrono::Duration::zero());
        let (alarm, replaced) = self.alarms.arm(kind, fire_at);
        if let Some(old) = replaced {
            self.scheduler.cancel(old);
        }
        self.scheduler.schedule(alarm, after);
        alarm
    }

    fn cancel_alarm(&mut self, kind: AlarmKind) {
        if let Some(alarm) = self.alarms.disarm(kind) {
            debug!("Cancelled {:?} alarm (generation {})", kind, alarm.generation);
            self.scheduler.cancel(alarm);
        }
    }
}
