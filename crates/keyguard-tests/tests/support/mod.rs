//! Recording fakes for the orchestrator's collaborators
//!
//! Every fake is a cheap handle over shared state, so a test keeps one copy
//! for assertions while the orchestrator owns the other.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keyguard_core::{
    Alarm, AlarmKind, Error, IdleLockState, LockPolicy, LockState, LockType, PairedDevice, Pid,
    SettingKey, SettingValue,
};
use keyguard_daemon::event::Reply;
use keyguard_daemon::{
    AlarmScheduler, AttemptReply, Collaborators, DaemonError, Event, LaunchError, LaunchParams,
    Orchestrator, OrchestratorConfig, PasswordVerifier, ProcessLauncher, ProximityLink,
    SettingsStore,
};

pub const PASSWORD: &str = "2580";
pub const FIRST_PID: u32 = 100;

// ----------------------------------------------------------------------
// Process launcher
// ----------------------------------------------------------------------

#[derive(Debug, Default)]
struct LauncherState {
    next_pid: u32,
    failures: VecDeque<LaunchError>,
    running: HashSet<Pid>,
    launches: Vec<(String, LaunchParams)>,
    restarts: Vec<Pid>,
    terminations: Vec<Pid>,
}

#[derive(Debug, Clone)]
pub struct FakeLauncher {
    state: Arc<Mutex<LauncherState>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LauncherState {
                next_pid: FIRST_PID,
                ..LauncherState::default()
            })),
        }
    }

    /// Make the next launches fail, in order
    pub fn fail_next(&self, failures: impl IntoIterator<Item = LaunchError>) {
        self.state.lock().unwrap().failures.extend(failures);
    }

    /// Simulate the process dying (the exit event is up to the test)
    pub fn kill(&self, pid: Pid) {
        self.state.lock().unwrap().running.remove(&pid);
    }

    pub fn running(&self) -> Vec<Pid> {
        self.state.lock().unwrap().running.iter().copied().collect()
    }

    pub fn launched_apps(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .launches
            .iter()
            .map(|(app, _)| app.clone())
            .collect()
    }

    pub fn launches(&self) -> Vec<(String, LaunchParams)> {
        self.state.lock().unwrap().launches.clone()
    }

    pub fn restarts(&self) -> Vec<Pid> {
        self.state.lock().unwrap().restarts.clone()
    }

    pub fn terminations(&self) -> Vec<Pid> {
        self.state.lock().unwrap().terminations.clone()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&mut self, app_id: &str, params: &LaunchParams) -> Result<Pid, LaunchError> {
        let mut state = self.state.lock().unwrap();
        state.launches.push((app_id.to_string(), *params));

        if let Some(failure) = state.failures.pop_front() {
            return Err(failure);
        }

        let pid = Pid(state.next_pid);
        state.next_pid += 1;
        state.running.insert(pid);
        Ok(pid)
    }

    fn is_running(&self, pid: Pid) -> bool {
        self.state.lock().unwrap().running.contains(&pid)
    }

    fn restart(&mut self, pid: Pid) -> Result<(), LaunchError> {
        let mut state = self.state.lock().unwrap();
        if !state.running.contains(&pid) {
            return Err(LaunchError::Retryable(format!("{} not running", pid)));
        }
        state.restarts.push(pid);
        Ok(())
    }

    fn terminate(&mut self, pid: Pid) {
        let mut state = self.state.lock().unwrap();
        state.running.remove(&pid);
        state.terminations.push(pid);
    }
}

// ----------------------------------------------------------------------
// Settings store
// ----------------------------------------------------------------------

#[derive(Debug, Default)]
struct SettingsState {
    values: BTreeMap<SettingKey, SettingValue>,
    writes: Vec<(SettingKey, SettingValue)>,
    failing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    state: Arc<Mutex<SettingsState>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn value(&self, key: SettingKey) -> Option<SettingValue> {
        self.state.lock().unwrap().values.get(&key).cloned()
    }

    /// Successful writes of `key`, oldest first
    pub fn writes(&self, key: SettingKey) -> Vec<SettingValue> {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    pub fn idle_lock_state(&self) -> Option<IdleLockState> {
        self.value(SettingKey::IdleLockState)
            .and_then(|v| v.as_int())
            .and_then(IdleLockState::from_code)
    }

    pub fn attempts_left(&self) -> Option<i64> {
        self.value(SettingKey::PasswordAttemptsLeft)
            .and_then(|v| v.as_int())
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: SettingKey) -> keyguard_daemon::Result<Option<SettingValue>> {
        Ok(self.value(key))
    }

    fn set(&self, key: SettingKey, value: SettingValue) -> keyguard_daemon::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing {
            return Err(DaemonError::Core(Error::SettingsStoreUnavailable(
                "store unavailable".to_string(),
            )));
        }
        state.values.insert(key, value.clone());
        state.writes.push((key, value));
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Alarm scheduler
// ----------------------------------------------------------------------

#[derive(Debug, Default)]
struct AlarmState {
    scheduled: Vec<(Alarm, Duration)>,
    cancelled: Vec<Alarm>,
}

/// Alarms fire only when the test says so
#[derive(Debug, Clone, Default)]
pub struct ManualAlarms {
    state: Arc<Mutex<AlarmState>>,
}

impl ManualAlarms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently scheduled alarm of `kind`
    pub fn latest(&self, kind: AlarmKind) -> Option<(Alarm, Duration)> {
        self.state
            .lock()
            .unwrap()
            .scheduled
            .iter()
            .rev()
            .find(|(alarm, _)| alarm.kind == kind)
            .copied()
    }

    pub fn scheduled_count(&self, kind: AlarmKind) -> usize {
        self.state
            .lock()
            .unwrap()
            .scheduled
            .iter()
            .filter(|(alarm, _)| alarm.kind == kind)
            .count()
    }

    pub fn was_cancelled(&self, alarm: Alarm) -> bool {
        self.state.lock().unwrap().cancelled.contains(&alarm)
    }
}

impl AlarmScheduler for ManualAlarms {
    fn schedule(&mut self, alarm: Alarm, after: Duration) {
        self.state.lock().unwrap().scheduled.push((alarm, after));
    }

    fn cancel(&mut self, alarm: Alarm) {
        self.state.lock().unwrap().cancelled.push(alarm);
    }
}

// ----------------------------------------------------------------------
// Proximity link
// ----------------------------------------------------------------------

#[derive(Debug, Default)]
struct LinkState {
    enabled: bool,
    enable_count: usize,
    connected: bool,
    strength: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeLink {
    state: Arc<Mutex<LinkState>>,
}

impl FakeLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, strength: i32) {
        let mut state = self.state.lock().unwrap();
        state.connected = true;
        state.strength = Some(strength);
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    pub fn enable_count(&self) -> usize {
        self.state.lock().unwrap().enable_count
    }
}

impl ProximityLink for FakeLink {
    fn enable(&mut self, _device: &PairedDevice) {
        let mut state = self.state.lock().unwrap();
        state.enabled = true;
        state.enable_count += 1;
    }

    fn disable(&mut self) {
        self.state.lock().unwrap().enabled = false;
    }

    fn is_connected(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.enabled && state.connected
    }

    fn current_strength(&self) -> Option<i32> {
        let state = self.state.lock().unwrap();
        if state.enabled && state.connected {
            state.strength
        } else {
            None
        }
    }
}

// ----------------------------------------------------------------------
// Password verifier
// ----------------------------------------------------------------------

pub struct FixedVerifier(pub String);

impl PasswordVerifier for FixedVerifier {
    fn matches(&self, candidate: &str) -> bool {
        candidate == self.0
    }
}

// ----------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        launch_retry_count: 3,
        launch_retry_interval: Duration::ZERO,
        fallback_app_id: keyguard_core::policy::apps::DEFAULT.to_string(),
        block_window_secs: 30,
        max_attempts: 5,
        settings_retry_max: Duration::from_secs(8),
        recovery_window: Duration::from_secs(10),
    }
}

/// A started orchestrator wired to fakes
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub launcher: FakeLauncher,
    pub settings: MemorySettings,
    pub alarms: ManualAlarms,
    pub link: FakeLink,
}

impl Harness {
    pub fn new(lock_type: LockType) -> Self {
        Self::with_policy(LockPolicy {
            lock_type,
            ..LockPolicy::default()
        })
    }

    pub fn with_policy(policy: LockPolicy) -> Self {
        let device = PairedDevice {
            id: "watch-1".to_string(),
            ..PairedDevice::default()
        };
        Self::build(policy, device, MemorySettings::new(), FakeLink::new())
    }

    pub fn build(
        policy: LockPolicy,
        device: PairedDevice,
        settings: MemorySettings,
        link: FakeLink,
    ) -> Self {
        let launcher = FakeLauncher::new();
        let alarms = ManualAlarms::new();

        let collaborators = Collaborators {
            launcher: Box::new(launcher.clone()),
            settings: Arc::new(settings.clone()),
            alarms: Box::new(alarms.clone()),
            proximity: Box::new(link.clone()),
            verifier: Box::new(FixedVerifier(PASSWORD.to_string())),
        };

        let mut orchestrator = Orchestrator::new(test_config(), policy, device, collaborators);
        orchestrator.start();
        settings.clear_writes();

        Self {
            orchestrator,
            launcher,
            settings,
            alarms,
            link,
        }
    }

    pub fn handle(&mut self, event: Event) {
        self.orchestrator.handle(event);
    }

    pub fn state(&self) -> LockState {
        self.orchestrator.state()
    }

    pub fn pid(&self) -> Option<Pid> {
        self.orchestrator.lock_process_id()
    }

    /// Fire the most recent alarm of `kind`, whether or not it is current
    pub fn fire(&mut self, kind: AlarmKind) -> bool {
        match self.alarms.latest(kind) {
            Some((alarm, _)) => {
                self.handle(Event::AlarmFired(alarm));
                true
            }
            None => false,
        }
    }

    pub fn attempt(&mut self, password: &str) -> AttemptReply {
        let (reply, mut rx) = Reply::channel();
        self.handle(Event::PasswordAttempt {
            candidate: keyguard_daemon::event::PasswordCandidate::new(password.to_string()),
            reply,
        });
        rx.try_recv().expect("orchestrator answers synchronously")
    }

    pub fn unlock_request(&mut self) -> bool {
        let (reply, mut rx) = Reply::channel();
        self.handle(Event::ExternalUnlockRequest { reply });
        rx.try_recv().expect("orchestrator answers synchronously")
    }

    /// Pid exits and the exit notification is delivered
    pub fn exit(&mut self, pid: Pid) {
        self.launcher.kill(pid);
        self.handle(Event::ProcessExited(pid));
    }
}
