//! Lock screen process launcher
//!
//! Maps lock app ids to command lines, spawns them with `tokio::process` and
//! watches each child so its exit reaches the orchestrator as
//! `Event::ProcessExited`.

use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use keyguard_core::Pid;

use crate::adapters::{LaunchError, LaunchParams, ProcessLauncher};
use crate::bus::EventBus;
use crate::config::AppCommand;
use crate::event::Event;

/// Spawns lock apps from configured command lines
pub struct CommandLauncher {
    apps: BTreeMap<String, AppCommand>,
    bus: EventBus,
    runtime: Handle,

    /// Children spawned here that have not exited yet
    children: Arc<Mutex<HashSet<Pid>>>,
}

impl CommandLauncher {
    /// Create a launcher; child watchers run on `runtime`
    pub fn new(apps: BTreeMap<String, AppCommand>, bus: EventBus, runtime: Handle) -> Self {
        Self {
            apps,
            bus,
            runtime,
            children: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn is_child(&self, pid: Pid) -> bool {
        self.children
            .lock()
            .map(|children| children.contains(&pid))
            .unwrap_or(false)
    }
}

impl ProcessLauncher for CommandLauncher {
    fn launch(&mut self, app_id: &str, params: &LaunchParams) -> Result<Pid, LaunchError> {
        let app = self
            .apps
            .get(app_id)
            .ok_or_else(|| LaunchError::Permanent(format!("unknown lock app {}", app_id)))?;

        let mut command = Command::new(&app.program);
        command
            .args(&app.args)
            .arg("--variant")
            .arg(params.variant.as_str())
            .env("KEYGUARD_SOUND", if params.sound_enabled { "1" } else { "0" })
            .env(
                "KEYGUARD_PASSWORD_REQUIRED",
                if params.password_required { "1" } else { "0" },
            )
            .stdin(Stdio::null());

        debug!("Launching {}: {:?}", app_id, command);

        // Spawning registers the child with the runtime's reactor
        let _guard = self.runtime.enter();
        let mut child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                LaunchError::Permanent(format!("{}: {}", app.program.display(), e))
            }
            _ => LaunchError::Retryable(format!("{}: {}", app.program.display(), e)),
        })?;

        let pid = child
            .id()
            .map(Pid)
            .ok_or_else(|| LaunchError::Retryable(format!("{} exited during spawn", app_id)))?;

        if let Ok(mut children) = self.children.lock() {
            children.insert(pid);
        }
        info!("Spawned lock app {} (pid {})", app_id, pid);

        let children = Arc::clone(&self.children);
        let bus = self.bus.clone();
        self.runtime.spawn(async move {
            match child.wait().await {
                Ok(status) => info!("Lock process {} exited: {}", pid, status),
                Err(e) => warn!("Failed waiting for lock process {}: {}", pid, e),
            }
            if let Ok(mut children) = children.lock() {
                children.remove(&pid);
            }
            if let Err(e) = bus.publish(Event::ProcessExited(pid)) {
                debug!("Exit of {} not delivered: {}", pid, e);
            }
        });

        Ok(pid)
    }

    fn is_running(&self, pid: Pid) -> bool {
        // Exit not yet reaped by the watcher still counts as gone
        self.is_child(pid) && process_alive(pid)
    }

    fn restart(&mut self, pid: Pid) -> Result<(), LaunchError> {
        if !self.is_child(pid) {
            return Err(LaunchError::Retryable(format!("{} is not a lock process", pid)));
        }
        send_signal(pid, Signal::Restart)
    }

    fn terminate(&mut self, pid: Pid) {
        if !self.is_child(pid) {
            debug!("Not terminating {}: already gone", pid);
            return;
        }
        if let Err(e) = send_signal(pid, Signal::Terminate) {
            warn!("Failed to terminate lock process {}: {}", pid, e);
        }
    }
}

enum Signal {
    /// Reset the lock UI view in place
    Restart,
    Terminate,
}

fn send_signal(pid: Pid, signal: Signal) -> Result<(), LaunchError> {
    use nix::sys::signal::{kill, Signal as NixSignal};

    let signal = match signal {
        Signal::Restart => NixSignal::SIGUSR1,
        Signal::Terminate => NixSignal::SIGTERM,
    };
    kill(nix::unistd::Pid::from_raw(pid.0 as i32), signal)
        .map_err(|e| LaunchError::Retryable(format!("{:?} to {}: {}", signal, pid, e)))
}

fn process_alive(pid: Pid) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;

    match kill(nix::unistd::Pid::from_raw(pid.0 as i32), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
