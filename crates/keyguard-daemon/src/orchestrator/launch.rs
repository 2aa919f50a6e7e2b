//! Lock requests, launch retries and lock process supervision

use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use keyguard_core::{AlarmKind, Error, LockSession, LockState, LockVariant, Pid};

use super::Orchestrator;
use crate::adapters::{LaunchError, LaunchParams};
use crate::event::DisplayOffSource;

/// First delay once a secure lock app keeps exiting
const RECOVERY_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const RECOVERY_BACKOFF_MAX: Duration = Duration::from_secs(30);

impl Orchestrator {
    /// Make sure a lock screen is up
    ///
    /// Shared by every display-off source, the idle alarm, the deferred
    /// cover request and the end of a block window.
    pub(super) fn request_lock(&mut self, source: DisplayOffSource) {
        let lock_type = self.policy.lock_type;

        if self.call_active && !lock_type.is_password() {
            debug!("Ignoring lock request ({:?}) during an active call", source);
            return;
        }

        if self.cover_closed {
            debug!("Cover closed; deferring lock request ({:?})", source);
            self.deferred_lock = Some(source);
            return;
        }

        self.cancel_alarm(AlarmKind::IdleLock);

        let variant = match source {
            DisplayOffSource::Event => LockVariant::BackToApp,
            _ => LockVariant::Normal,
        };

        if let Some(pid) = self.lock_process_id() {
            if self.launcher.is_running(pid) {
                self.restart_in_place(pid);
                return;
            }
            warn!("Lock process {} is gone; launching a replacement", pid);
        }

        self.launch_lock(variant);
    }

    /// Reset the live lock UI instead of launching a second one
    fn restart_in_place(&mut self, pid: Pid) {
        match self.launcher.restart(pid) {
            Ok(()) => {
                debug!(
                    "{} (lock process {} running); restarted in place",
                    Error::ConcurrentLockRequest,
                    pid
                );
                if let Some(session) = self.session.as_mut() {
                    if session.state() == LockState::Launching {
                        session.mark_locked();
                        info!("Locked (lock process {})", pid);
                        self.publish_state();
                    }
                }
            }
            Err(e) => {
                warn!("Restart of lock process {} failed ({}); relaunching", pid, e);
                self.launcher.terminate(pid);
                let variant = self
                    .session
                    .as_ref()
                    .map(LockSession::requested_variant)
                    .unwrap_or_default();
                self.launch_lock(variant);
            }
        }
    }

    /// Launch the lock app for the current policy
    ///
    /// Ends in `Launching`/`Locked` with a live pid, or `Unlocked` when
    /// every attempt failed.
    pub(super) fn launch_lock(&mut self, variant: LockVariant) {
        let Some(app_id) = self.policy.app_id().map(str::to_string) else {
            debug!("Lock type {} launches nothing", self.policy.lock_type);
            return;
        };

        let params = LaunchParams {
            variant,
            sound_enabled: self.policy.sound_enabled,
            password_required: self.requires_password(),
        };

        let pid = match self.launch_with_fallback(&app_id, &params) {
            Ok(pid) => pid,
            Err(e) => {
                error!(
                    "Could not launch any lock screen for {} ({}); settling to unlocked",
                    self.policy.lock_type, e
                );
                self.unlock(false);
                return;
            }
        };
        self.process_started = Some(Instant::now());
        self.cancel_alarm(AlarmKind::RecoveryRelaunch);

        match self.session.as_mut() {
            Some(session) => session.replace_process(pid, variant),
            None => self.session = Some(LockSession::launching(pid, variant, Utc::now())),
        }
        info!("Launching lock screen {} ({}, pid {})", app_id, variant.as_str(), pid);
        self.publish_state();

        if self.launcher.is_running(pid) {
            if let Some(session) = self.session.as_mut() {
                session.mark_locked();
            }
            info!("Locked (lock process {})", pid);
            self.publish_state();
        } else {
            // The exit notification will follow on the bus
            warn!("Lock process {} not running right after launch", pid);
        }
    }

    /// Bounded retry of `app_id`, then one attempt at the fallback app
    fn launch_with_fallback(
        &mut self,
        app_id: &str,
        params: &LaunchParams,
    ) -> keyguard_core::Result<Pid> {
        let tries = self.config.launch_retry_count.max(1);
        let mut failure = Error::PermanentLaunchFailure(format!("{} never started", app_id));

        for attempt in 1..=tries {
            match self.launcher.launch(app_id, params) {
                Ok(pid) => return Ok(pid),
                Err(e @ LaunchError::Retryable(_)) => {
                    warn!("Launch of {} failed (attempt {}/{}): {}", app_id, attempt, tries, e);
                    failure = e.into();
                    if attempt < tries && !self.config.launch_retry_interval.is_zero() {
                        std::thread::sleep(self.config.launch_retry_interval);
                    }
                }
                Err(e @ LaunchError::Permanent(_)) => {
                    warn!("Launch of {} failed: {}", app_id, e);
                    failure = e.into();
                    break;
                }
            }
        }

        let fallback = self.config.fallback_app_id.clone();
        if fallback.is_empty() || fallback == app_id {
            return Err(failure);
        }

        warn!("Falling back to lock app {} after: {}", fallback, failure);
        self.launcher.launch(&fallback, params).map_err(|e| {
            warn!("Fallback launch of {} failed: {}", fallback, e);
            Error::from(e)
        })
    }

    pub(super) fn lock_process_exited(&mut self, pid: Pid) {
        let Some(session) = self.session.as_ref() else {
            debug!("Process {} exited with no lock session", pid);
            return;
        };
        if !session.owns(pid) {
            debug!("Ignoring exit of unrelated process {}", pid);
            return;
        }

        let device_far = self.security.requires_password();
        if self.policy.strategy().unlocks_on_exit(device_far) {
            info!("Lock process {} exited; treating as dismiss", pid);
            self.unlock(false);
            return;
        }

        // Secure lock screens cannot be dismissed by killing the UI
        if self.alarms.pending(AlarmKind::RecoveryRelaunch).is_some() {
            debug!("Recovery relaunch already scheduled");
            return;
        }

        let short_lived = self
            .process_started
            .map(|started| started.elapsed() < self.config.recovery_window)
            .unwrap_or(false);
        self.recovery_streak = if short_lived {
            self.recovery_streak.saturating_add(1)
        } else {
            1
        };

        let immediate = self.config.launch_retry_count.max(1);
        if self.recovery_streak <= immediate {
            warn!(
                "Lock process {} exited without verification; relaunching in recovery",
                pid
            );
            self.launch_lock(LockVariant::Recovery);
            return;
        }

        let doublings = (self.recovery_streak - immediate - 1).min(5);
        let delay = RECOVERY_BACKOFF_INITIAL
            .saturating_mul(1 << doublings)
            .min(RECOVERY_BACKOFF_MAX);
        warn!(
            "Lock process {} exited {} times in a row; relaunching in {}s",
            pid,
            self.recovery_streak,
            delay.as_secs()
        );
        self.arm_alarm(AlarmKind::RecoveryRelaunch, delay);
    }

    /// Backoff before a recovery relaunch elapsed
    pub(super) fn recovery_relaunch_due(&mut self) {
        let Some(pid) = self.lock_process_id() else {
            debug!("Recovery relaunch with no lock session");
            return;
        };
        if self.launcher.is_running(pid) {
            debug!("Lock process {} already back; no recovery relaunch", pid);
            return;
        }
        info!("Relaunching lock screen after crash backoff");
        self.launch_lock(LockVariant::Recovery);
    }
}
