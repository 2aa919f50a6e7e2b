//! Password attempts, the input block window and unlock requests

use std::time::Duration;
use tracing::{debug, info, warn};

use keyguard_core::{AlarmKind, LockState, LockType, VerifyOutcome};

use super::Orchestrator;
use crate::event::{AttemptReply, DisplayOffSource};

const BLOCK_TICK: Duration = Duration::from_secs(1);

impl Orchestrator {
    pub(super) fn password_attempt(&mut self, candidate: &str) -> AttemptReply {
        let outcome = if self.block_remaining_secs.is_some() || self.attempts.is_blocked() {
            debug!("Password attempt rejected: input blocked");
            VerifyOutcome::InputBlock
        } else {
            let verifier = &self.verifier;
            let outcome = self.attempts.verify(candidate, |c| verifier.matches(c));

            match outcome {
                VerifyOutcome::Correct => {
                    info!("Password accepted");
                    self.password_verified();
                }
                VerifyOutcome::Incorrect => {
                    info!(
                        "Incorrect password, {} attempts left",
                        self.attempts.remaining_attempts()
                    );
                    self.publish_attempts();
                }
                VerifyOutcome::InputBlock => {
                    self.publish_attempts();
                    self.start_block_window();
                }
                VerifyOutcome::Empty | VerifyOutcome::TooLong => {
                    debug!("Password attempt rejected: {:?}", outcome);
                }
            }
            outcome
        };

        AttemptReply {
            outcome,
            remaining_attempts: self.attempts.remaining_attempts(),
            block_remaining_secs: self.block_remaining_secs,
        }
    }

    /// Verification reported by another component
    ///
    /// Refused while the input block window runs, like any other attempt.
    pub(super) fn external_password_verified(&mut self) {
        if let Some(remaining) = self.block_remaining_secs {
            warn!(
                "External password verification rejected: input blocked for {}s",
                remaining
            );
            return;
        }
        info!("Password verified externally");
        self.password_verified();
    }

    /// Unlock after a verified password
    pub(super) fn password_verified(&mut self) {
        if self.block_remaining_secs.take().is_some() {
            self.cancel_alarm(AlarmKind::BlockTick);
        }
        self.attempts.reset();
        self.publish_attempts();

        if self.session.is_none() {
            debug!("Password verified with no lock session");
            return;
        }
        self.unlock(true);
    }

    /// Out-of-band unlock from another component
    pub(super) fn external_unlock_request(&mut self) -> bool {
        let lock_ui_shown = self
            .lock_process_id()
            .map(|pid| self.launcher.is_running(pid))
            .unwrap_or(false);

        if self.policy.lock_type == LockType::None || !lock_ui_shown {
            info!("External unlock request honored");
            if self.session.is_some() {
                self.unlock(true);
            }
            return true;
        }

        warn!("External unlock request rejected: lock screen is shown");
        if let Some(session) = self.session.as_mut() {
            if session.state() == LockState::Launching {
                session.mark_locked();
            }
        }
        self.publish_state();
        false
    }

    fn start_block_window(&mut self) {
        let secs = self.config.block_window_secs.max(1);
        info!("Password attempts exhausted; input blocked for {}s", secs);
        self.block_remaining_secs = Some(secs);
        self.arm_alarm(AlarmKind::BlockTick, BLOCK_TICK);
    }

    /// Per-second countdown of the block window
    pub(super) fn block_tick(&mut self) {
        let Some(remaining) = self.block_remaining_secs else {
            debug!("Block tick with no block window");
            return;
        };

        let remaining = remaining.saturating_sub(1);
        if remaining > 0 {
            self.block_remaining_secs = Some(remaining);
            debug!("Input block: {}s left", remaining);
            self.arm_alarm(AlarmKind::BlockTick, BLOCK_TICK);
            return;
        }

        self.end_block_window();
    }

    fn end_block_window(&mut self) {
        info!("Input block window elapsed");
        self.block_remaining_secs = None;
        self.attempts.end_block();
        self.publish_attempts();

        if !self.display_on {
            self.display_off(DisplayOffSource::Timeout);
            return;
        }

        // Reset the lock UI view
        if let Some(pid) = self.lock_process_id() {
            if self.launcher.is_running(pid) {
                if let Err(e) = self.launcher.restart(pid) {
                    warn!("Could not reset lock process {}: {}", pid, e);
                }
            }
        }
    }
}
