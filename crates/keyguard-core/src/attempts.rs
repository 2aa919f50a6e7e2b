//! Password attempt accounting
//!
//! Counts attempts against the lock password and decides when input is
//! blocked:
//!
//! - Candidates shorter than [`MIN_PASSWORD_LENGTH`] or longer than
//!   [`MAX_PASSWORD_LENGTH`] are rejected without consuming an attempt
//! - Each wrong password consumes one attempt
//! - When the last attempt is consumed the tracker reports an input block and
//!   resets its counters; the block itself is timed by the caller
//!
//! The block is held in memory only. Restarting the daemon clears it.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{MAX_ATTEMPTS, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH};

/// Result of a password verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyOutcome {
    Correct,
    Incorrect,
    /// Attempts exhausted, or a block window is in progress
    InputBlock,
    /// Too short to be a password
    Empty,
    TooLong,
}

/// Attempt counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordAttemptState {
    pub current_attempt: u32,
    pub remaining_attempts: u32,
    pub incorrect_count: u32,
    pub block_active: bool,
}

impl PasswordAttemptState {
    fn fresh(max_attempts: u32) -> Self {
        Self {
            current_attempt: 0,
            remaining_attempts: max_attempts,
            incorrect_count: 0,
            block_active: false,
        }
    }
}

/// Tracks password attempts for the active lock screen
#[derive(Debug, Clone)]
pub struct PasswordAttemptTracker {
    state: PasswordAttemptState,
    max_attempts: u32,
}

impl Default for PasswordAttemptTracker {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS)
    }
}

impl PasswordAttemptTracker {
    /// Create a tracker allowing `max_attempts` wrong passwords per round
    pub fn new(max_attempts: u32) -> Self {
        let max_attempts = max_attempts.max(1);
        Self {
            state: PasswordAttemptState::fresh(max_attempts),
            max_attempts,
        }
    }

    pub fn state(&self) -> PasswordAttemptState {
        self.state
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.state.remaining_attempts
    }

    pub fn is_blocked(&self) -> bool {
        self.state.block_active
    }

    /// Check a candidate's length without touching the counters
    pub fn validate_length(candidate: &str) -> Result<()> {
        let len = candidate.chars().count();
        if len < MIN_PASSWORD_LENGTH {
            return Err(Error::InvalidPasswordInput(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        if len > MAX_PASSWORD_LENGTH {
            return Err(Error::InvalidPasswordInput(format!(
                "password must be at most {} characters",
                MAX_PASSWORD_LENGTH
            )));
        }
        Ok(())
    }

    /// Verify a candidate using `matches` as the password oracle
    ///
    /// `matches` is not called while a block is active or when the length is
    /// out of range.
    pub fn verify<F>(&mut self, candidate: &str, matches: F) -> VerifyOutcome
    where
        F: FnOnce(&str) -> bool,
    {
        if self.state.block_active {
            return VerifyOutcome::InputBlock;
        }

        let len = candidate.chars().count();
        if len < MIN_PASSWORD_LENGTH {
            return VerifyOutcome::Empty;
        }
        if len > MAX_PASSWORD_LENGTH {
            return VerifyOutcome::TooLong;
        }

        self.state.current_attempt += 1;

        if matches(candidate) {
            self.reset();
            return VerifyOutcome::Correct;
        }

        self.state.incorrect_count += 1;
        self.state.remaining_attempts = self.state.remaining_attempts.saturating_sub(1);

        if self.state.remaining_attempts == 0 {
            self.state = PasswordAttemptState::fresh(self.max_attempts);
            self.state.block_active = true;
            return VerifyOutcome::InputBlock;
        }

        VerifyOutcome::Incorrect
    }

    /// Block window elapsed
    pub fn end_block(&mut self) {
        self.state.block_active = false;
    }

    /// Reset all counters (policy recreated or password verified)
    pub fn reset(&mut self) {
        self.state = PasswordAttemptState::fresh(self.max_attempts);
    }
}
