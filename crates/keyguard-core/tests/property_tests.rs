//! Property-based tests for keyguard-core using proptest
//!
//! These tests verify invariants that should hold for all input sequences.

use chrono::Utc;
use proptest::prelude::*;
use keyguard_core::{
    AlarmKind, AlarmTracker, AutoLockSecurity, PairedDevice, PasswordAttemptTracker,
    ProximityKind, VerifyOutcome, MAX_ATTEMPTS,
};

// ============================================
// Strategies
// ============================================

#[derive(Debug, Clone)]
enum Attempt {
    Right,
    Wrong,
    Short,
    Long,
    EndBlock,
}

fn arb_attempt() -> impl Strategy<Value = Attempt> {
    prop_oneof![
        1 => Just(Attempt::Right),
        4 => Just(Attempt::Wrong),
        1 => Just(Attempt::Short),
        1 => Just(Attempt::Long),
        1 => Just(Attempt::EndBlock),
    ]
}

#[derive(Debug, Clone)]
enum Radio {
    Alert(bool),
    Strength(i32),
    Activate,
    Deactivate,
}

fn arb_radio() -> impl Strategy<Value = Radio> {
    prop_oneof![
        any::<bool>().prop_map(Radio::Alert),
        (-120i32..0).prop_map(Radio::Strength),
        Just(Radio::Activate),
        Just(Radio::Deactivate),
    ]
}

// ============================================
// Password attempts
// ============================================

proptest! {
    #[test]
    fn remaining_attempts_stay_bounded(attempts in prop::collection::vec(arb_attempt(), 0..64)) {
        let mut tracker = PasswordAttemptTracker::default();

        for attempt in attempts {
            let before = tracker.remaining_attempts();
            let blocked = tracker.is_blocked();

            let outcome = match attempt {
                Attempt::Right => tracker.verify("correct-horse", |_| true),
                Attempt::Wrong => tracker.verify("battery-staple", |_| false),
                Attempt::Short => tracker.verify("abc", |_| true),
                Attempt::Long => tracker.verify("a-very-long-password-indeed", |_| true),
                Attempt::EndBlock => {
                    tracker.end_block();
                    continue;
                }
            };

            let after = tracker.remaining_attempts();
            prop_assert!(after <= MAX_ATTEMPTS);

            match outcome {
                VerifyOutcome::Incorrect => prop_assert_eq!(after, before - 1),
                VerifyOutcome::InputBlock => {
                    prop_assert_eq!(after, MAX_ATTEMPTS);
                    prop_assert!(tracker.is_blocked());
                }
                VerifyOutcome::Correct => prop_assert_eq!(after, MAX_ATTEMPTS),
                VerifyOutcome::Empty | VerifyOutcome::TooLong => {
                    prop_assert!(!blocked);
                    prop_assert_eq!(after, before);
                }
            }
        }
    }

    #[test]
    fn input_is_rejected_while_blocked(wrongs in 5usize..20) {
        let mut tracker = PasswordAttemptTracker::default();
        for _ in 0..MAX_ATTEMPTS {
            tracker.verify("wrong-guess", |_| false);
        }
        prop_assert!(tracker.is_blocked());

        for _ in 0..wrongs {
            prop_assert_eq!(tracker.verify("correct-horse", |_| true), VerifyOutcome::InputBlock);
        }
    }
}

// ============================================
// Auto-lock security
// ============================================

proptest! {
    #[test]
    fn inactive_monitor_always_requires_password(events in prop::collection::vec(arb_radio(), 0..64)) {
        let mut security = AutoLockSecurity::new(PairedDevice {
            id: "watch".to_string(),
            out_of_range_dbm: -80,
            in_range_dbm: -60,
        });

        for event in events {
            match event {
                Radio::Alert(in_range) => {
                    let kind = if in_range { ProximityKind::InRange } else { ProximityKind::OutOfRange };
                    security.on_alert(kind);
                }
                Radio::Strength(dbm) => {
                    security.on_strength(dbm);
                }
                Radio::Activate => {
                    security.activate();
                }
                Radio::Deactivate => security.deactivate(),
            }

            if !security.is_active() {
                prop_assert!(security.requires_password());
            }
        }
    }
}

// ============================================
// Alarm generations
// ============================================

proptest! {
    #[test]
    fn only_latest_generation_is_accepted(rearms in 1usize..16) {
        let mut tracker = AlarmTracker::new();
        let mut fired = Vec::new();

        for _ in 0..rearms {
            let (alarm, _) = tracker.arm(AlarmKind::IdleLock, Utc::now());
            fired.push(alarm);
        }

        let latest = fired.pop().unwrap();
        for stale in fired {
            prop_assert!(tracker.accept(stale).is_err());
        }
        prop_assert!(tracker.accept(latest).is_ok());
    }
}
