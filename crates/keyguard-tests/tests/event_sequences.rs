//! Property tests over arbitrary event sequences

mod support;

use proptest::prelude::*;

use keyguard_core::{
    AlarmKind, LockPolicy, LockState, LockType, ProximityKind, SettingChange, MAX_ATTEMPTS,
};
use keyguard_daemon::{CoverState, DisplayOffSource, Event};

use support::{Harness, PASSWORD};

#[derive(Debug, Clone)]
enum Step {
    DisplayOff(DisplayOffSource),
    DisplayOn,
    Cover(CoverState),
    Call(bool),
    Proximity(ProximityKind),
    /// The current lock process exits
    Exit,
    /// The current lock process dies without a notification
    Crash,
    WrongPassword,
    RightPassword,
    Unlock,
    Fire(AlarmKind),
    SwitchTo(LockType),
}

fn lock_type() -> impl Strategy<Value = LockType> {
    prop::sample::select(LockType::ALL.to_vec())
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => prop::sample::select(vec![
            DisplayOffSource::PowerButton,
            DisplayOffSource::Timeout,
            DisplayOffSource::Proximity,
            DisplayOffSource::Event,
        ])
        .prop_map(Step::DisplayOff),
        2 => Just(Step::DisplayOn),
        1 => prop::bool::ANY
            .prop_map(|closed| Step::Cover(if closed { CoverState::Closed } else { CoverState::Open })),
        1 => prop::bool::ANY.prop_map(Step::Call),
        1 => prop::bool::ANY.prop_map(|near| {
            Step::Proximity(if near { ProximityKind::InRange } else { ProximityKind::OutOfRange })
        }),
        2 => Just(Step::Exit),
        1 => Just(Step::Crash),
        3 => Just(Step::WrongPassword),
        1 => Just(Step::RightPassword),
        1 => Just(Step::Unlock),
        3 => prop::sample::select(vec![
            AlarmKind::IdleLock,
            AlarmKind::BlockTick,
            AlarmKind::RecoveryRelaunch,
        ])
            .prop_map(Step::Fire),
        1 => lock_type().prop_map(Step::SwitchTo),
    ]
}

fn apply(h: &mut Harness, step: Step) {
    match step {
        Step::DisplayOff(source) => h.handle(Event::DisplayOff(source)),
        Step::DisplayOn => h.handle(Event::DisplayOn),
        Step::Cover(state) => h.handle(Event::CoverChanged(state)),
        Step::Call(active) => h.handle(Event::CallStateChanged { active }),
        Step::Proximity(kind) => h.handle(Event::ProximityAlert {
            kind,
            strength: None,
        }),
        Step::Exit => {
            if let Some(pid) = h.pid() {
                h.exit(pid);
            }
        }
        Step::Crash => {
            if let Some(pid) = h.pid() {
                h.launcher.kill(pid);
            }
        }
        Step::WrongPassword => {
            h.attempt("0000");
        }
        Step::RightPassword => {
            h.attempt(PASSWORD);
        }
        Step::Unlock => {
            h.unlock_request();
        }
        Step::Fire(kind) => {
            h.fire(kind);
        }
        Step::SwitchTo(lock_type) => {
            h.handle(Event::SettingChanged(SettingChange::LockType(lock_type)))
        }
    }
}

proptest! {
    /// A lock process id is tracked exactly while not unlocked, and never
    /// more than one lock process runs
    #[test]
    fn prop_session_invariants(
        initial in lock_type(),
        delay in prop::sample::select(vec![0u32, 5]),
        steps in prop::collection::vec(step(), 0..60),
    ) {
        let mut h = Harness::with_policy(LockPolicy {
            lock_type: initial,
            accessibility_lock_delay_seconds: delay,
            ..LockPolicy::default()
        });

        for step in steps {
            apply(&mut h, step);

            let state = h.state();
            prop_assert_eq!(state != LockState::Unlocked, h.pid().is_some());
            prop_assert!(h.launcher.running().len() <= 1);

            let attempts = h.orchestrator.attempts().state();
            prop_assert!(attempts.remaining_attempts <= MAX_ATTEMPTS);

            if !h.orchestrator.security().is_active() {
                prop_assert!(h.orchestrator.security().requires_password());
            }
        }
    }

    /// Two timeout display-offs in a row leave the same state as one
    #[test]
    fn prop_display_off_idempotent(
        lock_type in lock_type(),
        prefix in prop::collection::vec(step(), 0..20),
    ) {
        let mut h = Harness::new(lock_type);
        for step in prefix {
            apply(&mut h, step);
        }

        h.handle(Event::DisplayOff(DisplayOffSource::Timeout));
        let state = h.state();
        let pid = h.pid();
        let launches = h.launcher.launches().len();

        h.handle(Event::DisplayOff(DisplayOffSource::Timeout));

        prop_assert_eq!(h.state(), state);
        prop_assert_eq!(h.pid(), pid);
        prop_assert_eq!(h.launcher.launches().len(), launches);
    }
}
