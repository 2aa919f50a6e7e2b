//! Keyguard Daemon - Lock screen orchestration daemon
//!
//! This crate provides:
//! - The event type and the single-threaded dispatcher that serializes all inputs
//! - The lock orchestrator state machine
//! - Collaborator traits (process launcher, settings store, alarms, proximity link,
//!   password verifier) and their production implementations
//! - IPC server for the lock UI, the settings UI and `keyguardctl`

pub mod adapters;
pub mod alarms;
pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod ipc;
pub mod launcher;
pub mod orchestrator;
pub mod proximity;
pub mod settings_store;
pub mod verifier;

pub use adapters::{
    AlarmScheduler, Collaborators, LaunchError, LaunchParams, PasswordVerifier, ProcessLauncher,
    ProximityLink, SettingsStore,
};
pub use alarms::TokioAlarmScheduler;
pub use bus::{Dispatcher, EventBus};
pub use config::{AppCommand, DaemonConfig};
pub use error::{DaemonError, Result};
pub use event::{AttemptReply, CoverState, DisplayOffSource, Event, OrchestratorSnapshot};
pub use ipc::IpcServer;
pub use launcher::CommandLauncher;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use proximity::ReportedProximityLink;
pub use settings_store::FileSettingsStore;
pub use verifier::Argon2PasswordVerifier;
