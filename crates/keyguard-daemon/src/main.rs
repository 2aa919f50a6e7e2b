//! Keyguard Daemon - Main entry point
//!
//! Loads the lock policy, binds the control socket and runs the orchestrator
//! on a dedicated dispatcher thread until SIGINT/SIGTERM.

use anyhow::{bail, Context};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyguard_daemon::ipc::IpcContext;
use keyguard_daemon::settings_store::read_policy;
use keyguard_daemon::{
    Argon2PasswordVerifier, Collaborators, CommandLauncher, DaemonConfig, Dispatcher, Event,
    EventBus, FileSettingsStore, IpcServer, Orchestrator, ReportedProximityLink,
    TokioAlarmScheduler,
};

/// How long shutdown waits for the dispatcher to finish its current event
const DISPATCH_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyguard_daemon=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting keyguard daemon v{}", env!("CARGO_PKG_VERSION"));

    // Load or create config
    let config_path = std::env::var("KEYGUARD_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| DaemonConfig::default_config_path());

    let config = if config_path.exists() {
        DaemonConfig::load(&config_path)
            .with_context(|| format!("Invalid config {:?}", config_path))?
    } else {
        let config = DaemonConfig::default();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        config.save(&config_path)?;
        info!("Created default config at {:?}", config_path);
        config
    };

    config.ensure_directories()?;

    // Settings store unreachable is fatal
    let settings = Arc::new(
        FileSettingsStore::open(&config.settings_path)
            .with_context(|| format!("Settings store {:?} unreachable", config.settings_path))?,
    );
    info!("Settings store at {:?}", settings.path());
    let (policy, device) =
        read_policy(settings.as_ref()).context("Failed to read lock policy")?;
    info!("Lock policy: {} (delay {}s)", policy.lock_type, policy.accessibility_lock_delay_seconds);

    let verifier = Argon2PasswordVerifier::new(config.password_hash_path.clone());
    if policy.strategy().password_required(true) && !verifier.is_set() {
        warn!(
            "Lock type {} needs a password but none is set at {:?}",
            policy.lock_type, config.password_hash_path
        );
    }

    let (bus, events) = EventBus::new();
    let link = ReportedProximityLink::new();

    // Event bus unreachable is fatal
    let ipc_server = Arc::new(
        IpcServer::bind(
            &config.ipc_socket_path,
            IpcContext {
                bus: bus.clone(),
                settings: settings.clone(),
                link: link.clone(),
            },
        )
        .await
        .context("Failed to bind control socket")?,
    );
    info!("Control socket at {:?}", ipc_server.socket_path());

    // Relay policy key changes onto the bus
    let relay_handle = {
        let mut changes = settings.subscribe();
        let bus = bus.clone();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        if bus.publish(Event::SettingChanged(change)).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Missed {} setting changes", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Settings relay stopped");
        })
    };

    let runtime = tokio::runtime::Handle::current();
    let collaborators = Collaborators {
        launcher: Box::new(CommandLauncher::new(
            config.lock_apps.clone(),
            bus.clone(),
            runtime.clone(),
        )),
        settings: settings.clone(),
        alarms: Box::new(TokioAlarmScheduler::new(bus.clone(), runtime)),
        proximity: Box::new(link),
        verifier: Box::new(verifier),
    };
    let mut orchestrator =
        Orchestrator::new(config.orchestrator_config(), policy, device, collaborators);

    // The orchestrator runs alone on its own thread so handlers are serialized
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut dispatcher_done = {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let dispatch_runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create dispatcher runtime")?;

        thread::Builder::new()
            .name("keyguard-dispatch".to_string())
            .spawn(move || {
                dispatch_runtime.block_on(async {
                    orchestrator.start();
                    Dispatcher::new(orchestrator, events).run(shutdown_rx).await;
                });
                let _ = done_tx.send(());
            })
            .context("Failed to start dispatcher thread")?;

        done_rx
    };

    let mut ipc_handle = {
        let ipc_server = Arc::clone(&ipc_server);
        tokio::spawn(async move {
            if let Err(e) = ipc_server.run().await {
                error!("IPC server error: {}", e);
            }
        })
    };

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    info!("Daemon started successfully");

    // Wait for shutdown signal
    let exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT");
            Exit::Signal
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
            Exit::Signal
        }
        _ = &mut dispatcher_done => Exit::DispatcherStopped,
        _ = &mut ipc_handle => Exit::IpcStopped,
    };

    info!("Daemon shutting down");

    let _ = shutdown_tx.send(true);
    if exit != Exit::DispatcherStopped
        && tokio::time::timeout(DISPATCH_SHUTDOWN_TIMEOUT, dispatcher_done)
            .await
            .is_err()
    {
        warn!("Dispatcher did not stop in time");
    }

    ipc_handle.abort();
    relay_handle.abort();
    if let Err(e) = ipc_server.cleanup() {
        warn!("Failed to remove control socket: {}", e);
    }

    match exit {
        Exit::Signal => Ok(()),
        Exit::DispatcherStopped => bail!("Dispatcher exited unexpectedly"),
        Exit::IpcStopped => bail!("IPC server exited unexpectedly"),
    }
}

/// Why the main loop ended
#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Signal,
    DispatcherStopped,
    IpcStopped,
}
