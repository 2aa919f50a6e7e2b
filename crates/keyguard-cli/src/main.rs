//! keyguardctl - Command-line control for the keyguard daemon
//!
//! Relays platform signals, drives password attempts and unlock requests,
//! edits policy settings and manages the lock password hash.

mod client;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::BufRead;
use std::path::PathBuf;
use zeroize::Zeroizing;

use keyguard_core::{ProximityKind, VerifyOutcome};
use keyguard_daemon::ipc::BusSignal;
use keyguard_daemon::verifier::store_password;
use keyguard_daemon::{CoverState, DaemonConfig, DisplayOffSource, OrchestratorSnapshot};

use client::KeyguardClient;

#[derive(Parser)]
#[command(name = "keyguardctl")]
#[command(about = "Control the keyguard lock screen daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Daemon control socket
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Daemon config file (for set-password)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the lock state
    Status,

    /// Report the display turning on
    DisplayOn,

    /// Report the display turning off
    DisplayOff {
        #[arg(long, value_enum, default_value_t = Source::PowerButton)]
        source: Source,
    },

    /// Report the cover state
    Cover {
        #[arg(value_enum)]
        state: Cover,
    },

    /// Report a paired device proximity alert
    Proximity {
        #[arg(value_enum)]
        kind: Range,

        /// Signal strength in dBm
        #[arg(long, allow_hyphen_values = true)]
        strength: Option<i32>,
    },

    /// Report the call state
    Call {
        #[arg(value_enum)]
        state: Call,
    },

    /// Try a password as the lock UI would
    Verify { password: String },

    /// Request an out-of-band unlock
    Unlock,

    /// Write a policy setting
    Set { key: String, value: String },

    /// Set the lock password (read from stdin)
    SetPassword,
}

#[derive(Clone, Copy, ValueEnum)]
enum Source {
    PowerButton,
    Timeout,
    Proximity,
    Event,
}

impl From<Source> for DisplayOffSource {
    fn from(source: Source) -> Self {
        match source {
            Source::PowerButton => DisplayOffSource::PowerButton,
            Source::Timeout => DisplayOffSource::Timeout,
            Source::Proximity => DisplayOffSource::Proximity,
            Source::Event => DisplayOffSource::Event,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Cover {
    Open,
    Closed,
}

#[derive(Clone, Copy, ValueEnum)]
enum Range {
    InRange,
    OutOfRange,
}

#[derive(Clone, Copy, ValueEnum)]
enum Call {
    Active,
    Idle,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = match cli.socket {
        Some(path) => KeyguardClient::with_socket_path(path),
        None => KeyguardClient::new(),
    };

    match cli.command {
        Commands::SetPassword => set_password(cli.config)?,
        Commands::Status => {
            let version = client.ping().await?;
            let snapshot = client.status().await?;
            print_status(&version, &snapshot);
        }
        Commands::DisplayOn => client.publish(BusSignal::DisplayOn).await?,
        Commands::DisplayOff { source } => {
            client
                .publish(BusSignal::DisplayOff {
                    source: source.into(),
                })
                .await?
        }
        Commands::Cover { state } => {
            let state = match state {
                Cover::Open => CoverState::Open,
                Cover::Closed => CoverState::Closed,
            };
            client.publish(BusSignal::Cover { state }).await?
        }
        Commands::Proximity { kind, strength } => {
            let kind = match kind {
                Range::InRange => ProximityKind::InRange,
                Range::OutOfRange => ProximityKind::OutOfRange,
            };
            client
                .publish(BusSignal::ProximityAlert { kind, strength })
                .await?
        }
        Commands::Call { state } => {
            client
                .publish(BusSignal::CallState {
                    active: matches!(state, Call::Active),
                })
                .await?
        }
        Commands::Verify { password } => {
            let result = client.verify_password(password).await?;
            match result.outcome {
                VerifyOutcome::Correct => println!("✓ Password accepted"),
                VerifyOutcome::Incorrect => println!(
                    "✗ Incorrect password ({} attempts left)",
                    result.remaining_attempts
                ),
                VerifyOutcome::InputBlock => println!(
                    "✗ Input blocked for {}s",
                    result.block_remaining_secs.unwrap_or(0)
                ),
                VerifyOutcome::Empty => println!("✗ Password too short"),
                VerifyOutcome::TooLong => println!("✗ Password too long"),
            }
        }
        Commands::Unlock => {
            if client.unlock().await? {
                println!("✓ Unlocked");
            } else {
                bail!("Unlock refused: lock screen is shown");
            }
        }
        Commands::Set { key, value } => {
            client.set_setting(key.clone(), value.clone()).await?;
            println!("✓ {} = {}", key, value);
        }
    }

    Ok(())
}

fn print_status(version: &str, snapshot: &OrchestratorSnapshot) {
    println!("Keyguard daemon v{}", version);
    println!("  State: {}", snapshot.state);
    println!("  Lock type: {}", snapshot.lock_type);
    if let Some(pid) = snapshot.lock_process_id {
        println!("  Lock process: {}", pid);
    }
    if let Some(variant) = snapshot.variant {
        println!("  Variant: {}", variant.as_str());
    }
    if let Some(started_at) = snapshot.started_at {
        println!("  Since: {}", started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("  Password required: {}", snapshot.requires_password);
    println!(
        "  Attempts left: {}",
        snapshot.attempts.remaining_attempts
    );
    if let Some(secs) = snapshot.block_remaining_secs {
        println!("  Input blocked: {}s left", secs);
    }
    if let Some(alarm) = snapshot.idle_alarm {
        println!("  Idle lock at: {}", alarm.fire_at.format("%H:%M:%S UTC"));
    }
    println!(
        "  Display: {}  Cover: {}  Call: {}",
        if snapshot.display_on { "on" } else { "off" },
        if snapshot.cover_closed { "closed" } else { "open" },
        if snapshot.call_active { "active" } else { "idle" },
    );
    if !snapshot.security.paired_device_id.is_empty() {
        println!(
            "  Paired device: {} (out of range <= {} dBm, in range >= {} dBm)",
            snapshot.security.paired_device_id,
            snapshot.security.out_of_range_dbm,
            snapshot.security.in_range_dbm
        );
    }
}

fn set_password(config_path: Option<PathBuf>) -> Result<()> {
    let config_path = config_path
        .or_else(|| std::env::var_os("KEYGUARD_CONFIG").map(PathBuf::from))
        .unwrap_or_else(DaemonConfig::default_config_path);

    let config = if config_path.exists() {
        DaemonConfig::load(&config_path)
            .with_context(|| format!("Invalid config {:?}", config_path))?
    } else {
        DaemonConfig::default()
    };

    eprintln!("New password (4-16 characters):");
    let mut line = Zeroizing::new(String::new());
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    let password = line.trim_end_matches(['\r', '\n']);

    store_password(&config.password_hash_path, password)?;
    println!("✓ Password hash written to {}", config.password_hash_path.display());
    Ok(())
}
