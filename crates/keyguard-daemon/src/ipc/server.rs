//! IPC server

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use keyguard_core::{Pid, SettingKey};

use crate::adapters::SettingsStore;
use crate::bus::EventBus;
use crate::error::Result;
use crate::event::{Event, PasswordCandidate, Reply};
use crate::proximity::ReportedProximityLink;

use super::framing::{FrameReader, FrameWriter};
use super::socket::ControlSocket;
use super::types::{IpcRequest, IpcResponse};

/// What request handlers can reach
#[derive(Clone)]
pub struct IpcContext {
    pub bus: EventBus,
    pub settings: Arc<dyn SettingsStore>,
    pub link: ReportedProximityLink,
}

/// IPC server
pub struct IpcServer {
    socket: ControlSocket,
    ctx: IpcContext,
}

impl IpcServer {
    /// Bind the control socket
    ///
    /// Binding is separate from [`run`](Self::run) so a socket that cannot
    /// be bound fails daemon startup.
    pub async fn bind(socket_path: &Path, ctx: IpcContext) -> Result<Self> {
        let socket = ControlSocket::bind(socket_path).await?;
        Ok(Self { socket, ctx })
    }

    pub fn socket_path(&self) -> &Path {
        self.socket.path()
    }

    /// Accept connections until the task is dropped
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.socket.accept().await {
                Ok(stream) => {
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, ctx).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }

    /// Remove the socket file
    pub fn cleanup(&self) -> Result<()> {
        self.socket.cleanup()
    }
}

/// Serve requests on one connection until the peer hangs up
async fn handle_connection(stream: UnixStream, ctx: IpcContext) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    while let Some(frame) = reader.next_frame().await? {
        let response = match serde_json::from_str::<IpcRequest>(&frame) {
            Ok(request) => {
                match &request {
                    IpcRequest::VerifyPassword { .. } => {
                        debug!("Received IPC request: VerifyPassword")
                    }
                    other => debug!("Received IPC request: {:?}", other),
                }
                handle_request(request, &ctx).await
            }
            Err(e) => IpcResponse::Error {
                message: format!("Invalid request: {}", e),
            },
        };

        writer.write_frame(&response).await?;
    }

    Ok(())
}

/// Handle a single request
async fn handle_request(request: IpcRequest, ctx: &IpcContext) -> IpcResponse {
    match request {
        IpcRequest::Ping => IpcResponse::Pong {
            version: env!("CARGO_PKG_VERSION").to_string(),
        },

        IpcRequest::Status => {
            let (reply, rx) = Reply::channel();
            ask(ctx, Event::Snapshot { reply }, rx, |snapshot| IpcResponse::Status {
                snapshot,
            })
            .await
        }

        IpcRequest::Publish { signal } => publish(ctx, signal.into_event()),

        IpcRequest::VerifyPassword { password } => {
            let (reply, rx) = Reply::channel();
            let event = Event::PasswordAttempt {
                candidate: PasswordCandidate::new(password),
                reply,
            };
            ask(ctx, event, rx, |answer| IpcResponse::Attempt {
                outcome: answer.outcome,
                remaining_attempts: answer.remaining_attempts,
                block_remaining_secs: answer.block_remaining_secs,
            })
            .await
        }

        IpcRequest::PasswordVerified => publish(ctx, Event::PasswordVerified),

        IpcRequest::UnlockRequest => {
            let (reply, rx) = Reply::channel();
            ask(ctx, Event::ExternalUnlockRequest { reply }, rx, |granted| {
                IpcResponse::Unlock { granted }
            })
            .await
        }

        IpcRequest::SetSetting { key, value } => {
            let key = match SettingKey::from_str(&key) {
                Ok(key) => key,
                Err(e) => return error_response(e),
            };
            if key.is_published() {
                return IpcResponse::Error {
                    message: format!("{} is published by keyguard and cannot be set", key),
                };
            }
            let value = match key.parse_value(&value) {
                Ok(value) => value,
                Err(e) => return error_response(e),
            };

            // The store broadcasts the change; the daemon relays it to the bus
            match ctx.settings.set(key, value) {
                Ok(()) => IpcResponse::Ok,
                Err(e) => error_response(e),
            }
        }

        IpcRequest::ProximityLinkReport {
            connected,
            strength,
        } => {
            // The link must hold the report before the orchestrator polls it
            ctx.link.report(connected, strength);
            if !ctx.link.is_enabled() {
                debug!("Proximity monitoring off; link report stored only");
                return IpcResponse::Ok;
            }
            publish(ctx, Event::ProximityLinkChanged { connected })
        }

        IpcRequest::LockProcessExited { pid } => publish(ctx, Event::ProcessExited(Pid(pid))),
    }
}

fn publish(ctx: &IpcContext, event: Event) -> IpcResponse {
    match ctx.bus.publish(event) {
        Ok(()) => IpcResponse::Ok,
        Err(e) => error_response(e),
    }
}

/// Publish an event and wait for the orchestrator's answer
async fn ask<T, F>(ctx: &IpcContext, event: Event, rx: oneshot::Receiver<T>, respond: F) -> IpcResponse
where
    F: FnOnce(T) -> IpcResponse,
{
    if let Err(e) = ctx.bus.publish(event) {
        return error_response(e);
    }
    match rx.await {
        Ok(answer) => respond(answer),
        Err(_) => IpcResponse::Error {
            message: "Orchestrator did not answer".to_string(),
        },
    }
}

fn error_response(e: impl std::fmt::Display) -> IpcResponse {
    IpcResponse::Error {
        message: e.to_string(),
    }
}
