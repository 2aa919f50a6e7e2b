//! Client for the keyguard daemon

use std::path::PathBuf;

use keyguard_core::VerifyOutcome;
use keyguard_daemon::error::DaemonError;
use keyguard_daemon::ipc::{BusSignal, IpcClient, IpcRequest, IpcResponse};
use keyguard_daemon::{DaemonConfig, OrchestratorSnapshot};

/// Client for the keyguard daemon
pub struct KeyguardClient {
    inner: IpcClient,
}

/// Error type for client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Unexpected response from daemon")]
    UnexpectedResponse,

    #[error("Daemon error: {0}")]
    DaemonError(String),
}

impl From<DaemonError> for ClientError {
    fn from(e: DaemonError) -> Self {
        match e {
            DaemonError::NotRunning => ClientError::DaemonNotRunning,
            e => ClientError::DaemonError(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Result of a password attempt
#[derive(Debug, Clone, Copy)]
pub struct AttemptResult {
    pub outcome: VerifyOutcome,
    pub remaining_attempts: u32,
    pub block_remaining_secs: Option<u32>,
}

impl KeyguardClient {
    /// Client for the default socket path
    pub fn new() -> Self {
        Self::with_socket_path(DaemonConfig::default_ipc_path())
    }

    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            inner: IpcClient::new(socket_path),
        }
    }

    async fn request(&self, request: IpcRequest) -> Result<IpcResponse> {
        match self.inner.request(&request).await? {
            IpcResponse::Error { message } => Err(ClientError::RequestFailed(message)),
            response => Ok(response),
        }
    }

    async fn expect_ok(&self, request: IpcRequest) -> Result<()> {
        match self.request(request).await? {
            IpcResponse::Ok => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Daemon version
    pub async fn ping(&self) -> Result<String> {
        match self.request(IpcRequest::Ping).await? {
            IpcResponse::Pong { version } => Ok(version),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub async fn status(&self) -> Result<OrchestratorSnapshot> {
        match self.request(IpcRequest::Status).await? {
            IpcResponse::Status { snapshot } => Ok(snapshot),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Relay a platform signal
    pub async fn publish(&self, signal: BusSignal) -> Result<()> {
        self.expect_ok(IpcRequest::Publish { signal }).await
    }

    pub async fn verify_password(&self, password: String) -> Result<AttemptResult> {
        match self.request(IpcRequest::VerifyPassword { password }).await? {
            IpcResponse::Attempt {
                outcome,
                remaining_attempts,
                block_remaining_secs,
            } => Ok(AttemptResult {
                outcome,
                remaining_attempts,
                block_remaining_secs,
            }),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Ask for an out-of-band unlock; `false` if refused
    pub async fn unlock(&self) -> Result<bool> {
        match self.request(IpcRequest::UnlockRequest).await? {
            IpcResponse::Unlock { granted } => Ok(granted),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub async fn set_setting(&self, key: String, value: String) -> Result<()> {
        self.expect_ok(IpcRequest::SetSetting { key, value }).await
    }
}

impl Default for KeyguardClient {
    fn default() -> Self {
        Self::new()
    }
}
