//! IPC client

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::BufReader;

use crate::error::{DaemonError, Result};

use super::framing::{FrameReader, FrameWriter};
use super::socket;
use super::types::{IpcRequest, IpcResponse};

/// Default wait for a response
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One request per connection
pub struct IpcClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl IpcClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a request and wait for its response
    pub async fn request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| {
                DaemonError::Ipc(format!("No response within {}ms", self.timeout.as_millis()))
            })?
    }

    async fn exchange(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let stream = socket::connect(&self.socket_path).await?;
        let (reader, mut writer) = stream.into_split();

        writer.write_frame(request).await?;

        let mut reader = BufReader::new(reader);
        match reader.next_frame().await? {
            Some(frame) => Ok(serde_json::from_str(&frame)?),
            None => Err(DaemonError::Ipc(
                "Connection closed without a response".to_string(),
            )),
        }
    }

    /// Whether the daemon answers
    pub async fn ping(&self) -> bool {
        matches!(
            self.request(&IpcRequest::Ping).await,
            Ok(IpcResponse::Pong { .. })
        )
    }
}
