//! Line-delimited JSON framing shared by the server and the client

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DaemonError, Result};

/// Longest accepted frame, newline included
pub const MAX_FRAME_LEN: u64 = 64 * 1024;

#[async_trait]
pub trait FrameWriter {
    /// Write `message` as one JSON line and flush
    async fn write_frame<T>(&mut self, message: &T) -> Result<()>
    where
        T: Serialize + Sync;
}

#[async_trait]
impl<W> FrameWriter for W
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_frame<T>(&mut self, message: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let mut json = serde_json::to_vec(message)?;
        json.push(b'\n');
        self.write_all(&json).await?;
        self.flush().await?;
        Ok(())
    }
}

#[async_trait]
pub trait FrameReader {
    /// Next non-empty line, or `None` once the peer hung up
    async fn next_frame(&mut self) -> Result<Option<String>>;
}

#[async_trait]
impl<R> FrameReader for R
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_frame(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = (&mut *self).take(MAX_FRAME_LEN).read_line(&mut line).await?;
            if read == 0 {
                return Ok(None);
            }
            if !line.ends_with('\n') && read as u64 >= MAX_FRAME_LEN {
                return Err(DaemonError::Ipc(format!(
                    "Frame exceeds {} bytes",
                    MAX_FRAME_LEN
                )));
            }
            let frame = line.trim();
            if !frame.is_empty() {
                return Ok(Some(frame.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::IpcRequest;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_frames_skip_blank_lines() {
        let input: &[u8] = b"\n  \n{\"type\":\"ping\"}\n";
        let mut reader = BufReader::new(input);

        let frame = reader.next_frame().await.unwrap().unwrap();
        let request: IpcRequest = serde_json::from_str(&frame).unwrap();
        assert!(matches!(request, IpcRequest::Ping));
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let input = vec![b'x'; MAX_FRAME_LEN as usize + 10];
        let mut reader = BufReader::new(input.as_slice());

        assert!(matches!(reader.next_frame().await, Err(DaemonError::Ipc(_))));
    }

    #[tokio::test]
    async fn test_written_frame_is_one_line() {
        let mut out = Vec::new();
        out.write_frame(&IpcRequest::Status).await.unwrap();

        assert_eq!(out.iter().filter(|b| **b == b'\n').count(), 1);
        assert!(out.ends_with(b"\n"));
    }
}
