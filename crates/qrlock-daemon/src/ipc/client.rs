//! IPC client implementation

use std::path::PathBuf;
use tokio::io::BufReader;

use crate::error::{DaemonError, Result};

use super::framing::{read_frame, write_frame, Frame, MAX_RESPONSE_BYTES};
use super::types::{IpcRequest, IpcResponse};
use super::unix::connect;

/// IPC client for CLI use
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Send a request and get a response
    pub async fn request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let stream = connect(&self.socket_path).await?;
        let (reader, mut writer) = stream.into_split();

        write_frame(&mut writer, request).await?;

        match read_frame(&mut BufReader::new(reader), MAX_RESPONSE_BYTES).await? {
            Frame::Line(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Frame::Closed => Err(DaemonError::Ipc("Daemon closed the connection".to_string())),
            Frame::Oversized => Err(DaemonError::Ipc(format!(
                "Response exceeds {} bytes",
                MAX_RESPONSE_BYTES
            ))),
        }
    }

    /// Check if daemon is running
    pub async fn ping(&self) -> bool {
        matches!(
            self.request(&IpcRequest::Ping).await,
            Ok(IpcResponse::Pong { .. })
        )
    }
}
