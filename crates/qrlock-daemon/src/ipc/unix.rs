//! Unix domain socket endpoints

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};

use crate::error::{DaemonError, Result};

/// Owner-only listening socket for the locker daemon
pub struct SocketListener {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl SocketListener {
    /// Bind at `path`, replacing a stale socket left by a previous run
    pub fn bind(path: &Path) -> Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)
            .map_err(|e| DaemonError::Ipc(format!("Failed to bind socket: {}", e)))?;

        // Owner only: requests carry passwords and plaintext
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;

        Ok(Self {
            listener,
            socket_path: path.to_path_buf(),
        })
    }

    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _) = self
            .listener
            .accept()
            .await
            .map_err(|e| DaemonError::Ipc(format!("Accept failed: {}", e)))?;
        Ok(stream)
    }

    /// Remove the socket file
    pub fn cleanup(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        Ok(())
    }
}

/// Connect to the daemon, reporting a missing or dead socket as
/// "Daemon not running"
pub async fn connect(path: &Path) -> Result<UnixStream> {
    UnixStream::connect(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound
            || e.kind() == std::io::ErrorKind::ConnectionRefused
        {
            DaemonError::Ipc("Daemon not running".to_string())
        } else {
            DaemonError::Ipc(format!("Failed to connect: {}", e))
        }
    })
}
