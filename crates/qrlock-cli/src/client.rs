//! Backends the CLI can talk to: the daemon over IPC, or an in-process
//! service for `--local` runs

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;
use tracing::debug;

use qrlock_daemon::error::DaemonError;
use qrlock_daemon::ipc::{IpcClient, IpcRequest, IpcResponse};
use qrlock_daemon::service::{Decrypted, Encrypted, StatusReport};
use qrlock_daemon::{
    DaemonConfig, EphemeralStore, LockerService, Reply, ServiceSettings, SystemClock,
};

/// Error type for client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Daemon not running")]
    DaemonNotRunning,

    /// The service refused the request
    #[error("{message} ({status})")]
    Rejected { status: u16, message: String },

    #[error("Unexpected response from daemon")]
    UnexpectedResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Daemon error: {0}")]
    DaemonError(String),
}

impl ClientError {
    fn from_daemon_error(e: DaemonError) -> Self {
        match &e {
            DaemonError::Ipc(msg) if msg.contains("not running") => ClientError::DaemonNotRunning,
            _ => ClientError::DaemonError(e.to_string()),
        }
    }

    /// Status code for a refused request
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// A result together with the session token to present next time
#[derive(Debug, Clone)]
pub struct Session<T> {
    pub token: Option<String>,
    pub value: T,
}

/// Operations common to both backends
#[async_trait]
pub trait Locker: Send + Sync {
    async fn encrypt(
        &self,
        session: Option<&str>,
        message: &str,
        password: &str,
    ) -> Result<Session<Encrypted>>;

    async fn decrypt_image(
        &self,
        session: Option<&str>,
        image: &[u8],
        password: &str,
    ) -> Result<Session<Decrypted>>;

    async fn decrypt_bundle(
        &self,
        session: Option<&str>,
        encrypted_data: &Value,
        password: &str,
    ) -> Result<Session<Decrypted>>;

    async fn status(&self, session: Option<&str>) -> Result<Session<StatusReport>>;

    async fn clear(&self, session: Option<&str>) -> Result<()>;
}

// ============================================
// Daemon backend
// ============================================

/// Client for the QR Locker daemon
pub struct LockerClient {
    inner: IpcClient,
}

impl LockerClient {
    /// Create a new client with the default socket path
    pub fn new() -> Self {
        Self::with_socket_path(DaemonConfig::default_ipc_path())
    }

    /// Create a new client with a custom socket path
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            inner: IpcClient::new(socket_path),
        }
    }

    /// Check if the daemon is running; returns its version
    pub async fn ping(&self) -> Result<String> {
        match self.send(IpcRequest::Ping).await? {
            IpcResponse::Pong { version } => Ok(version),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    async fn send(&self, request: IpcRequest) -> Result<IpcResponse> {
        match self.inner.request(&request).await {
            Ok(IpcResponse::Error {
                status, message, ..
            }) => Err(ClientError::Rejected { status, message }),
            Ok(response) => Ok(response),
            Err(e) => Err(ClientError::from_daemon_error(e)),
        }
    }

    async fn decrypt(&self, request: IpcRequest) -> Result<Session<Decrypted>> {
        match self.send(request).await? {
            IpcResponse::Decrypted {
                session,
                message,
                session_info,
            } => Ok(Session {
                token: session,
                value: Decrypted {
                    message,
                    session_info,
                },
            }),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }
}

impl Default for LockerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Locker for LockerClient {
    async fn encrypt(
        &self,
        session: Option<&str>,
        message: &str,
        password: &str,
    ) -> Result<Session<Encrypted>> {
        let request = IpcRequest::Encrypt {
            session: session.map(str::to_owned),
            message: message.to_string(),
            password: password.to_string(),
        };
        match self.send(request).await? {
            IpcResponse::Encrypted {
                session,
                encrypted_data,
                qr_code,
                session_info,
            } => Ok(Session {
                token: session,
                value: Encrypted {
                    encrypted_data,
                    qr_code,
                    session_info,
                },
            }),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    async fn decrypt_image(
        &self,
        session: Option<&str>,
        image: &[u8],
        password: &str,
    ) -> Result<Session<Decrypted>> {
        self.decrypt(IpcRequest::DecryptImage {
            session: session.map(str::to_owned),
            image_base64: Some(BASE64.encode(image)),
            password: password.to_string(),
        })
        .await
    }

    async fn decrypt_bundle(
        &self,
        session: Option<&str>,
        encrypted_data: &Value,
        password: &str,
    ) -> Result<Session<Decrypted>> {
        self.decrypt(IpcRequest::DecryptBundle {
            session: session.map(str::to_owned),
            encrypted_data: encrypted_data.clone(),
            password: password.to_string(),
        })
        .await
    }

    async fn status(&self, session: Option<&str>) -> Result<Session<StatusReport>> {
        let request = IpcRequest::Status {
            session: session.map(str::to_owned),
        };
        match self.send(request).await? {
            IpcResponse::Status { session, report } => Ok(Session {
                token: session,
                value: report,
            }),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    async fn clear(&self, session: Option<&str>) -> Result<()> {
        let request = IpcRequest::ClearSession {
            session: session.map(str::to_owned),
        };
        match self.send(request).await? {
            IpcResponse::Cleared { .. } => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }
}

// ============================================
// In-process backend
// ============================================

/// Runs the service inside the CLI process. Anything it stored or wrote
/// is purged when it is dropped.
pub struct LocalLocker {
    service: Arc<LockerService>,
}

impl LocalLocker {
    pub fn new(settings: ServiceSettings) -> Self {
        debug!("Running in-process (scratch: {:?})", settings.scratch_dir);
        let store = Arc::new(EphemeralStore::new(Arc::new(SystemClock)));
        Self {
            service: Arc::new(LockerService::new(store, settings)),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServiceSettings::from(&DaemonConfig::default()))
    }

    /// Run a blocking service call off the async runtime
    async fn call<T, F>(&self, f: F) -> Result<Session<T>>
    where
        T: Send + 'static,
        F: FnOnce(&LockerService) -> Reply<T> + Send + 'static,
    {
        let service = Arc::clone(&self.service);
        let reply = tokio::task::spawn_blocking(move || f(service.as_ref()))
            .await
            .map_err(|e| ClientError::DaemonError(e.to_string()))?;
        into_session(reply)
    }
}

impl Drop for LocalLocker {
    fn drop(&mut self) {
        self.service.store().purge();
    }
}

fn into_session<T>(reply: Reply<T>) -> Result<Session<T>> {
    let token = reply.session.map(|s| s.to_string());
    match reply.result {
        Ok(value) => Ok(Session { token, value }),
        Err(e) => Err(ClientError::Rejected {
            status: e.status,
            message: e.message,
        }),
    }
}

#[async_trait]
impl Locker for LocalLocker {
    async fn encrypt(
        &self,
        session: Option<&str>,
        message: &str,
        password: &str,
    ) -> Result<Session<Encrypted>> {
        let session = session.map(str::to_owned);
        let message = message.to_string();
        let password = password.to_string();
        self.call(move |service| service.encrypt(session.as_deref(), &message, &password))
            .await
    }

    async fn decrypt_image(
        &self,
        session: Option<&str>,
        image: &[u8],
        password: &str,
    ) -> Result<Session<Decrypted>> {
        let session = session.map(str::to_owned);
        let image = image.to_vec();
        let password = password.to_string();
        self.call(move |service| {
            service.decrypt_image(session.as_deref(), Some(image.as_slice()), &password)
        })
        .await
    }

    async fn decrypt_bundle(
        &self,
        session: Option<&str>,
        encrypted_data: &Value,
        password: &str,
    ) -> Result<Session<Decrypted>> {
        let session = session.map(str::to_owned);
        let encrypted_data = encrypted_data.clone();
        let password = password.to_string();
        self.call(move |service| {
            service.decrypt_bundle(session.as_deref(), &encrypted_data, &password)
        })
        .await
    }

    async fn status(&self, session: Option<&str>) -> Result<Session<StatusReport>> {
        let session = session.map(str::to_owned);
        self.call(move |service| service.status(session.as_deref()))
            .await
    }

    async fn clear(&self, session: Option<&str>) -> Result<()> {
        let session = session.map(str::to_owned);
        self.call(move |service| service.clear(session.as_deref()))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrlock_daemon::service::decode_data_uri;

    fn local(scratch: &std::path::Path) -> LocalLocker {
        let mut settings = ServiceSettings::from(&DaemonConfig::default());
        settings.scratch_dir = scratch.to_path_buf();
        LocalLocker::new(settings)
    }

    #[tokio::test]
    async fn test_local_round_trip() {
        let scratch = tempfile::tempdir().unwrap();
        let locker = local(scratch.path());

        let sealed = locker.encrypt(None, "hello world", "secret1").await.unwrap();
        let token = sealed.token.clone();
        assert!(token.is_some());

        let png = decode_data_uri(&sealed.value.qr_code).unwrap();
        let opened = locker
            .decrypt_image(token.as_deref(), &png, "secret1")
            .await
            .unwrap();
        assert_eq!(opened.value.message, "hello world");
        assert_eq!(opened.token, token);
    }

    #[tokio::test]
    async fn test_local_rejection_carries_status() {
        let scratch = tempfile::tempdir().unwrap();
        let locker = local(scratch.path());

        let err = locker.encrypt(None, "hello", "short").await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(
            err.to_string(),
            "Password must be at least 6 characters (400)"
        );
    }

    #[tokio::test]
    async fn test_local_drop_purges_scratch() {
        let scratch = tempfile::tempdir().unwrap();
        {
            let locker = local(scratch.path());
            locker.encrypt(None, "hello world", "secret1").await.unwrap();
        }
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_daemon_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let client = LockerClient::with_socket_path(dir.path().join("absent.sock"));
        assert!(matches!(
            client.ping().await,
            Err(ClientError::DaemonNotRunning)
        ));
    }
}
