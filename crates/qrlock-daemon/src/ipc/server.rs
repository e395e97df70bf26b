//! IPC server implementation

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::service::{LockerService, Reply, ServiceError, MSG_INVALID_REQUEST};
use crate::session::SessionId;

use super::framing::{max_request_bytes, read_frame, write_frame, Frame};
use super::types::{IpcRequest, IpcResponse};
use super::unix::SocketListener;

/// IPC server
pub struct IpcServer {
    /// Socket path
    socket_path: PathBuf,

    service: Arc<LockerService>,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf, service: Arc<LockerService>) -> Self {
        Self {
            socket_path,
            service,
        }
    }

    /// Serve until the process exits
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes, then remove the socket
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = SocketListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(stream) => {
                        let service = Arc::clone(&self.service);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, service).await {
                                error!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => error!("Accept error: {}", e),
                },
            }
        }

        listener.cleanup()?;
        info!("IPC server stopped");
        Ok(())
    }
}

/// Handle a single IPC connection
async fn handle_connection<S>(stream: S, service: Arc<LockerService>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let limit = max_request_bytes(service.max_upload_bytes());

    loop {
        let bytes = match read_frame(&mut reader, limit).await? {
            Frame::Line(bytes) => bytes,
            Frame::Closed => break,
            Frame::Oversized => {
                warn!("Request exceeds {} bytes; closing connection", limit);
                let response = error_response(ServiceError::too_large(), None);
                write_frame(&mut writer, &response).await?;
                break;
            }
        };

        let response = match std::str::from_utf8(&bytes) {
            Ok(line) => handle_line(line, &service).await,
            Err(e) => {
                debug!("Request is not UTF-8: {}", e);
                error_response(ServiceError::bad_request(MSG_INVALID_REQUEST), None)
            }
        };
        write_frame(&mut writer, &response).await?;
    }

    Ok(())
}

/// Parse one request line and produce its response
async fn handle_line(line: &str, service: &Arc<LockerService>) -> IpcResponse {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            debug!("Unparseable request: {}", e);
            return error_response(ServiceError::bad_request(MSG_INVALID_REQUEST), None);
        }
    };

    let kind = match value.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_string(),
        None => return error_response(ServiceError::bad_request(MSG_INVALID_REQUEST), None),
    };

    if !IpcRequest::KINDS.contains(&kind.as_str()) {
        let token = value.get("session").and_then(Value::as_str);
        info!("Unknown request type {:?}", kind);
        return error_response(service.not_found(token), None);
    }

    let request: IpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            debug!("Malformed {} request: {}", kind, e);
            return error_response(ServiceError::bad_request(MSG_INVALID_REQUEST), None);
        }
    };

    handle_request(request, service).await
}

/// Handle a single request
async fn handle_request(request: IpcRequest, service: &Arc<LockerService>) -> IpcResponse {
    let token = request.session().map(str::to_owned);
    debug!(
        "Received IPC request: {} (session: {})",
        request.kind(),
        token
            .as_deref()
            .and_then(SessionId::parse)
            .map(|s| s.short())
            .unwrap_or_else(|| "new".to_string())
    );

    // Key derivation and image decoding are CPU-bound
    let worker = Arc::clone(service);
    match tokio::task::spawn_blocking(move || dispatch(&worker, request)).await {
        Ok(response) => response,
        Err(e) => {
            error!("Request worker failed: {}", e);
            error_response(service.internal_error(token.as_deref()), None)
        }
    }
}

fn dispatch(service: &LockerService, request: IpcRequest) -> IpcResponse {
    match request {
        IpcRequest::Ping => IpcResponse::Pong {
            version: env!("CARGO_PKG_VERSION").to_string(),
        },

        IpcRequest::Encrypt {
            session,
            message,
            password,
        } => respond(
            service.encrypt(session.as_deref(), &message, &password),
            |session, encrypted| IpcResponse::Encrypted {
                session,
                encrypted_data: encrypted.encrypted_data,
                qr_code: encrypted.qr_code,
                session_info: encrypted.session_info,
            },
        ),

        IpcRequest::DecryptImage {
            session,
            image_base64,
            password,
        } => {
            let image = match image_base64.as_deref().map(|b64| BASE64.decode(b64.trim())) {
                None => None,
                Some(Ok(bytes)) => Some(bytes),
                Some(Err(e)) => {
                    debug!("Image is not valid base64: {}", e);
                    let session = service.store().resolve_session(session.as_deref());
                    return error_response(
                        ServiceError::bad_request(MSG_INVALID_REQUEST),
                        Some(session.to_string()),
                    );
                }
            };
            respond(
                service.decrypt_image(session.as_deref(), image.as_deref(), &password),
                decrypted,
            )
        }

        IpcRequest::DecryptBundle {
            session,
            encrypted_data,
            password,
        } => respond(
            service.decrypt_bundle(session.as_deref(), &encrypted_data, &password),
            decrypted,
        ),

        IpcRequest::Status { session } => {
            respond(service.status(session.as_deref()), |session, report| {
                IpcResponse::Status { session, report }
            })
        }

        IpcRequest::ClearSession { session } => {
            respond(service.clear(session.as_deref()), |_, ()| cleared())
        }

        IpcRequest::Landing { session } => {
            respond(service.landing(session.as_deref()), |_, ()| cleared())
        }
    }
}

/// Convert a service reply, rendering errors uniformly
fn respond<T>(reply: Reply<T>, ok: impl FnOnce(Option<String>, T) -> IpcResponse) -> IpcResponse {
    let session = reply.session.map(|s| s.to_string());
    match reply.result {
        Ok(value) => ok(session, value),
        Err(e) => error_response(e, session),
    }
}

fn decrypted(session: Option<String>, result: crate::service::Decrypted) -> IpcResponse {
    IpcResponse::Decrypted {
        session,
        message: result.message,
        session_info: result.session_info,
    }
}

fn cleared() -> IpcResponse {
    IpcResponse::Cleared {
        message: crate::service::MSG_SESSION_CLEARED.to_string(),
    }
}

fn error_response(e: ServiceError, session: Option<String>) -> IpcResponse {
    IpcResponse::Error {
        status: e.status,
        message: e.message,
        session,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_is_answered_by_dispatch() {
        let store = Arc::new(crate::store::EphemeralStore::new(Arc::new(
            crate::clock::SystemClock,
        )));
        let service = LockerService::new(
            store,
            crate::service::ServiceSettings::from(&crate::config::DaemonConfig::default()),
        );
        match dispatch(&service, IpcRequest::Ping) {
            IpcResponse::Pong { version } => assert_eq!(version, env!("CARGO_PKG_VERSION")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_respond_carries_session_on_error() {
        let session = SessionId::generate();
        let reply: Reply<()> = Reply {
            session: Some(session),
            result: Err(ServiceError::bad_request("nope")),
        };
        match respond(reply, |_, ()| cleared()) {
            IpcResponse::Error {
                status,
                message,
                session: returned,
            } => {
                assert_eq!(status, 400);
                assert_eq!(message, "nope");
                assert_eq!(returned, Some(session.to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
