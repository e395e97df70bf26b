//! Request service
//!
//! Turns caller requests into core operations and is the single place where
//! internal errors become caller-facing messages. Nothing a library reports
//! is passed through verbatim: every failure maps to one of the fixed
//! messages below, and the detail goes to the log.
//!
//! Every operation resolves the caller's session token first and returns
//! the (possibly fresh) session with the result. An internal failure
//! (status 500) also clears the caller's session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use qrlock_core::{validation::check_request, CipherBundle, Error as CoreError};
use qrlock_qr::{DecodeCascade, DecodeOutcome, QrEncoder, QrError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};
use crate::session::SessionId;
use crate::store::{EphemeralStore, Payload, RecordKind, StoreStats};

pub const MSG_DATA_TOO_LARGE: &str = "Data too large for QR code";
pub const MSG_ENCRYPTION_FAILED: &str = "Encryption failed";
pub const MSG_NO_FILE: &str = "No file selected";
pub const MSG_FILE_EMPTY: &str = "File is empty";
pub const MSG_FILE_TOO_LARGE: &str = "File too large";
pub const MSG_PASSWORD_REQUIRED: &str = "Password is required";
pub const MSG_UNDECODABLE: &str = "Could not decode QR code. Please ensure the image contains a valid QR code generated by this application.";
pub const MSG_BUNDLE_REQUIRED: &str = "Password and encrypted data required";
pub const MSG_WRONG_PASSWORD: &str = "Incorrect password or corrupted data";
pub const MSG_DECRYPTION_FAILED: &str = "Decryption failed";
pub const MSG_INVALID_REQUEST: &str = "Invalid request format";
pub const MSG_INTERNAL: &str = "Internal server error";
pub const MSG_NOT_FOUND: &str = "Not found";
pub const MSG_SESSION_CLEARED: &str = "Session cleared";

const STORAGE_TEMPORARY: &str = "temporary_memory_only";
const STORAGE_TYPE: &str = "memory_only_no_persistence";

/// A caller-facing failure: an HTTP-style status and a fixed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ServiceError {
    pub status: u16,
    pub message: String,
}

impl ServiceError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            message: message.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            message: MSG_NOT_FOUND.to_string(),
        }
    }

    pub fn too_large() -> Self {
        Self {
            status: 413,
            message: MSG_FILE_TOO_LARGE.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            message: message.into(),
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status >= 500
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Short form only
    pub session_id: String,
    pub expires_in: String,
    pub storage: String,
}

impl SessionInfo {
    fn new(session: &SessionId, ttl: chrono::Duration) -> Self {
        Self {
            session_id: session.short(),
            expires_in: format!("{} minutes", ttl.num_minutes()),
            storage: STORAGE_TEMPORARY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encrypted {
    pub encrypted_data: CipherBundle,
    /// `data:image/png;base64,...`
    pub qr_code: String,
    pub session_info: SessionInfo,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decrypted {
    pub message: String,
    pub session_info: SessionInfo,
}

impl std::fmt::Debug for Decrypted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decrypted")
            .field("message", &"[REDACTED]")
            .field("session_info", &self.session_info)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub session_id: String,
    pub has_temp_data: bool,
    pub data_type: Option<RecordKind>,
    pub total_sessions: usize,
    pub temp_files_scheduled: usize,
    pub storage_type: String,
}

/// Outcome of a service call.
///
/// `session` is the token the caller should present next time; `None` when
/// the call cleared the session.
#[derive(Debug)]
pub struct Reply<T> {
    pub session: Option<SessionId>,
    pub result: std::result::Result<T, ServiceError>,
}

/// Lifetimes and limits applied by the service
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub scratch_dir: PathBuf,
    pub encryption_ttl: chrono::Duration,
    pub decryption_ttl: chrono::Duration,
    pub artifact_ttl: chrono::Duration,
    pub max_upload_bytes: usize,
}

impl From<&DaemonConfig> for ServiceSettings {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            scratch_dir: config.scratch_dir.clone(),
            encryption_ttl: config.encryption_ttl(),
            decryption_ttl: config.decryption_ttl(),
            artifact_ttl: config.artifact_ttl(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub struct LockerService {
    store: Arc<EphemeralStore>,
    cascade: DecodeCascade,
    settings: ServiceSettings,
}

impl LockerService {
    pub fn new(store: Arc<EphemeralStore>, settings: ServiceSettings) -> Self {
        Self {
            store,
            cascade: DecodeCascade::standard(),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<EphemeralStore> {
        &self.store
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.settings.max_upload_bytes
    }

    /// Attach the session to a result, clearing it on internal failure
    fn finish<T>(
        &self,
        session: SessionId,
        result: std::result::Result<T, ServiceError>,
    ) -> Reply<T> {
        match result {
            Err(e) if e.is_internal() => {
                self.store.clear(&session);
                Reply {
                    session: None,
                    result: Err(e),
                }
            }
            result => Reply {
                session: Some(session),
                result,
            },
        }
    }

    // ============================================
    // Encrypt
    // ============================================

    /// Seal a message and render it as a QR code
    pub fn encrypt(&self, token: Option<&str>, message: &str, password: &str) -> Reply<Encrypted> {
        let session = self.store.resolve_session(token);
        let result = self.encrypt_inner(&session, message.trim(), password);
        self.finish(session, result)
    }

    fn encrypt_inner(
        &self,
        session: &SessionId,
        message: &str,
        password: &str,
    ) -> std::result::Result<Encrypted, ServiceError> {
        check_request(message, password).map_err(|e| ServiceError::bad_request(e.to_string()))?;

        info!("Encrypting message (session: {})", session.short());

        let bundle = qrlock_core::encrypt(message, password).map_err(encrypt_error)?;
        let transport = bundle.to_transport().map_err(encrypt_error)?;

        let png = self.render_artifact(&transport).map_err(|e| match e {
            DaemonError::Qr(QrError::Capacity(detail)) => {
                debug!("QR capacity exceeded: {}", detail);
                ServiceError::bad_request(MSG_DATA_TOO_LARGE)
            }
            other => {
                error!("Encryption error: {}", other);
                ServiceError::internal(MSG_ENCRYPTION_FAILED)
            }
        })?;

        let ttl = self.settings.encryption_ttl;
        self.store.put(session, Payload::Encryption(bundle.clone()), ttl);

        info!("QR code generated (no permanent storage)");
        Ok(Encrypted {
            encrypted_data: bundle,
            qr_code: format!("data:image/png;base64,{}", BASE64.encode(png)),
            session_info: SessionInfo::new(session, ttl),
        })
    }

    /// Write the QR image into a fresh scratch directory, read it back and
    /// delete it. Both the file and the directory are scheduled for
    /// deletion first, so a failure anywhere still leaves them to the
    /// reclaimer.
    fn render_artifact(&self, transport: &str) -> Result<Vec<u8>> {
        let dir = self
            .settings
            .scratch_dir
            .join(format!("qrlock-{}", uuid::Uuid::new_v4().simple()));
        create_private_dir(&dir)?;
        self.store.schedule_deletion(&dir, self.settings.artifact_ttl);

        let path = QrEncoder::write_png(transport, &dir)?;
        self.store.schedule_deletion(&path, self.settings.artifact_ttl);

        let bytes = std::fs::read(&path)?;

        if let Err(e) = std::fs::remove_file(&path).and_then(|_| std::fs::remove_dir(&dir)) {
            debug!("Leaving {:?} to the reclaimer: {}", dir, e);
        }
        Ok(bytes)
    }

    // ============================================
    // Decrypt
    // ============================================

    /// Recover a message from an uploaded QR image
    pub fn decrypt_image(
        &self,
        token: Option<&str>,
        image: Option<&[u8]>,
        password: &str,
    ) -> Reply<Decrypted> {
        let session = self.store.resolve_session(token);
        info!("Decrypt request (session: {})", session.short());
        let result = self.decrypt_image_inner(&session, image, password);
        self.finish(session, result)
    }

    fn decrypt_image_inner(
        &self,
        session: &SessionId,
        image: Option<&[u8]>,
        password: &str,
    ) -> std::result::Result<Decrypted, ServiceError> {
        let image = image.ok_or_else(|| ServiceError::bad_request(MSG_NO_FILE))?;
        if image.len() > self.settings.max_upload_bytes {
            return Err(ServiceError::too_large());
        }
        if password.is_empty() {
            return Err(ServiceError::bad_request(MSG_PASSWORD_REQUIRED));
        }
        if image.is_empty() {
            return Err(ServiceError::bad_request(MSG_FILE_EMPTY));
        }

        debug!("Processing upload in memory: {} bytes", image.len());
        let payload = match self.cascade.decode(image) {
            DecodeOutcome::Decoded { payload, strategy } => {
                debug!("QR decoded by {}", strategy);
                payload
            }
            DecodeOutcome::NotFound(diagnosis) => {
                info!("QR not decoded: {:?}", diagnosis);
                return Err(ServiceError::bad_request(MSG_UNDECODABLE));
            }
        };

        self.open(session, &Value::String(payload), password)
    }

    /// Recover a message from a bundle supplied directly, either as a JSON
    /// object or as a string holding one
    pub fn decrypt_bundle(
        &self,
        token: Option<&str>,
        encrypted_data: &Value,
        password: &str,
    ) -> Reply<Decrypted> {
        let session = self.store.resolve_session(token);
        info!("Decrypt request (session: {})", session.short());

        let result = if password.is_empty() || is_blank(encrypted_data) {
            Err(ServiceError::bad_request(MSG_BUNDLE_REQUIRED))
        } else {
            self.open(&session, encrypted_data, password)
        };
        self.finish(session, result)
    }

    fn open(
        &self,
        session: &SessionId,
        encrypted_data: &Value,
        password: &str,
    ) -> std::result::Result<Decrypted, ServiceError> {
        let bundle = CipherBundle::from_value(encrypted_data).map_err(decrypt_error)?;
        let message = qrlock_core::decrypt(&bundle, password).map_err(decrypt_error)?;

        let ttl = self.settings.decryption_ttl;
        self.store.put(
            session,
            Payload::Decryption(Zeroizing::new(message.clone())),
            ttl,
        );

        info!("Message decrypted (temporary storage only)");
        Ok(Decrypted {
            message,
            session_info: SessionInfo::new(session, ttl),
        })
    }

    // ============================================
    // Session
    // ============================================

    pub fn status(&self, token: Option<&str>) -> Reply<StatusReport> {
        let session = self.store.resolve_session(token);
        let kind = self.store.kind(&session);
        let StoreStats {
            total_sessions,
            temp_files_scheduled,
        } = self.store.stats();

        Reply {
            session: Some(session),
            result: Ok(StatusReport {
                session_id: session.short(),
                has_temp_data: kind.is_some(),
                data_type: kind,
                total_sessions,
                temp_files_scheduled,
                storage_type: STORAGE_TYPE.to_string(),
            }),
        }
    }

    /// Drop the caller's record and identity. Idempotent.
    pub fn clear(&self, token: Option<&str>) -> Reply<()> {
        if let Some(session) = token.and_then(SessionId::parse) {
            self.store.clear(&session);
        }
        Reply {
            session: None,
            result: Ok(()),
        }
    }

    /// Landing-page hook: entering the application starts from nothing
    pub fn landing(&self, token: Option<&str>) -> Reply<()> {
        self.clear(token)
    }

    /// Unknown-operation hook: clears the session and reports 404.
    /// No session survives, so the caller answers without a token.
    pub fn not_found(&self, token: Option<&str>) -> ServiceError {
        self.clear(token);
        ServiceError::not_found()
    }

    /// Internal-error hook for failures outside the service (a panicked
    /// worker, for instance): clears the session and reports 500
    pub fn internal_error(&self, token: Option<&str>) -> ServiceError {
        self.clear(token);
        ServiceError::internal(MSG_INTERNAL)
    }
}

fn encrypt_error(e: CoreError) -> ServiceError {
    match e {
        CoreError::Validation(v) => ServiceError::bad_request(v.to_string()),
        CoreError::PayloadTooLarge { len, max } => {
            debug!("Bundle too large for QR: {} > {}", len, max);
            ServiceError::bad_request(MSG_DATA_TOO_LARGE)
        }
        other => {
            error!("Encryption error: {}", other);
            ServiceError::internal(MSG_ENCRYPTION_FAILED)
        }
    }
}

fn decrypt_error(e: CoreError) -> ServiceError {
    match e {
        CoreError::Format(f) => ServiceError::bad_request(f.to_string()),
        CoreError::Validation(v) => ServiceError::bad_request(v.to_string()),
        CoreError::Decryption(reason) => {
            debug!("Decryption refused: {:?}", reason);
            ServiceError::bad_request(MSG_WRONG_PASSWORD)
        }
        other => {
            error!("Decryption error: {}", other);
            ServiceError::internal(MSG_DECRYPTION_FAILED)
        }
    }
}

/// Missing, null, or an empty string, object or array
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(_) => false,
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir(dir)
}

/// Decode a `data:image/png;base64,...` URI back to PNG bytes
pub fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let encoded = uri.strip_prefix("data:image/png;base64,")?;
    match BASE64.decode(encoded) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("Malformed data URI: {}", e);
            None
        }
    }
}
