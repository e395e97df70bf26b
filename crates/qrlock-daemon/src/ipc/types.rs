//! IPC protocol types
//!
//! Message types for daemon-CLI communication. Requests and responses are
//! internally tagged by `type`.

use std::fmt;

use qrlock_core::CipherBundle;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::service::{SessionInfo, StatusReport};

/// IPC request types
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcRequest {
    /// Check if daemon is running
    Ping,

    /// Seal a message and render it as a QR code
    Encrypt {
        #[serde(default)]
        session: Option<String>,
        #[serde(default)]
        message: String,
        #[serde(default)]
        password: String,
    },

    /// Recover a message from a QR image
    DecryptImage {
        #[serde(default)]
        session: Option<String>,
        /// Standard base64 of the raw image file
        #[serde(default)]
        image_base64: Option<String>,
        #[serde(default)]
        password: String,
    },

    /// Recover a message from a bundle (object or JSON string)
    DecryptBundle {
        #[serde(default)]
        session: Option<String>,
        #[serde(default)]
        encrypted_data: Value,
        #[serde(default)]
        password: String,
    },

    /// Report the caller's session state
    Status {
        #[serde(default)]
        session: Option<String>,
    },

    /// Drop the caller's session
    ClearSession {
        #[serde(default)]
        session: Option<String>,
    },

    /// Entering the application; drops the caller's session
    Landing {
        #[serde(default)]
        session: Option<String>,
    },
}

impl IpcRequest {
    /// Every value `type` may take
    pub const KINDS: [&'static str; 7] = [
        "Ping",
        "Encrypt",
        "DecryptImage",
        "DecryptBundle",
        "Status",
        "ClearSession",
        "Landing",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            IpcRequest::Ping => "Ping",
            IpcRequest::Encrypt { .. } => "Encrypt",
            IpcRequest::DecryptImage { .. } => "DecryptImage",
            IpcRequest::DecryptBundle { .. } => "DecryptBundle",
            IpcRequest::Status { .. } => "Status",
            IpcRequest::ClearSession { .. } => "ClearSession",
            IpcRequest::Landing { .. } => "Landing",
        }
    }

    pub fn session(&self) -> Option<&str> {
        match self {
            IpcRequest::Ping => None,
            IpcRequest::Encrypt { session, .. }
            | IpcRequest::DecryptImage { session, .. }
            | IpcRequest::DecryptBundle { session, .. }
            | IpcRequest::Status { session }
            | IpcRequest::ClearSession { session }
            | IpcRequest::Landing { session } => session.as_deref(),
        }
    }
}

// Requests carry passwords and plaintext; only the kind is printable
impl fmt::Debug for IpcRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IpcRequest::{}", self.kind())
    }
}

/// IPC response types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    /// Pong response
    Pong { version: String },

    Encrypted {
        session: Option<String>,
        encrypted_data: CipherBundle,
        /// `data:image/png;base64,...`
        qr_code: String,
        session_info: SessionInfo,
    },

    Decrypted {
        session: Option<String>,
        message: String,
        session_info: SessionInfo,
    },

    Status {
        session: Option<String>,
        report: StatusReport,
    },

    Cleared { message: String },

    /// Error response; `status` follows HTTP semantics
    Error {
        status: u16,
        message: String,
        session: Option<String>,
    },
}

impl IpcResponse {
    /// The token the caller should present next
    pub fn session(&self) -> Option<&str> {
        match self {
            IpcResponse::Encrypted { session, .. }
            | IpcResponse::Decrypted { session, .. }
            | IpcResponse::Status { session, .. }
            | IpcResponse::Error { session, .. } => session.as_deref(),
            IpcResponse::Pong { .. } | IpcResponse::Cleared { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_form() {
        let request = IpcRequest::Encrypt {
            session: None,
            message: "hello".into(),
            password: "secret1".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "Encrypt");
        assert_eq!(json["message"], "hello");
    }

    #[test]
    fn test_missing_fields_default() {
        let request: IpcRequest = serde_json::from_str(r#"{"type":"DecryptBundle"}"#).unwrap();
        match request {
            IpcRequest::DecryptBundle {
                session,
                encrypted_data,
                password,
            } => {
                assert!(session.is_none());
                assert!(encrypted_data.is_null());
                assert!(password.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_kinds_cover_every_variant() {
        let requests = [
            IpcRequest::Ping,
            IpcRequest::Encrypt {
                session: None,
                message: String::new(),
                password: String::new(),
            },
            IpcRequest::DecryptImage {
                session: None,
                image_base64: None,
                password: String::new(),
            },
            IpcRequest::DecryptBundle {
                session: None,
                encrypted_data: Value::Null,
                password: String::new(),
            },
            IpcRequest::Status { session: None },
            IpcRequest::ClearSession { session: None },
            IpcRequest::Landing { session: None },
        ];
        for request in &requests {
            assert!(IpcRequest::KINDS.contains(&request.kind()));
            let json = serde_json::to_value(request).unwrap();
            assert_eq!(json["type"], request.kind());
        }
    }

    #[test]
    fn test_debug_redacts() {
        let request = IpcRequest::Encrypt {
            session: None,
            message: "attack at dawn".into(),
            password: "hunter22".into(),
        };
        let printed = format!("{:?}", request);
        assert!(!printed.contains("attack"));
        assert!(!printed.contains("hunter22"));
    }
}
