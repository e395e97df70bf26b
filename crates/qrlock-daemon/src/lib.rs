//! QR Locker daemon
//!
//! This crate provides:
//! - The per-session ephemeral store and its background reclaimer
//! - The request service mapping caller input to core operations
//! - IPC server for CLI communication

pub mod clock;
pub mod config;
pub mod error;
pub mod ipc;
pub mod reclaimer;
pub mod service;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DaemonConfig;
pub use error::{DaemonError, Result};
pub use ipc::{IpcClient, IpcRequest, IpcResponse, IpcServer};
pub use reclaimer::{Reclaimer, ReclaimerHandle};
pub use service::{LockerService, Reply, ServiceError, ServiceSettings};
pub use session::SessionId;
pub use store::{EphemeralStore, Payload, RecordKind, SweepReport};
