//! QR Locker CLI
//!
//! Seals short messages into QR codes and opens them again, either through
//! a running `qrlockd` or in-process with `--local`.

pub mod client;
pub mod commands;

pub use client::{ClientError, LocalLocker, Locker, LockerClient, Session};
pub use commands::*;
