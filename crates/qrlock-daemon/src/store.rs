//! Ephemeral, time-bounded session store
//!
//! Holds at most one record per session, the set of live session
//! identities, and a schedule of on-disk artifacts that must be deleted by
//! a deadline. Nothing here is ever written to disk.
//!
//! Expiry is enforced twice: lazily on every read (an expired record is
//! reported absent even if no sweep has run yet) and eagerly by
//! [`EphemeralStore::sweep`], which the reclaimer calls periodically.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use qrlock_core::CipherBundle;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::session::SessionId;

/// How long an identity with no record survives without being used
pub const DEFAULT_IDENTITY_TTL_MINUTES: i64 = 30;

/// What a record holds
#[derive(Clone)]
pub enum Payload {
    /// Bundle produced by an encrypt request
    Encryption(CipherBundle),
    /// Plaintext recovered by a decrypt request
    Decryption(Zeroizing<String>),
}

impl Payload {
    pub fn kind(&self) -> RecordKind {
        match self {
            Payload::Encryption(_) => RecordKind::Encryption,
            Payload::Decryption(_) => RecordKind::Decryption,
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Encryption(_) => f.write_str("Payload::Encryption(..)"),
            Payload::Decryption(_) => f.write_str("Payload::Decryption([REDACTED])"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Encryption,
    Decryption,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Encryption => "encryption",
            RecordKind::Decryption => "decryption",
        }
    }
}

/// A stored payload with its lifetime
#[derive(Debug, Clone)]
pub struct EphemeralRecord {
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

impl EphemeralRecord {
    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }

    /// Absent once strictly past the deadline
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expire_at
    }
}

/// What one sweep did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub records_evicted: usize,
    pub identities_dropped: usize,
    pub paths_deleted: usize,
    /// Scheduled paths that were already gone
    pub paths_missing: usize,
    /// Paths whose removal failed; they are dropped from the schedule anyway
    pub paths_failed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == SweepReport::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Live records
    pub total_sessions: usize,
    /// Paths awaiting deletion
    pub temp_files_scheduled: usize,
}

/// In-memory session store with injected time
pub struct EphemeralStore {
    clock: Arc<dyn Clock>,
    identity_ttl: Duration,
    records: Mutex<HashMap<SessionId, EphemeralRecord>>,
    /// Identity -> last time it was resolved
    identities: Mutex<HashMap<SessionId, DateTime<Utc>>>,
    deletions: Mutex<HashMap<PathBuf, DateTime<Utc>>>,
}

/// Lock a map, recovering the data if a previous holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl EphemeralStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_identity_ttl(clock, Duration::minutes(DEFAULT_IDENTITY_TTL_MINUTES))
    }

    pub fn with_identity_ttl(clock: Arc<dyn Clock>, identity_ttl: Duration) -> Self {
        Self {
            clock,
            identity_ttl,
            records: Mutex::new(HashMap::new()),
            identities: Mutex::new(HashMap::new()),
            deletions: Mutex::new(HashMap::new()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ----------------------------------------
    // Records
    // ----------------------------------------

    /// Store a payload for a session, replacing any previous record
    pub fn put(&self, session: &SessionId, payload: Payload, ttl: Duration) {
        let now = self.clock.now();
        let kind = payload.kind();
        let record = EphemeralRecord {
            payload,
            created_at: now,
            expire_at: now + ttl,
        };
        lock(&self.records).insert(*session, record);
        debug!(
            "Stored {} record for session {} (expires in {} min)",
            kind.as_str(),
            session.short(),
            ttl.num_minutes()
        );
    }

    /// Fetch a live record, evicting it if it has expired
    pub fn get(&self, session: &SessionId) -> Option<Payload> {
        self.live_record(session).map(|r| r.payload)
    }

    pub fn kind(&self, session: &SessionId) -> Option<RecordKind> {
        self.live_record(session).map(|r| r.kind())
    }

    fn live_record(&self, session: &SessionId) -> Option<EphemeralRecord> {
        let now = self.clock.now();
        let mut records = lock(&self.records);
        match records.get(session) {
            Some(record) if record.is_expired(now) => {
                records.remove(session);
                debug!("Evicted expired record for session {}", session.short());
                None
            }
            Some(record) => Some(record.clone()),
            None => None,
        }
    }

    /// Remove a session's record and identity.
    ///
    /// Returns whether anything was removed. Safe to call repeatedly.
    pub fn clear(&self, session: &SessionId) -> bool {
        let had_record = lock(&self.records).remove(session).is_some();
        let had_identity = lock(&self.identities).remove(session).is_some();
        if had_record || had_identity {
            info!("Cleared session data: {}", session.short());
        }
        had_record || had_identity
    }

    // ----------------------------------------
    // Identities
    // ----------------------------------------

    /// Mint a new identity
    pub fn issue_session(&self) -> SessionId {
        let session = SessionId::generate();
        lock(&self.identities).insert(session, self.clock.now());
        debug!("Issued session {}", session.short());
        session
    }

    /// Resolve a caller-supplied token to a live identity.
    ///
    /// Missing, malformed or unknown tokens get a fresh identity; a caller
    /// can never choose its own.
    pub fn resolve_session(&self, token: Option<&str>) -> SessionId {
        if let Some(session) = token.and_then(SessionId::parse) {
            let mut identities = lock(&self.identities);
            if let Some(last_seen) = identities.get_mut(&session) {
                *last_seen = self.clock.now();
                return session;
            }
        }
        self.issue_session()
    }

    pub fn is_known(&self, session: &SessionId) -> bool {
        lock(&self.identities).contains_key(session)
    }

    // ----------------------------------------
    // Scheduled deletions
    // ----------------------------------------

    /// Ensure `path` (file or directory) is removed no later than `ttl` from now
    pub fn schedule_deletion(&self, path: impl Into<PathBuf>, ttl: Duration) {
        let path = path.into();
        let expire_at = self.clock.now() + ttl;
        debug!("Scheduled deletion of {:?} in {} min", path, ttl.num_minutes());
        lock(&self.deletions).insert(path, expire_at);
    }

    // ----------------------------------------
    // Reclamation
    // ----------------------------------------

    /// Evict expired records and idle identities, delete due paths.
    ///
    /// Never fails: deletion errors are logged and the path is dropped from
    /// the schedule.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        let live: Vec<SessionId> = {
            let mut records = lock(&self.records);
            let before = records.len();
            records.retain(|session, record| {
                let keep = !record.is_expired(now);
                if !keep {
                    info!("Cleaned session: {}", session.short());
                }
                keep
            });
            report.records_evicted = before - records.len();
            records.keys().copied().collect()
        };

        {
            let mut identities = lock(&self.identities);
            let before = identities.len();
            let cutoff = now - self.identity_ttl;
            identities.retain(|session, last_seen| *last_seen > cutoff || live.contains(session));
            report.identities_dropped = before - identities.len();
        }

        let due: Vec<PathBuf> = {
            let mut deletions = lock(&self.deletions);
            let due: Vec<PathBuf> = deletions
                .iter()
                .filter(|(_, expire_at)| now > **expire_at)
                .map(|(path, _)| path.clone())
                .collect();
            for path in &due {
                deletions.remove(path);
            }
            due
        };

        // Files before directories so a directory's contents go first
        let (dirs, files): (Vec<PathBuf>, Vec<PathBuf>) =
            due.into_iter().partition(|path| path.is_dir());
        for path in files.iter().chain(dirs.iter()) {
            match remove_path(path) {
                Ok(()) => {
                    report.paths_deleted += 1;
                    info!("Cleaned up: {:?}", path);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => report.paths_missing += 1,
                Err(e) => {
                    report.paths_failed += 1;
                    warn!("Could not remove {:?}: {}", path, e);
                }
            }
        }

        report
    }

    /// Drop every record and identity and delete every scheduled path now.
    ///
    /// Used at shutdown.
    pub fn purge(&self) -> SweepReport {
        let mut report = SweepReport {
            records_evicted: std::mem::take(&mut *lock(&self.records)).len(),
            identities_dropped: std::mem::take(&mut *lock(&self.identities)).len(),
            ..SweepReport::default()
        };

        let paths: Vec<PathBuf> = std::mem::take(&mut *lock(&self.deletions))
            .into_keys()
            .collect();
        let (dirs, files): (Vec<PathBuf>, Vec<PathBuf>) =
            paths.into_iter().partition(|path| path.is_dir());
        for path in files.iter().chain(dirs.iter()) {
            match remove_path(path) {
                Ok(()) => report.paths_deleted += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => report.paths_missing += 1,
                Err(e) => {
                    report.paths_failed += 1;
                    warn!("Could not remove {:?}: {}", path, e);
                }
            }
        }
        report
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            total_sessions: lock(&self.records).len(),
            temp_files_scheduled: lock(&self.deletions).len(),
        }
    }
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
