use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use armoire_dav::types as dav;

use crate::error::DavError;
use crate::path::DavPath;
use crate::request::Condition;

/// Tuning knobs for the process-wide lock table.
#[derive(Debug, Clone)]
pub struct LockConfig {
    pub max_timeout_seconds: u32,
    pub default_timeout_seconds: u32,
    pub sweep_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_timeout_seconds: 604800,
            default_timeout_seconds: 3600,
            sweep_interval_ms: 1000,
        }
    }
}

/// One granted write lock. `root` is the client-visible path; the cover
/// is `{root}` at depth 0, the whole subtree at depth infinity.
#[derive(Debug, Clone)]
pub struct LockRecord {
    pub token: Uuid,
    pub root: DavPath,
    pub scope: dav::LockScope,
    pub depth: dav::Depth,
    pub owner: Option<dav::Owner>,
    pub timeout_secs: u32,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl LockRecord {
    pub fn covers(&self, path: &DavPath) -> bool {
        self.root == *path
            || (matches!(self.depth, dav::Depth::Infinity) && self.root.is_ancestor_of(path))
    }

    /// Two locks conflict when their covers overlap in either direction
    /// and at least one of them is exclusive. Shared locks coexist.
    fn conflicts_with(&self, root: &DavPath, scope: dav::LockScope, depth: dav::Depth) -> bool {
        let requested_covers_self = self.root == *root
            || (matches!(depth, dav::Depth::Infinity) && root.is_ancestor_of(&self.root));
        let overlapping = self.covers(root) || requested_covers_self;

        overlapping
            && (matches!(scope, dav::LockScope::Exclusive)
                || matches!(self.scope, dav::LockScope::Exclusive))
    }

    pub fn coded_token(&self) -> String {
        format!("opaquelocktoken:{}", self.token)
    }

    pub fn to_active_lock(&self, now: Instant) -> dav::ActiveLock {
        let remaining = self.expires_at.saturating_duration_since(now).as_secs();
        dav::ActiveLock {
            lockscope: self.scope,
            locktype: dav::LockType::Write,
            depth: self.depth,
            owner: self.owner.clone(),
            timeout: Some(dav::Timeout::Seconds(remaining as u32)),
            locktoken: Some(dav::LockToken(dav::Href(self.coded_token()))),
            lockroot: dav::LockRoot(dav::Href(self.root.to_string())),
        }
    }
}

#[derive(Default)]
struct Tables {
    by_path: HashMap<DavPath, Vec<Uuid>>,
    by_token: HashMap<Uuid, LockRecord>,
}

/// Process-wide lock table: a path-keyed multimap plus a token index,
/// both behind one critical section. Deadlines are monotonic, so a
/// wall-clock jump never extends a lock. Nothing here suspends; callers
/// never hold the section across provider I/O.
pub struct LockManager {
    cfg: LockConfig,
    tables: Mutex<Tables>,
}

impl LockManager {
    pub fn new(cfg: LockConfig) -> Self {
        Self {
            cfg,
            tables: Mutex::new(Tables::default()),
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.cfg
    }

    fn effective_timeout(&self, requested: Option<dav::Timeout>) -> u32 {
        match requested {
            None | Some(dav::Timeout::Seconds(0)) => self
                .cfg
                .default_timeout_seconds
                .min(self.cfg.max_timeout_seconds),
            Some(dav::Timeout::Seconds(n)) => n.min(self.cfg.max_timeout_seconds),
            Some(dav::Timeout::Infinite) => self.cfg.max_timeout_seconds,
        }
    }

    /// Grant a new lock, or report every live lock that conflicts.
    /// Grants are serialized by the critical section: of two concurrent
    /// exclusive requests for the same cover, exactly one wins.
    pub fn grant(
        &self,
        root: &DavPath,
        scope: dav::LockScope,
        depth: dav::Depth,
        owner: Option<dav::Owner>,
        requested: Option<dav::Timeout>,
    ) -> Result<LockRecord, Vec<LockRecord>> {
        let timeout_secs = self.effective_timeout(requested);
        let now = Instant::now();
        let mut tables = self.tables.lock().unwrap();

        let conflicts: Vec<LockRecord> = tables
            .by_token
            .values()
            .filter(|lock| lock.expires_at > now && lock.conflicts_with(root, scope, depth))
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            return Err(conflicts);
        }

        let record = LockRecord {
            token: Uuid::new_v4(),
            root: root.clone(),
            scope,
            depth,
            owner,
            timeout_secs,
            created_at: now,
            expires_at: now + Duration::from_secs(timeout_secs as u64),
        };
        tables
            .by_path
            .entry(root.clone())
            .or_default()
            .push(record.token);
        tables.by_token.insert(record.token, record.clone());
        tracing::debug!(root=%record.root, token=%record.token, "lock granted");
        Ok(record)
    }

    /// Reset the deadline of a live lock rooted exactly at `root`.
    /// Refreshes go through the same critical section as the sweep, so a
    /// refresh that gets there first wins over expiry.
    pub fn refresh(
        &self,
        token: Uuid,
        root: &DavPath,
        requested: Option<dav::Timeout>,
    ) -> Option<LockRecord> {
        let timeout_secs = self.effective_timeout(requested);
        let now = Instant::now();
        let mut tables = self.tables.lock().unwrap();

        let record = tables.by_token.get_mut(&token)?;
        if record.expires_at <= now || record.root != *root {
            return None;
        }
        record.timeout_secs = timeout_secs;
        record.expires_at = now + Duration::from_secs(timeout_secs as u64);
        Some(record.clone())
    }

    /// Remove a lock by token; returns the removed record when it was
    /// still live.
    pub fn release(&self, token: Uuid) -> Option<LockRecord> {
        let now = Instant::now();
        let mut tables = self.tables.lock().unwrap();
        let record = tables.by_token.remove(&token)?;
        detach_from_path(&mut tables, &record);
        if record.expires_at <= now {
            return None;
        }
        Some(record)
    }

    pub fn find(&self, token: Uuid) -> Option<LockRecord> {
        let now = Instant::now();
        let tables = self.tables.lock().unwrap();
        tables
            .by_token
            .get(&token)
            .filter(|lock| lock.expires_at > now)
            .cloned()
    }

    /// Live locks whose cover includes `path` (the path itself, plus any
    /// ancestor lock of infinite depth).
    pub fn covering(&self, path: &DavPath) -> Vec<LockRecord> {
        let now = Instant::now();
        let tables = self.tables.lock().unwrap();
        tables
            .by_token
            .values()
            .filter(|lock| lock.expires_at > now && lock.covers(path))
            .cloned()
            .collect()
    }

    /// Precondition gate for write methods, RFC 4918 §10.4: when `path`
    /// is covered, the request must have submitted a token matching one
    /// covering lock, and its entity tag, if supplied, must match the
    /// resource. Missing token means 423; a matching token with a stale
    /// tag means 412.
    pub fn assert_submitted(
        &self,
        path: &DavPath,
        conditions: &[Condition],
        current_etag: Option<&str>,
    ) -> Result<(), DavError> {
        let covering = self.covering(path);
        if covering.is_empty() {
            return Ok(());
        }

        let mut etag_mismatch = false;
        for condition in conditions.iter().filter(|c| !c.negated) {
            if !covering.iter().any(|lock| lock.token == condition.token) {
                continue;
            }
            match (&condition.etag, current_etag) {
                (Some(want), Some(cur)) if want != cur => etag_mismatch = true,
                _ => return Ok(()),
            }
        }

        match etag_mismatch {
            true => Err(DavError::PreconditionFailed),
            false => Err(DavError::Locked),
        }
    }

    /// Drop every lock whose deadline passed. The daemon paces this at
    /// most once per second; tests drive it directly.
    pub fn sweep(&self, now: Instant) {
        let mut tables = self.tables.lock().unwrap();
        let expired: Vec<LockRecord> = tables
            .by_token
            .values()
            .filter(|lock| lock.expires_at <= now)
            .cloned()
            .collect();
        for record in expired {
            tables.by_token.remove(&record.token);
            detach_from_path(&mut tables, &record);
            tracing::debug!(root=%record.root, token=%record.token, "lock expired");
        }
    }
}

fn detach_from_path(tables: &mut Tables, record: &LockRecord) {
    if let Some(tokens) = tables.by_path.get_mut(&record.root) {
        tokens.retain(|t| *t != record.token);
        if tokens.is_empty() {
            tables.by_path.remove(&record.root);
        }
    }
}
