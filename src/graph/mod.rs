//! Communication Graph Store.
//!
//! One JSON document per tenant mapping source agent id to its ordered list
//! of next-hop targets. Every mutation runs under the tenant's exclusive
//! lock as a whole-document read-modify-replace; reads take the shared
//! lock. The replace is atomic (temp file + rename), so a reader never
//! observes a partially written document. A missing or unparsable document
//! reads as an empty graph — the store self-heals on the next write.

pub mod traversal;

use crate::concurrency::TenantLockManager;
use crate::error::SimlabError;
use serde_json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Source agent id → ordered next-hop target ids.
type Adjacency = BTreeMap<String, Vec<String>>;

/// Per-tenant persisted adjacency store.
pub struct CommGraphStore {
    root: PathBuf,
    locks: TenantLockManager,
    lock_timeout: Duration,
}

impl CommGraphStore {
    pub fn new(root: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            locks: TenantLockManager::new(),
            lock_timeout,
        }
    }

    fn document_path(&self, tenant: &str) -> PathBuf {
        self.root.join(format!("{}.json", tenant))
    }

    /// Load the tenant's adjacency document. Caller must hold the tenant lock.
    fn load_unlocked(&self, path: &Path, tenant: &str) -> Adjacency {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(_) => return Adjacency::new(),
        };
        match serde_json::from_slice(&raw) {
            Ok(adjacency) => adjacency,
            Err(e) => {
                // Corruption is recovered locally, never surfaced.
                warn!(tenant, error = %e, "graph document unparsable, treating as empty");
                Adjacency::new()
            }
        }
    }

    /// Atomically replace the tenant's document. Caller must hold the
    /// tenant's exclusive lock.
    fn replace_unlocked(&self, path: &Path, adjacency: &Adjacency) -> Result<(), SimlabError> {
        fs::create_dir_all(&self.root)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(adjacency)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Record a directed edge. Re-adding an existing edge is a no-op;
    /// a source's target list never contains the same target twice.
    pub fn add_edge(&self, tenant: &str, source: &str, target: &str) -> Result<(), SimlabError> {
        let path = self.document_path(tenant);
        self.locks
            .with_exclusive(tenant, self.lock_timeout, || {
                let mut adjacency = self.load_unlocked(&path, tenant);
                let targets = adjacency.entry(source.to_string()).or_default();
                if targets.iter().any(|t| t == target) {
                    debug!(tenant, source, target, "edge already present");
                    return Ok(());
                }
                targets.push(target.to_string());
                self.replace_unlocked(&path, &adjacency)
            })?
    }

    /// Out-edges of `source`, in insertion order. Unknown sources and
    /// missing documents read as empty.
    pub fn out_edges(&self, tenant: &str, source: &str) -> Result<Vec<String>, SimlabError> {
        let path = self.document_path(tenant);
        self.locks.with_shared(tenant, self.lock_timeout, || {
            self.load_unlocked(&path, tenant)
                .get(source)
                .cloned()
                .unwrap_or_default()
        })
    }

    /// Drop the tenant's whole document. Absent documents are fine.
    pub fn clear(&self, tenant: &str) -> Result<(), SimlabError> {
        let path = self.document_path(tenant);
        self.locks
            .with_exclusive(tenant, self.lock_timeout, || match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(SimlabError::Io(e)),
            })?
    }
}
