//! Thread-safe record store with atomic JSON persistence
//!
//! The store owns the authoritative in-memory index and its durable on-disk
//! mirror. Two locks guard related state on purpose: the index `RwLock`
//! serves the hot read path, while a separate persistence `Mutex` serializes
//! disk writes so a slow persist never blocks readers of fresh in-memory
//! state. Each mutation snapshots the full index and its new generation
//! under the exclusive index lock, then persists outside it; a persist
//! attempt that arrives after a newer generation has already been written is
//! skipped, so out-of-order completion of concurrent persists can never
//! downgrade the file.
//!
//! When a reload interval is configured, a background thread watches the
//! file's modification time and folds external edits back into memory,
//! re-checking for in-flight mutations before swapping the index.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use serde_derive::{Deserialize, Serialize};

use crate::dns::errors::StoreError;
use crate::dns::record::{Record, RecordType};

type Result<T> = std::result::Result<T, StoreError>;

/// Controls which mutation operations the store permits.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SyncPolicy {
    /// Full CRUD operations (default).
    Sync,
    /// Only creating new records.
    CreateOnly,
    /// Only updating existing records.
    UpdateOnly,
    /// Creating and updating, but not deleting.
    UpsertOnly,
}

impl SyncPolicy {
    fn allows_create(&self) -> bool {
        *self != SyncPolicy::UpdateOnly
    }

    fn allows_update(&self) -> bool {
        *self != SyncPolicy::CreateOnly
    }

    fn allows_delete(&self) -> bool {
        *self == SyncPolicy::Sync
    }
}

impl Default for SyncPolicy {
    fn default() -> SyncPolicy {
        SyncPolicy::Sync
    }
}

impl FromStr for SyncPolicy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<SyncPolicy> {
        match s.to_lowercase().as_str() {
            "sync" | "crud" => Ok(SyncPolicy::Sync),
            "create-only" => Ok(SyncPolicy::CreateOnly),
            "update-only" => Ok(SyncPolicy::UpdateOnly),
            "upsert-only" => Ok(SyncPolicy::UpsertOnly),
            _ => Err(StoreError::UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SyncPolicy::Sync => "sync",
            SyncPolicy::CreateOnly => "create-only",
            SyncPolicy::UpdateOnly => "update-only",
            SyncPolicy::UpsertOnly => "upsert-only",
        };
        f.write_str(s)
    }
}

/// Construction-time options, supplied by the configuration layer.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Maximum number of records the store will hold; 0 means unlimited.
    pub max_records: usize,
    /// Mutation policy.
    pub policy: SyncPolicy,
}

/// JSON envelope for persisted records.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    records: Vec<Record>,
}

/// Index state guarded by the store's reader/writer lock.
///
/// `generation` counts completed mutations and is only touched under the
/// exclusive lock. `last_mod` is the file modification time the store last
/// observed, used to tell self-authored writes from external edits.
#[derive(Default)]
struct Index {
    records: HashMap<String, Vec<Record>>,
    generation: u64,
    last_mod: Option<SystemTime>,
}

impl Index {
    fn count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    fn collect(&self) -> Vec<Record> {
        let mut all = Vec::with_capacity(self.count());
        for recs in self.records.values() {
            all.extend(recs.iter().cloned());
        }
        all
    }

    fn replace_from(&mut self, file: StoreFile) {
        let mut records: HashMap<String, Vec<Record>> = HashMap::new();
        for r in file.records {
            records.entry(r.key()).or_default().push(r);
        }
        self.records = records;
    }
}

/// Holds DNS records in memory with durable JSON file backing.
pub struct RecordStore {
    index: RwLock<Index>,
    /// Serializes file writes, independent of the index lock.
    persist_lock: Mutex<()>,
    /// Generation of the last successful persist. Written only while
    /// `persist_lock` is held.
    persisted: AtomicU64,
    path: PathBuf,
    reload: Duration,
    max_records: usize,
    policy: SyncPolicy,
    ready: AtomicBool,
    stop_tx: Mutex<Option<Sender<()>>>,
    tmp_seq: AtomicU64,
}

impl RecordStore {
    /// Opens a store backed by the given file path.
    ///
    /// If the file exists its records are loaded; otherwise an empty file is
    /// created. A zero `reload` interval disables the reconciliation thread.
    pub fn open<P: AsRef<Path>>(
        path: P,
        reload: Duration,
        options: StoreOptions,
    ) -> Result<Arc<RecordStore>> {
        let store = Arc::new(RecordStore {
            index: RwLock::new(Index::default()),
            persist_lock: Mutex::new(()),
            persisted: AtomicU64::new(0),
            path: path.as_ref().to_path_buf(),
            reload,
            max_records: options.max_records,
            policy: options.policy,
            ready: AtomicBool::new(false),
            stop_tx: Mutex::new(None),
            tmp_seq: AtomicU64::new(0),
        });

        store.load_or_create()?;
        store.ready.store(true, Ordering::Release);

        if reload > Duration::from_secs(0) {
            let (tx, rx) = mpsc::channel();
            spawn_reload_thread(&store, rx)?;
            *store.stop_tx.lock() = Some(tx);
        }

        Ok(store)
    }

    /// Reports whether the store has completed initial loading.
    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Terminates the reconciliation thread. Idempotent.
    pub fn stop(&self) {
        self.stop_tx.lock().take();
    }

    /// The path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The active mutation policy.
    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Returns records matching the given FQDN and record type. The name is
    /// matched case-insensitively; an absent name yields an empty vec.
    pub fn get(&self, name: &str, rtype: RecordType) -> Vec<Record> {
        let index = self.index.read();
        match index.records.get(&name.to_lowercase()) {
            Some(recs) => recs.iter().filter(|r| r.rtype == rtype).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Returns all records for the given FQDN regardless of type.
    pub fn get_all(&self, name: &str) -> Vec<Record> {
        let index = self.index.read();
        index
            .records
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Returns every record in the store as a flat vec.
    pub fn list(&self) -> Vec<Record> {
        self.index.read().collect()
    }

    /// Total number of records held.
    pub fn count(&self) -> usize {
        self.index.read().count()
    }

    /// Adds or updates a record. Matching is done on name+type+value; an
    /// update replaces the matching record in place. The file is persisted
    /// atomically after the operation.
    pub fn upsert(&self, mut record: Record) -> Result<()> {
        record.validate()?;
        let (snapshot, gen) = self.apply_upsert(record)?;
        self.persist_snapshot(snapshot, gen)
    }

    fn apply_upsert(&self, record: Record) -> Result<(Vec<Record>, u64)> {
        let mut index = self.index.write();

        let key = record.key();
        let pos = index.records.get(&key).and_then(|recs| {
            recs.iter()
                .position(|r| r.rtype == record.rtype && r.value == record.value)
        });

        // Policy and capacity checks before any mutation
        match pos {
            Some(_) if !self.policy.allows_update() => {
                return Err(StoreError::PolicyDenied {
                    operation: "update",
                    name: record.name,
                    rtype: Some(record.rtype),
                });
            }
            None if !self.policy.allows_create() => {
                return Err(StoreError::PolicyDenied {
                    operation: "create",
                    name: record.name,
                    rtype: Some(record.rtype),
                });
            }
            _ => {}
        }
        if pos.is_none() && self.max_records > 0 && index.count() >= self.max_records {
            return Err(StoreError::CapacityExceeded {
                limit: self.max_records,
            });
        }

        match pos {
            Some(i) => {
                if let Some(recs) = index.records.get_mut(&key) {
                    recs[i] = record;
                }
            }
            None => index.records.entry(key).or_default().push(record),
        }

        index.generation += 1;
        Ok((index.collect(), index.generation))
    }

    /// Removes the record identified by name, type, and value. Removing an
    /// absent record succeeds without altering anything else.
    pub fn delete(&self, name: &str, rtype: RecordType, value: &str) -> Result<()> {
        let (snapshot, gen) = self.apply_delete(name, Some(rtype), Some(value))?;
        self.persist_snapshot(snapshot, gen)
    }

    /// Removes every record under `name` with the given type as a single
    /// mutation: one lock acquisition, one persisted generation.
    pub fn delete_by_type(&self, name: &str, rtype: RecordType) -> Result<()> {
        let (snapshot, gen) = self.apply_delete(name, Some(rtype), None)?;
        self.persist_snapshot(snapshot, gen)
    }

    /// Removes every record under `name`.
    pub fn delete_all(&self, name: &str) -> Result<()> {
        let (snapshot, gen) = self.apply_delete(name, None, None)?;
        self.persist_snapshot(snapshot, gen)
    }

    fn apply_delete(
        &self,
        name: &str,
        rtype: Option<RecordType>,
        value: Option<&str>,
    ) -> Result<(Vec<Record>, u64)> {
        if !self.policy.allows_delete() {
            return Err(StoreError::PolicyDenied {
                operation: "delete",
                name: name.to_string(),
                rtype,
            });
        }

        let mut index = self.index.write();
        let key = name.to_lowercase();

        match (rtype, value) {
            (None, _) => {
                index.records.remove(&key);
            }
            (Some(t), v) => {
                if let Some(recs) = index.records.get_mut(&key) {
                    recs.retain(|r| match v {
                        Some(v) => !(r.rtype == t && r.value == v),
                        None => r.rtype != t,
                    });
                    if recs.is_empty() {
                        index.records.remove(&key);
                    }
                }
            }
        }

        index.generation += 1;
        Ok((index.collect(), index.generation))
    }

    /// Writes the given snapshot to the backing file atomically.
    ///
    /// Serialized by the persistence lock; a snapshot older than the last
    /// persisted generation is skipped, never written. Must not be called
    /// with the index lock held.
    fn persist_snapshot(&self, all: Vec<Record>, gen: u64) -> Result<()> {
        let _guard = self.persist_lock.lock();

        // A newer snapshot was already written; this one is stale. Safe to
        // read `persisted` without the index lock: the persistence lock
        // serializes every writer of it.
        if gen > 0 && gen <= self.persisted.load(Ordering::Acquire) {
            return Ok(());
        }

        let raw = serde_json::to_vec_pretty(&StoreFile { records: all })?;
        self.write_atomic(&raw)?;

        // Update metadata under the index lock so the reconciliation thread
        // never mistakes this write for an external edit.
        let mut index = self.index.write();
        self.persisted.store(gen, Ordering::Release);
        if let Ok(modified) = fs::metadata(&self.path).and_then(|m| m.modified()) {
            index.last_mod = Some(modified);
        }

        Ok(())
    }

    /// Writes `raw` to a fresh temp file in the target's directory, then
    /// renames it over the target. The target is always either the previous
    /// complete state or the new complete state.
    fn write_atomic(&self, raw: &[u8]) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = dir.join(format!(
            ".dynrec-{}-{}.json.tmp",
            process::id(),
            self.tmp_seq.fetch_add(1, Ordering::Relaxed)
        ));

        let result = fs::File::create(&tmp)
            .and_then(|mut f| f.write_all(raw))
            .and_then(|_| fs::rename(&tmp, &self.path));

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::Persistence(e));
        }
        Ok(())
    }

    /// Loads records from the file, or creates an empty file when absent.
    fn load_or_create(&self) -> Result<()> {
        match fs::read(&self.path) {
            Ok(raw) => {
                let mut index = self.index.write();
                self.apply_bytes(&mut index, &raw)
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.persist_snapshot(Vec::new(), 0)
            }
            Err(e) => Err(StoreError::Persistence(e)),
        }
    }

    /// Parses `raw` and replaces the index contents. Records the file's
    /// current modification time. Caller must hold the exclusive index lock.
    fn apply_bytes(&self, index: &mut Index, raw: &[u8]) -> Result<()> {
        let file: StoreFile = serde_json::from_slice(raw)?;
        index.replace_from(file);
        if let Ok(modified) = fs::metadata(&self.path).and_then(|m| m.modified()) {
            index.last_mod = Some(modified);
        }
        Ok(())
    }

    /// One reconciliation tick: reload the file if it changed externally and
    /// no mutation is pending or in flight.
    fn check_reload(&self) {
        // Skip while a persist is actively running; memory is about to
        // change anyway.
        match self.persist_lock.try_lock() {
            Some(guard) => drop(guard),
            None => return,
        }

        // Phase 1: cheap checks under the shared lock.
        let last_mod = {
            let index = self.index.read();
            if index.generation > self.persisted.load(Ordering::Acquire) {
                return;
            }
            index.last_mod
        };

        let modified = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => return,
        };
        if let Some(lm) = last_mod {
            if modified <= lm {
                return;
            }
        }

        // Phase 2: read the file outside any lock.
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("reload {}: read error: {}", self.path.display(), e);
                return;
            }
        };

        // Phase 3: re-verify under the exclusive lock and swap. A mutation
        // that landed during the unlocked read must not be discarded.
        let mut index = self.index.write();
        if index.generation > self.persisted.load(Ordering::Acquire) {
            return;
        }
        if let Some(lm) = index.last_mod {
            if modified <= lm {
                return;
            }
        }

        if let Err(e) = self.apply_bytes(&mut index, &raw) {
            log::error!("reload {}: parse error: {}", self.path.display(), e);
        } else {
            log::info!(
                "reload {}: applied external edit ({} records)",
                self.path.display(),
                index.count()
            );
        }
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns the reconciliation thread. It holds only a weak reference, so
/// dropping the last `Arc` ends it as surely as an explicit `stop()`.
fn spawn_reload_thread(store: &Arc<RecordStore>, rx: Receiver<()>) -> Result<()> {
    let weak: Weak<RecordStore> = Arc::downgrade(store);
    let interval = store.reload;

    thread::Builder::new()
        .name("dynrec-reload".to_string())
        .spawn(move || loop {
            match rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => match weak.upgrade() {
                    Some(store) => store.check_reload(),
                    None => return,
                },
                // Stop signal or sender dropped.
                _ => return,
            }
        })
        .map_err(StoreError::Persistence)?;

    Ok(())
}
