//! Append-only JSON lines record store.
//!
//! Layout of a store directory:
//!
//! ```text
//! <path>/
//!   store.meta.json   backend, dimension, schema version, count
//!   records.jsonl     one log entry per line
//! ```
//!
//! Every mutation appends a line. Loading replays the log; lines that fail to
//! parse are skipped. The log is rewritten with only live records when it
//! grows past twice the live count, on `clear`, and when upgrading from an
//! older schema.

use super::config::{
    check_store_compatibility, load_store_meta, write_store_meta, StoreCompatibility, StoreMeta,
};
use super::RecordStore;
use crate::error::{DbError, DbResult};
use crate::record::{SerializedRecord, VectorRecord};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, trace, warn};

/// Filename for the JSONL data file.
pub const DATA_FILENAME: &str = "records.jsonl";

const BACKEND_NAME: &str = "jsonl";

/// Slack before the log is compacted, on top of twice the live count.
const COMPACTION_SLACK: usize = 64;

/// Callback run after the on-disk data was migrated from schema `from` to `to`.
///
/// The migrated data and metadata are already written when the hook runs. An
/// error fails `open`; the hook is not run again on the next open.
pub type UpgradeHook = Arc<dyn Fn(u32, u32) -> DbResult<()> + Send + Sync>;

/// One line of the v2 log.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum LogEntry {
    Put(SerializedRecord),
    Delete { id: String },
}

/// State that only exists once the store is open.
struct OpenState {
    records: HashMap<String, VectorRecord>,
    file: File,
    /// Entries currently in the log, live or superseded.
    log_entries: usize,
    /// Current size of the data file.
    bytes: u64,
    meta: StoreMeta,
}

/// Durable record store over a JSONL append log.
pub struct JsonlRecordStore {
    path: PathBuf,
    dimension: usize,
    max_records: Option<usize>,
    max_bytes: Option<u64>,
    upgrade_hook: Option<UpgradeHook>,
    state: RwLock<Option<OpenState>>,
}

impl JsonlRecordStore {
    /// Create a store rooted at `path`. Nothing touches disk until `open`.
    pub fn new(path: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            path: path.into(),
            dimension,
            max_records: None,
            max_bytes: None,
            upgrade_hook: None,
            state: RwLock::new(None),
        }
    }

    /// Fail writes with `StorageFull` once `max_records` records are held.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    /// Fail writes with `StorageFull` when the data file would exceed `max_bytes`.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Run `hook` after an older store has been migrated on open.
    pub fn with_upgrade_hook(mut self, hook: UpgradeHook) -> Self {
        self.upgrade_hook = Some(hook);
        self
    }

    /// Store directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn data_path(&self) -> PathBuf {
        self.path.join(DATA_FILENAME)
    }

    fn incompatible(&self, reason: impl Into<String>) -> DbError {
        DbError::StoreIncompatible {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn not_open() -> DbError {
        DbError::NotOpen {
            backend: BACKEND_NAME.to_string(),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&OpenState) -> DbResult<T>) -> DbResult<T> {
        let guard = self
            .state
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))?;
        let state = guard.as_ref().ok_or_else(Self::not_open)?;
        f(state)
    }

    fn with_state_mut<T>(&self, f: impl FnOnce(&mut OpenState) -> DbResult<T>) -> DbResult<T> {
        let mut guard = self
            .state
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))?;
        let state = guard.as_mut().ok_or_else(Self::not_open)?;
        f(state)
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Replay the log into a map. Returns the records and the number of lines read.
    fn load_records(&self, schema_version: u32) -> DbResult<(HashMap<String, VectorRecord>, usize)> {
        let data_path = self.data_path();
        let mut records = HashMap::new();
        if !data_path.exists() {
            return Ok((records, 0));
        }

        debug!("Loading records from {:?} (schema v{})", data_path, schema_version);
        let file = File::open(&data_path).map_err(|e| DbError::store_io(&data_path, e))?;
        let reader = BufReader::new(file);
        let mut entries = 0;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| DbError::store_io(&data_path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            entries += 1;

            let applied = if schema_version < 2 {
                serde_json::from_str::<VectorRecord>(&line)
                    .map_err(|e| e.to_string())
                    .map(|record| {
                        records.insert(record.id.clone(), record);
                    })
            } else {
                match serde_json::from_str::<LogEntry>(&line) {
                    Ok(LogEntry::Put(serialized)) => serialized
                        .into_record()
                        .map_err(|e| e.to_string())
                        .map(|record| {
                            records.insert(record.id.clone(), record);
                        }),
                    Ok(LogEntry::Delete { id }) => {
                        records.remove(&id);
                        Ok(())
                    }
                    Err(e) => Err(e.to_string()),
                }
            };

            if let Err(e) = applied {
                debug!("Skipping invalid line {}: {}", line_num + 1, e);
            }
        }

        let dimension = self.dimension;
        records.retain(|id, record| {
            let ok = record.validate(dimension).is_ok();
            if !ok {
                warn!("Dropping record '{}' with an invalid vector", id);
            }
            ok
        });

        debug!("Loaded {} records from {} log entries", records.len(), entries);
        Ok((records, entries))
    }

    fn open_append(&self) -> DbResult<(File, u64)> {
        let data_path = self.data_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&data_path)
            .map_err(|e| DbError::store_io(&data_path, e))?;
        let bytes = file
            .metadata()
            .map_err(|e| DbError::store_io(&data_path, e))?
            .len();
        Ok((file, bytes))
    }

    // ------------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------------

    fn encode(entry: &LogEntry) -> DbResult<String> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        Ok(line)
    }

    /// Append `lines` in one write. On failure the file is truncated back so a
    /// partial line never precedes the next entry.
    fn append(&self, state: &mut OpenState, lines: &str, count: usize) -> DbResult<()> {
        let data_path = self.data_path();
        let result = state
            .file
            .write_all(lines.as_bytes())
            .and_then(|_| state.file.flush());

        if let Err(e) = result {
            if let Err(truncate_err) = state.file.set_len(state.bytes) {
                warn!("Failed to roll back partial write: {}", truncate_err);
            }
            return Err(DbError::store_io(&data_path, e));
        }

        state.bytes += lines.len() as u64;
        state.log_entries += count;
        trace!("Appended {} log entries", count);
        Ok(())
    }

    /// Make room for `extra` bytes, compacting once if that helps.
    fn ensure_capacity(&self, state: &mut OpenState, extra: u64) -> DbResult<()> {
        let Some(max) = self.max_bytes else {
            return Ok(());
        };
        if state.bytes + extra <= max {
            return Ok(());
        }
        if state.log_entries > state.records.len() {
            self.compact(state)?;
            if state.bytes + extra <= max {
                return Ok(());
            }
        }
        Err(DbError::storage_full(format!(
            "{} would exceed the {} byte limit",
            self.data_path().display(),
            max
        )))
    }

    fn ensure_record_slots(&self, state: &OpenState, new_records: usize) -> DbResult<()> {
        if let Some(max) = self.max_records {
            if state.records.len() + new_records > max {
                return Err(DbError::storage_full(format!(
                    "store holds the maximum of {} records",
                    max
                )));
            }
        }
        Ok(())
    }

    fn maybe_compact(&self, state: &mut OpenState) -> DbResult<()> {
        if state.log_entries > 2 * state.records.len() + COMPACTION_SLACK {
            self.compact(state)?;
        }
        Ok(())
    }

    /// Rewrite the log with one `put` per live record.
    fn compact(&self, state: &mut OpenState) -> DbResult<()> {
        let data_path = self.data_path();
        let tmp_path = self.path.join(format!("{}.tmp", DATA_FILENAME));
        debug!(
            "Compacting {:?}: {} entries, {} live",
            data_path,
            state.log_entries,
            state.records.len()
        );

        let mut records: Vec<&VectorRecord> = state.records.values().collect();
        records.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));

        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&Self::encode(&LogEntry::Put(record.to_serialized()))?);
        }

        let write_tmp = || -> std::io::Result<()> {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(buffer.as_bytes())?;
            tmp.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = fs::remove_file(&tmp_path);
            return Err(DbError::store_io(&tmp_path, e));
        }
        fs::rename(&tmp_path, &data_path).map_err(|e| DbError::store_io(&data_path, e))?;

        let (file, bytes) = self.open_append()?;
        state.file = file;
        state.bytes = bytes;
        state.log_entries = state.records.len();

        state.meta.update_count(state.records.len());
        write_store_meta(&self.path, &state.meta)
    }

    fn sorted(records: &HashMap<String, VectorRecord>) -> Vec<VectorRecord> {
        let mut all: Vec<VectorRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        all
    }

    fn batch_error(err: &DbError) -> DbError {
        match err {
            DbError::StorageFull { message } => DbError::storage_full(message.clone()),
            DbError::StoreIo { path, message } => DbError::StoreIo {
                path: path.clone(),
                message: message.clone(),
            },
            other => DbError::internal(other.to_string()),
        }
    }
}

impl RecordStore for JsonlRecordStore {
    fn open(&self) -> DbResult<()> {
        let mut guard = self
            .state
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))?;
        if guard.is_some() {
            return Ok(());
        }

        let (meta, upgrade) = match check_store_compatibility(&self.path, BACKEND_NAME, self.dimension)
        {
            StoreCompatibility::Compatible => (load_store_meta(&self.path)?, None),
            StoreCompatibility::NotFound => {
                info!("Record store not found, creating new store at {:?}", self.path);
                let meta = StoreMeta::new(BACKEND_NAME, self.dimension);
                write_store_meta(&self.path, &meta)?;
                (meta, None)
            }
            StoreCompatibility::NeedsUpgrade { from, to } => {
                info!("Upgrading record store at {:?} from v{} to v{}", self.path, from, to);
                (load_store_meta(&self.path)?, Some((from, to)))
            }
            StoreCompatibility::IncompatibleDimension { expected, actual } => {
                return Err(DbError::DimensionMismatch { expected, actual });
            }
            StoreCompatibility::IncompatibleBackend { expected, actual } => {
                return Err(self.incompatible(format!(
                    "Backend mismatch: expected '{}', found '{}'",
                    expected, actual
                )));
            }
            StoreCompatibility::NewerSchema { found, supported } => {
                return Err(self.incompatible(format!(
                    "Schema v{} is newer than the supported v{}",
                    found, supported
                )));
            }
            StoreCompatibility::Corrupted(msg) => {
                return Err(self.incompatible(format!("Store corrupted: {}", msg)));
            }
        };

        let (records, log_entries) = self.load_records(meta.schema_version)?;
        let (file, bytes) = self.open_append()?;
        let mut state = OpenState {
            records,
            file,
            log_entries,
            bytes,
            meta,
        };

        if let Some((from, to)) = upgrade {
            let migrate = |state: &mut OpenState| -> DbResult<()> {
                state.meta.schema_version = to;
                self.compact(state)?;
                if let Some(hook) = &self.upgrade_hook {
                    hook(from, to)?;
                }
                Ok(())
            };
            migrate(&mut state).map_err(|e| DbError::SchemaUpgrade {
                from,
                to,
                message: e.to_string(),
            })?;
        }

        info!(
            "Opened record store at {:?} with {} records",
            self.path,
            state.records.len()
        );
        *guard = Some(state);
        Ok(())
    }

    fn put(&self, record: &VectorRecord) -> DbResult<()> {
        record.validate(self.dimension)?;
        let line = Self::encode(&LogEntry::Put(record.to_serialized()))?;

        self.with_state_mut(|state| {
            if !state.records.contains_key(&record.id) {
                self.ensure_record_slots(state, 1)?;
            }
            self.ensure_capacity(state, line.len() as u64)?;
            self.append(state, &line, 1)?;
            state.records.insert(record.id.clone(), record.clone());
            self.maybe_compact(state)
        })
    }

    fn put_batch(&self, records: &[VectorRecord]) -> Vec<DbResult<()>> {
        let mut results: Vec<DbResult<()>> = Vec::with_capacity(records.len());
        let mut accepted = Vec::new();
        let mut written = false;

        let outcome = self.with_state_mut(|state| {
            let mut buffer = String::new();
            let mut new_ids = HashSet::new();
            for (i, record) in records.iter().enumerate() {
                let line = record
                    .validate(self.dimension)
                    .and_then(|_| Self::encode(&LogEntry::Put(record.to_serialized())));
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        results.push(Err(e));
                        continue;
                    }
                };
                if !state.records.contains_key(&record.id) && !new_ids.contains(&record.id) {
                    if let Err(e) = self.ensure_record_slots(state, new_ids.len() + 1) {
                        results.push(Err(e));
                        continue;
                    }
                    new_ids.insert(record.id.clone());
                }
                buffer.push_str(&line);
                accepted.push(i);
                results.push(Ok(()));
            }

            if accepted.is_empty() {
                return Ok(());
            }
            self.ensure_capacity(state, buffer.len() as u64)?;
            self.append(state, &buffer, accepted.len())?;
            written = true;
            for &i in &accepted {
                state.records.insert(records[i].id.clone(), records[i].clone());
            }
            self.maybe_compact(state)
        });

        match outcome {
            Ok(()) => results,
            Err(e) if results.is_empty() => records
                .iter()
                .map(|_| Err(Self::batch_error(&e)))
                .collect(),
            Err(e) if written => {
                warn!("Compaction after batch write failed: {}", e);
                results
            }
            Err(e) => {
                for &i in &accepted {
                    results[i] = Err(Self::batch_error(&e));
                }
                results
            }
        }
    }

    fn get(&self, id: &str) -> DbResult<Option<VectorRecord>> {
        self.with_state(|state| Ok(state.records.get(id).cloned()))
    }

    fn get_all(&self) -> DbResult<Vec<VectorRecord>> {
        self.with_state(|state| Ok(Self::sorted(&state.records)))
    }

    fn delete(&self, id: &str) -> DbResult<bool> {
        self.with_state_mut(|state| {
            if !state.records.contains_key(id) {
                return Ok(false);
            }
            let line = Self::encode(&LogEntry::Delete { id: id.to_string() })?;
            self.append(state, &line, 1)?;
            state.records.remove(id);
            self.maybe_compact(state)?;
            Ok(true)
        })
    }

    fn clear(&self) -> DbResult<()> {
        self.with_state_mut(|state| {
            let previous = std::mem::take(&mut state.records);
            if let Err(e) = self.compact(state) {
                state.records = previous;
                return Err(e);
            }
            info!("Cleared record store at {:?}", self.path);
            Ok(())
        })
    }

    fn len(&self) -> DbResult<usize> {
        self.with_state(|state| Ok(state.records.len()))
    }

    fn flush(&self) -> DbResult<()> {
        self.with_state_mut(|state| {
            state
                .file
                .sync_data()
                .map_err(|e| DbError::store_io(self.data_path(), e))?;
            state.meta.update_count(state.records.len());
            write_store_meta(&self.path, &state.meta)
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, x: f32) -> VectorRecord {
        VectorRecord::new(id, vec![x, 1.0 - x], format!("content {}", id))
    }

    #[test]
    fn test_requires_open() {
        let temp = TempDir::new().unwrap();
        let store = JsonlRecordStore::new(temp.path().join("store"), 2);
        assert!(matches!(store.len(), Err(DbError::NotOpen { .. })));
        assert!(matches!(
            store.put(&record("a", 0.5)),
            Err(DbError::NotOpen { .. })
        ));
    }

    #[test]
    fn test_log_replay_applies_deletes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store");
        {
            let store = JsonlRecordStore::new(&path, 2);
            store.open().unwrap();
            store.put(&record("a", 0.1)).unwrap();
            store.put(&record("b", 0.2)).unwrap();
            assert!(store.delete("a").unwrap());
        }

        let store = JsonlRecordStore::new(&path, 2);
        store.open().unwrap();
        assert!(store.get("a").unwrap().is_none());
        assert!(store.get("b").unwrap().is_some());
    }

    #[test]
    fn test_bad_lines_are_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store");
        {
            let store = JsonlRecordStore::new(&path, 2);
            store.open().unwrap();
            store.put(&record("a", 0.1)).unwrap();
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(path.join(DATA_FILENAME))
            .unwrap();
        writeln!(file, "{{not json").unwrap();

        let store = JsonlRecordStore::new(&path, 2);
        store.open().unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_put_batch_reports_each_item() {
        let temp = TempDir::new().unwrap();
        let store = JsonlRecordStore::new(temp.path().join("store"), 2).with_max_records(2);
        store.open().unwrap();

        let batch = vec![
            record("a", 0.1),
            VectorRecord::new("bad", vec![1.0], "wrong dimension"),
            record("b", 0.2),
            record("c", 0.3),
        ];
        let results = store.put_batch(&batch);

        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DbError::DimensionMismatch { .. })));
        assert!(results[2].is_ok());
        assert!(results[3].as_ref().unwrap_err().is_storage_full());
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_clear_truncates_log() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store");
        let store = JsonlRecordStore::new(&path, 2);
        store.open().unwrap();
        store.put(&record("a", 0.1)).unwrap();
        store.clear().unwrap();

        assert!(store.is_empty().unwrap());
        assert_eq!(fs::metadata(path.join(DATA_FILENAME)).unwrap().len(), 0);
    }
}
