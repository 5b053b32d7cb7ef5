// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CSV file backend
//!
//! Each log lives in `<dir>/data_port_<id>.csv` (short tier) or
//! `<dir>/data_port_<id>_long.csv` (long tier).
//!
//! A log is read from disk once, on first touch, and then kept in memory.
//! Appends that do not evict only add one line to the file. Appends that
//! evict rewrite the file into a temporary sibling and rename it over the old
//! one, so a reader sees either the previous or the new table, never a mix.

use super::{AppendOutcome, LogKey, RollingLog, RollingStore, Row, SchemaPolicy, SlotMap, Tier};
use crate::error::StoreError;
use crate::table;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Log state held under the per-key mutex.
#[derive(Debug, Default)]
struct CsvSlot {
    /// The file has been read (or found absent).
    loaded: bool,
    log: Option<RollingLog>,
    /// The file does not match `log` and must be rewritten on the next append.
    needs_rewrite: bool,
}

/// CSV rolling store.
pub struct CsvStore {
    dir: PathBuf,
    schema_policy: SchemaPolicy,
    slots: SlotMap<CsvSlot>,
}

impl CsvStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self {
            dir,
            schema_policy: SchemaPolicy::default(),
            slots: SlotMap::new(),
        })
    }

    /// Set the schema policy.
    pub fn with_schema_policy(mut self, policy: SchemaPolicy) -> Self {
        self.schema_policy = policy;
        self
    }

    /// Data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a log.
    pub fn file_name(key: LogKey) -> String {
        match key.tier {
            Tier::Short => format!("data_port_{}.csv", key.source_id),
            Tier::Long => format!("data_port_{}_long.csv", key.source_id),
        }
    }

    /// Full path of a log file.
    pub fn path_for(&self, key: LogKey) -> PathBuf {
        self.dir.join(Self::file_name(key))
    }
}

/// A log read back from disk.
struct LoadedLog {
    log: RollingLog,
    /// The file held a torn record or more rows than `capacity`.
    needs_rewrite: bool,
}

fn read_log(path: &Path, capacity: usize) -> Result<Option<LoadedLog>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let parsed = table::parse(&text);
    if parsed.torn_tail {
        tracing::warn!("Dropping torn trailing record in {}", path.display());
    }

    let mut records = parsed.records.into_iter();
    let Some(header) = records.next() else {
        return Ok(None);
    };

    let mut log = RollingLog::new(header, capacity);
    let mut trimmed = 0;
    for (i, record) in records.enumerate() {
        let row = Row::from_record(record).map_err(|reason| StoreError::Corrupt {
            path: path.to_path_buf(),
            record: i + 2,
            reason,
        })?;
        trimmed += log.push(row, capacity).evicted();
    }

    if trimmed > 0 {
        tracing::info!(
            "Trimmed {} rows from {} to capacity {}",
            trimmed,
            path.display(),
            capacity
        );
    }

    Ok(Some(LoadedLog {
        log,
        needs_rewrite: parsed.torn_tail || trimmed > 0,
    }))
}

/// Replace `path` with the full contents of `log`.
fn rewrite(path: &Path, log: &RollingLog) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        log.write_csv(&mut writer)
            .and_then(|()| writer.flush())
            .map_err(|e| StoreError::io(path, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(path, e))?;

    // Dropping `tmp` on any error above removes the temporary file
    tmp.persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}

/// File that a record can be appended to and cut back from.
trait AppendTarget: Write {
    /// Current length in bytes.
    fn end(&self) -> io::Result<u64>;

    /// Make appended bytes durable.
    fn sync(&mut self) -> io::Result<()>;

    /// Drop everything past `len`.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl AppendTarget for File {
    fn end(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_data()
    }
}

/// A failed single-record append.
#[derive(Debug)]
struct AppendFailure<E> {
    error: E,
    /// The file holds exactly what it held before the attempt.
    file_intact: bool,
}

/// Append `bytes`, cutting the file back to its old length on failure.
fn append_record<T: AppendTarget>(
    target: &mut T,
    bytes: &[u8],
) -> Result<(), AppendFailure<io::Error>> {
    let end = target.end().map_err(|error| AppendFailure {
        error,
        file_intact: true,
    })?;

    let Err(error) = target.write_all(bytes).and_then(|()| target.sync()) else {
        return Ok(());
    };

    let file_intact = match target.truncate(end) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Could not cut back partial record: {}", e);
            false
        }
    };
    Err(AppendFailure { error, file_intact })
}

/// Add one row to the end of an existing file.
fn append_line(path: &Path, row: &Row) -> Result<(), AppendFailure<StoreError>> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| AppendFailure {
            error: StoreError::io(path, e),
            file_intact: true,
        })?;

    append_record(&mut file, table::encode_record(&row.to_fields()).as_bytes()).map_err(
        |failure| AppendFailure {
            error: StoreError::io(path, failure.error),
            file_intact: failure.file_intact,
        },
    )
}

impl RollingStore for CsvStore {
    fn append(
        &self,
        key: LogKey,
        header: &[String],
        row: &Row,
        capacity: usize,
    ) -> Result<AppendOutcome, StoreError> {
        if capacity == 0 {
            return Err(StoreError::InvalidCapacity);
        }

        let path = self.path_for(key);
        let slot = self.slots.slot(key);
        let mut slot = slot.lock();

        if !slot.loaded {
            if let Some(loaded) = read_log(&path, capacity)? {
                slot.needs_rewrite = loaded.needs_rewrite;
                slot.log = Some(loaded.log);
            }
            slot.loaded = true;
        }

        let state = &mut *slot;
        let Some(log) = state.log.as_mut() else {
            let mut fresh = RollingLog::new(header.to_vec(), capacity);
            fresh.push(row.clone(), capacity);
            rewrite(&path, &fresh)?;
            tracing::info!("Created {} at {}", key, path.display());
            let rows = fresh.len();
            state.log = Some(fresh);
            state.needs_rewrite = false;
            return Ok(AppendOutcome {
                rows,
                evicted: 0,
                created: true,
            });
        };

        self.schema_policy.check(log.header(), header)?;

        let undo = log.push(row.clone(), capacity);
        let evicted = undo.evicted();
        let full_rewrite = evicted > 0 || state.needs_rewrite;

        let failure = if full_rewrite {
            // The temporary file only replaces the log once complete
            rewrite(&path, log).err().map(|error| AppendFailure {
                error,
                file_intact: true,
            })
        } else {
            append_line(&path, row).err()
        };

        let Some(failure) = failure else {
            state.needs_rewrite = false;
            tracing::debug!("Appended to {}: {} rows, {} evicted", key, log.len(), evicted);
            return Ok(AppendOutcome {
                rows: log.len(),
                evicted,
                created: false,
            });
        };

        log.undo(undo);
        if !failure.file_intact {
            // A partial record is on disk; put back the last good table
            if let Err(e) = rewrite(&path, log) {
                tracing::warn!("Could not restore {}: {}", path.display(), e);
                state.needs_rewrite = true;
            }
        }
        Err(failure.error)
    }

    fn load(&self, key: LogKey) -> Result<Option<RollingLog>, StoreError> {
        if let Some(slot) = self.slots.get(key) {
            let slot = slot.lock();
            if slot.loaded {
                return Ok(slot.log.clone());
            }
        }
        Ok(read_log(&self.path_for(key), usize::MAX)?.map(|loaded| loaded.log))
    }

    fn schema_policy(&self) -> SchemaPolicy {
        self.schema_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::Reading;
    use tempfile::tempdir;

    fn header() -> Vec<String> {
        vec!["DateTime".into(), "temp".into(), "hum".into()]
    }

    fn row(i: usize) -> Row {
        Row::new(
            format!("2026-01-01 00:00:{:02}", i),
            vec![Reading::Value(i as f64), Reading::Missing],
        )
    }

    #[test]
    fn test_file_names() {
        assert_eq!(
            CsvStore::file_name(LogKey::new(8092, Tier::Short)),
            "data_port_8092.csv"
        );
        assert_eq!(
            CsvStore::file_name(LogKey::new(8092, Tier::Long)),
            "data_port_8092_long.csv"
        );
    }

    #[test]
    fn test_first_append_writes_header_and_row() {
        let dir = tempdir().expect("tempdir");
        let store = CsvStore::new(dir.path()).expect("store");
        let key = LogKey::new(1, Tier::Short);

        let outcome = store.append(key, &header(), &row(0), 10).expect("append");
        assert!(outcome.created);
        assert_eq!(outcome.rows, 1);

        let text = fs::read_to_string(store.path_for(key)).expect("read");
        assert_eq!(text, "DateTime,temp,hum\n2026-01-01 00:00:00,0,nan\n");
    }

    #[test]
    fn test_file_is_capped() {
        let dir = tempdir().expect("tempdir");
        let store = CsvStore::new(dir.path()).expect("store");
        let key = LogKey::new(1, Tier::Short);

        for i in 0..15 {
            store.append(key, &header(), &row(i), 10).expect("append");
        }

        let text = fs::read_to_string(store.path_for(key)).expect("read");
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "DateTime,temp,hum");
        assert!(lines[1].starts_with("2026-01-01 00:00:05,"));
        assert!(lines[10].starts_with("2026-01-01 00:00:14,"));
    }

    #[test]
    fn test_reopen_continues_existing_log() {
        let dir = tempdir().expect("tempdir");
        let key = LogKey::new(7, Tier::Long);
        {
            let store = CsvStore::new(dir.path()).expect("store");
            for i in 0..3 {
                store.append(key, &header(), &row(i), 5).expect("append");
            }
        }

        let store = CsvStore::new(dir.path()).expect("store");
        let other = vec!["DateTime".to_string(), "x".to_string()];
        for i in 3..7 {
            // Header from the first write wins
            store.append(key, &other, &row(i), 5).expect("append");
        }

        let log = store.load(key).expect("load").expect("log");
        assert_eq!(log.header(), header().as_slice());
        assert_eq!(log.len(), 5);
        assert_eq!(log.rows().next().unwrap().observed_at, "2026-01-01 00:00:02");
    }

    #[test]
    fn test_torn_tail_is_dropped_and_rewritten() {
        let dir = tempdir().expect("tempdir");
        let store = CsvStore::new(dir.path()).expect("store");
        let key = LogKey::new(3, Tier::Short);
        fs::write(
            store.path_for(key),
            "DateTime,temp,hum\n2026-01-01 00:00:00,1,2\n2026-01-01 00:0",
        )
        .expect("seed");

        store.append(key, &header(), &row(9), 10).expect("append");

        let text = fs::read_to_string(store.path_for(key)).expect("read");
        assert_eq!(
            text,
            "DateTime,temp,hum\n2026-01-01 00:00:00,1,2\n2026-01-01 00:00:09,9,nan\n"
        );
    }

    #[test]
    fn test_corrupt_row_is_reported() {
        let dir = tempdir().expect("tempdir");
        let store = CsvStore::new(dir.path()).expect("store");
        let key = LogKey::new(4, Tier::Short);
        fs::write(store.path_for(key), "DateTime,temp\nt0,banana\n").expect("seed");

        let err = store
            .append(key, &header(), &row(0), 10)
            .expect_err("corrupt");
        assert!(matches!(err, StoreError::Corrupt { record: 2, .. }));
    }

    #[test]
    fn test_oversized_file_is_trimmed_on_load() {
        let dir = tempdir().expect("tempdir");
        let store = CsvStore::new(dir.path()).expect("store");
        let key = LogKey::new(5, Tier::Short);
        let mut seed = String::from("DateTime,temp\n");
        for i in 0..20 {
            seed.push_str(&format!("t{},{}\n", i, i));
        }
        fs::write(store.path_for(key), seed).expect("seed");

        let outcome = store
            .append(key, &["DateTime".into(), "temp".into()], &row(99), 10)
            .expect("append");
        assert_eq!(outcome.rows, 10);

        let text = fs::read_to_string(store.path_for(key)).expect("read");
        assert_eq!(text.lines().count(), 11);
        assert!(text.lines().nth(1).unwrap().starts_with("t11,"));
    }

    #[test]
    fn test_schema_reject_leaves_log_unchanged() {
        let dir = tempdir().expect("tempdir");
        let store = CsvStore::new(dir.path())
            .expect("store")
            .with_schema_policy(SchemaPolicy::Reject);
        let key = LogKey::new(6, Tier::Short);

        store.append(key, &header(), &row(0), 10).expect("append");
        let before = fs::read_to_string(store.path_for(key)).expect("read");

        let other = vec!["DateTime".to_string(), "pressure".to_string()];
        let err = store.append(key, &other, &row(1), 10).expect_err("reject");
        assert!(matches!(err, StoreError::SchemaMismatch { .. }));

        let after = fs::read_to_string(store.path_for(key)).expect("read");
        assert_eq!(before, after);
        assert_eq!(store.load(key).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let store = CsvStore::new(dir.path()).expect("store");
        let err = store
            .append(LogKey::new(1, Tier::Short), &header(), &row(0), 0)
            .expect_err("capacity");
        assert!(matches!(err, StoreError::InvalidCapacity));
    }

    #[test]
    fn test_load_without_prior_append_reads_disk() {
        let dir = tempdir().expect("tempdir");
        let store = CsvStore::new(dir.path()).expect("store");
        let key = LogKey::new(11, Tier::Long);
        assert!(store.load(key).expect("load").is_none());

        fs::write(store.path_for(key), "DateTime,a\nt0,1\nt1,nan\n").expect("seed");
        let log = store.load(key).expect("load").expect("log");
        assert_eq!(log.len(), 2);
        assert!(log.newest().unwrap().values[0].is_missing());
    }

    /// In-memory file that runs out of space after `room` more bytes.
    struct FullDisk {
        data: Vec<u8>,
        room: usize,
        can_truncate: bool,
    }

    impl FullDisk {
        fn new(seed: &[u8], room: usize, can_truncate: bool) -> Self {
            Self {
                data: seed.to_vec(),
                room,
                can_truncate,
            }
        }
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.room == 0 {
                return Err(io::Error::other("no space left on device"));
            }
            let n = buf.len().min(self.room);
            self.data.extend_from_slice(&buf[..n]);
            self.room -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AppendTarget for FullDisk {
        fn end(&self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            if !self.can_truncate {
                return Err(io::Error::other("read-only file system"));
            }
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    const SEED: &[u8] = b"DateTime,temp,hum\n2026-01-01 00:00:00,0,nan\n";

    fn record(i: usize) -> String {
        table::encode_record(&row(i).to_fields())
    }

    #[test]
    fn test_partial_record_is_cut_back() {
        let mut disk = FullDisk::new(SEED, 10, true);

        let failure = append_record(&mut disk, record(1).as_bytes()).expect_err("disk full");
        assert!(failure.file_intact);
        assert_eq!(disk.data, SEED);
    }

    #[test]
    fn test_partial_record_reported_when_cut_back_fails() {
        let mut disk = FullDisk::new(SEED, 10, false);

        let failure = append_record(&mut disk, record(1).as_bytes()).expect_err("disk full");
        assert!(!failure.file_intact);
        assert_eq!(disk.data.len(), SEED.len() + 10);
    }

    #[test]
    fn test_record_appended_when_room() {
        let mut disk = FullDisk::new(SEED, 1024, true);

        append_record(&mut disk, record(1).as_bytes()).expect("append");
        let text = String::from_utf8(disk.data).expect("utf8");
        assert!(text.ends_with("2026-01-01 00:00:01,1,nan\n"));
        assert!(!table::parse(&text).torn_tail);
    }

    fn timestamps(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .expect("read")
            .lines()
            .skip(1)
            .map(|line| line[..19].to_string())
            .collect()
    }

    #[test]
    fn test_failed_append_leaves_file_unchanged() {
        let dir = tempdir().expect("tempdir");
        let store = CsvStore::new(dir.path()).expect("store");
        let key = LogKey::new(12, Tier::Long);
        for i in 0..3 {
            store.append(key, &header(), &row(i), 1000).expect("append");
        }
        let path = store.path_for(key);
        let before = fs::read(&path).expect("read");

        // A directory in place of the log makes the append fail
        let aside = dir.path().join("aside.csv");
        fs::rename(&path, &aside).expect("move log aside");
        fs::create_dir(&path).expect("block log path");

        let err = store
            .append(key, &header(), &row(3), 1000)
            .expect_err("blocked");
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(store.load(key).expect("load").expect("log").len(), 3);

        fs::remove_dir(&path).expect("unblock");
        fs::rename(&aside, &path).expect("restore log");
        assert_eq!(fs::read(&path).expect("read"), before);

        let outcome = store.append(key, &header(), &row(4), 1000).expect("append");
        assert_eq!(outcome.rows, 4);
        assert_eq!(
            timestamps(&path),
            [
                "2026-01-01 00:00:00",
                "2026-01-01 00:00:01",
                "2026-01-01 00:00:02",
                "2026-01-01 00:00:04"
            ]
        );
    }

    #[test]
    fn test_failed_rewrite_keeps_previous_rows() {
        let root = tempdir().expect("tempdir");
        let data = root.path().join("data");
        let store = CsvStore::new(&data).expect("store");
        let key = LogKey::new(13, Tier::Short);
        for i in 0..3 {
            store.append(key, &header(), &row(i), 3).expect("append");
        }
        let path = store.path_for(key);
        let before = fs::read(&path).expect("read");

        // Without its directory the temporary file cannot be created
        let aside = root.path().join("aside");
        fs::rename(&data, &aside).expect("move dir aside");

        let err = store.append(key, &header(), &row(3), 3).expect_err("no dir");
        assert!(matches!(err, StoreError::Io { .. }));

        let log = store.load(key).expect("load").expect("log");
        let times: Vec<_> = log.rows().map(|r| r.observed_at.as_str()).collect();
        assert_eq!(
            times,
            [
                "2026-01-01 00:00:00",
                "2026-01-01 00:00:01",
                "2026-01-01 00:00:02"
            ]
        );

        fs::rename(&aside, &data).expect("restore dir");
        assert_eq!(fs::read(&path).expect("read"), before);

        let outcome = store.append(key, &header(), &row(4), 3).expect("append");
        assert_eq!(outcome.evicted, 1);
        assert_eq!(
            timestamps(&path),
            [
                "2026-01-01 00:00:01",
                "2026-01-01 00:00:02",
                "2026-01-01 00:00:04"
            ]
        );
    }
}
