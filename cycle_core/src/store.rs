//! Per-user persistence.
//!
//! [`UserStore`] is the storage seam the engine talks to. [`FileStore`] keeps
//! each user's data under `<data_dir>/users/<username>/`:
//!
//! | file                     | kind          | contents                      |
//! |--------------------------|---------------|-------------------------------|
//! | `cycle.json`             | document      | latest [`Cycle`] record       |
//! | `plan.json`              | document      | active [`WorkoutPlan`]        |
//! | `completions.json`       | document      | completion marker strings     |
//! | `meta.json`              | document      | [`MigrationState`]            |
//! | `cycle_history.jsonl`    | append-only   | [`CycleHistoryEntry`]         |
//! | `exercise_history.jsonl` | append-only   | [`CycleExerciseHistory`]      |
//! | `stats.jsonl`            | append-only   | [`ExerciseStats`]             |
//! | `body.jsonl`             | append-only   | [`BodyMeasurement`]           |
//!
//! Documents are replaced atomically (temp file, fsync, rename). A document
//! that cannot be read or parsed is treated as absent. Unparsable lines in an
//! append-only log are skipped.

use crate::{
    BodyMeasurement, Cycle, CycleExerciseHistory, CycleHistoryEntry, Error, ExerciseStats,
    MigrationState, Result, WorkoutPlan,
};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Exclusive hold on a user's data, released on drop
#[derive(Debug, Default)]
pub struct UserGuard {
    file: Option<File>,
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            let _ = file.unlock();
        }
    }
}

/// Storage for one user's cycle, plan, markers, and logs
pub trait UserStore: Send + Sync {
    /// Exclusive access to `username`'s data across processes
    fn lock_user(&self, username: &str) -> Result<UserGuard>;

    fn load_cycle(&self, username: &str) -> Result<Option<Cycle>>;
    fn save_cycle(&self, username: &str, cycle: &Cycle) -> Result<()>;
    fn clear_cycle(&self, username: &str) -> Result<()>;

    fn load_plan(&self, username: &str) -> Result<Option<WorkoutPlan>>;
    fn save_plan(&self, username: &str, plan: &WorkoutPlan) -> Result<()>;
    fn clear_plan(&self, username: &str) -> Result<()>;

    fn load_cycle_history(&self, username: &str) -> Result<Vec<CycleHistoryEntry>>;
    fn append_cycle_history(&self, username: &str, entry: &CycleHistoryEntry) -> Result<()>;

    fn load_completion_markers(&self, username: &str) -> Result<BTreeSet<String>>;
    fn replace_completion_markers(&self, username: &str, markers: &BTreeSet<String>)
        -> Result<()>;

    fn set_completion_marker(&self, username: &str, key: &str) -> Result<()> {
        let mut markers = self.load_completion_markers(username)?;
        if markers.insert(key.to_string()) {
            self.replace_completion_markers(username, &markers)?;
        }
        Ok(())
    }

    fn clear_completion_marker(&self, username: &str, key: &str) -> Result<()> {
        let mut markers = self.load_completion_markers(username)?;
        if markers.remove(key) {
            self.replace_completion_markers(username, &markers)?;
        }
        Ok(())
    }

    fn clear_completion_markers(&self, username: &str) -> Result<()> {
        self.replace_completion_markers(username, &BTreeSet::new())
    }

    fn load_exercise_stats_log(&self, username: &str) -> Result<Vec<ExerciseStats>>;
    fn append_exercise_stats(&self, username: &str, stats: &ExerciseStats) -> Result<()>;
    fn clear_exercise_stats(&self, username: &str) -> Result<()>;

    fn load_cycle_exercise_history(&self, username: &str) -> Result<Vec<CycleExerciseHistory>>;
    fn append_cycle_exercise_history(
        &self,
        username: &str,
        entry: &CycleExerciseHistory,
    ) -> Result<()>;

    fn load_body_measurements(&self, username: &str) -> Result<Vec<BodyMeasurement>>;
    fn append_body_measurement(&self, username: &str, measurement: &BodyMeasurement)
        -> Result<()>;

    fn load_migration_state(&self, username: &str) -> Result<MigrationState>;
    fn save_migration_state(&self, username: &str, state: &MigrationState) -> Result<()>;
}

/// Check that a username is safe to use as a directory name
pub fn validate_username(username: &str) -> Result<()> {
    let valid = !username.is_empty()
        && !username.starts_with('.')
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(Error::Precondition(format!(
            "invalid username '{}': use letters, digits, '-', '_' or '.'",
            username
        )))
    }
}

/// JSON-file backed store
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
        }
    }

    /// Directory holding `username`'s files
    pub fn user_dir(&self, username: &str) -> Result<PathBuf> {
        validate_username(username)?;
        Ok(self.root.join("users").join(username))
    }

    fn path(&self, username: &str, file: &str) -> Result<PathBuf> {
        Ok(self.user_dir(username)?.join(file))
    }
}

impl UserStore for FileStore {
    fn lock_user(&self, username: &str) -> Result<UserGuard> {
        let dir = self.user_dir(username)?;
        std::fs::create_dir_all(&dir)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(dir.join(".lock"))?;
        file.lock_exclusive()?;

        Ok(UserGuard { file: Some(file) })
    }

    fn load_cycle(&self, username: &str) -> Result<Option<Cycle>> {
        load_document(&self.path(username, "cycle.json")?)
    }

    fn save_cycle(&self, username: &str, cycle: &Cycle) -> Result<()> {
        save_document(&self.path(username, "cycle.json")?, cycle)
    }

    fn clear_cycle(&self, username: &str) -> Result<()> {
        remove_document(&self.path(username, "cycle.json")?)
    }

    fn load_plan(&self, username: &str) -> Result<Option<WorkoutPlan>> {
        load_document(&self.path(username, "plan.json")?)
    }

    fn save_plan(&self, username: &str, plan: &WorkoutPlan) -> Result<()> {
        save_document(&self.path(username, "plan.json")?, plan)
    }

    fn clear_plan(&self, username: &str) -> Result<()> {
        remove_document(&self.path(username, "plan.json")?)
    }

    fn load_cycle_history(&self, username: &str) -> Result<Vec<CycleHistoryEntry>> {
        read_records(&self.path(username, "cycle_history.jsonl")?)
    }

    fn append_cycle_history(&self, username: &str, entry: &CycleHistoryEntry) -> Result<()> {
        append_record(&self.path(username, "cycle_history.jsonl")?, entry)
    }

    fn load_completion_markers(&self, username: &str) -> Result<BTreeSet<String>> {
        Ok(load_document(&self.path(username, "completions.json")?)?.unwrap_or_default())
    }

    fn replace_completion_markers(
        &self,
        username: &str,
        markers: &BTreeSet<String>,
    ) -> Result<()> {
        let path = self.path(username, "completions.json")?;
        if markers.is_empty() {
            remove_document(&path)
        } else {
            save_document(&path, markers)
        }
    }

    fn load_exercise_stats_log(&self, username: &str) -> Result<Vec<ExerciseStats>> {
        read_records(&self.path(username, "stats.jsonl")?)
    }

    fn append_exercise_stats(&self, username: &str, stats: &ExerciseStats) -> Result<()> {
        append_record(&self.path(username, "stats.jsonl")?, stats)
    }

    fn clear_exercise_stats(&self, username: &str) -> Result<()> {
        remove_document(&self.path(username, "stats.jsonl")?)
    }

    fn load_cycle_exercise_history(&self, username: &str) -> Result<Vec<CycleExerciseHistory>> {
        read_records(&self.path(username, "exercise_history.jsonl")?)
    }

    fn append_cycle_exercise_history(
        &self,
        username: &str,
        entry: &CycleExerciseHistory,
    ) -> Result<()> {
        append_record(&self.path(username, "exercise_history.jsonl")?, entry)
    }

    fn load_body_measurements(&self, username: &str) -> Result<Vec<BodyMeasurement>> {
        read_records(&self.path(username, "body.jsonl")?)
    }

    fn append_body_measurement(
        &self,
        username: &str,
        measurement: &BodyMeasurement,
    ) -> Result<()> {
        append_record(&self.path(username, "body.jsonl")?, measurement)
    }

    fn load_migration_state(&self, username: &str) -> Result<MigrationState> {
        Ok(load_document(&self.path(username, "meta.json")?)?.unwrap_or_default())
    }

    fn save_migration_state(&self, username: &str, state: &MigrationState) -> Result<()> {
        save_document(&self.path(username, "meta.json")?, state)
    }
}

// ============================================================================
// Documents
// ============================================================================

/// Load a JSON document with shared locking
///
/// Returns `None` if the file doesn't exist. If it can't be read or parsed,
/// logs a warning and returns `None`.
fn load_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("Unable to open {:?}: {}. Treating as absent.", path, e);
            return Ok(None);
        }
    };

    if let Err(e) = file.lock_shared() {
        tracing::warn!("Unable to lock {:?}: {}. Treating as absent.", path, e);
        return Ok(None);
    }

    let mut contents = String::new();
    let mut reader = BufReader::new(&file);
    if let Err(e) = reader.read_to_string(&mut contents) {
        let _ = file.unlock();
        tracing::warn!("Failed to read {:?}: {}. Treating as absent.", path, e);
        return Ok(None);
    }

    file.unlock()?;

    match serde_json::from_str::<T>(&contents) {
        Ok(value) => {
            tracing::debug!("Loaded {:?}", path);
            Ok(Some(value))
        }
        Err(e) => {
            tracing::warn!("Failed to parse {:?}: {}. Treating as absent.", path, e);
            Ok(None)
        }
    }
}

/// Atomically replace a JSON document
///
/// Writes to a temp file in the same directory, syncs it, then renames it
/// over the original.
fn save_document<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "document path missing parent")
    })?;
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    temp.as_file().lock_exclusive()?;

    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::debug!("Saved {:?}", path);
    Ok(())
}

fn remove_document(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Removed {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Append-only logs
// ============================================================================

/// Append one record as a JSON line under an exclusive lock
fn append_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    file.lock_exclusive()?;

    let mut line = String::new();
    if ends_mid_line(&mut file)? {
        tracing::warn!("{:?} ends with a partial record; starting a new line", path);
        line.push('\n');
    }
    line.push_str(&serde_json::to_string(record)?);
    line.push('\n');

    let mut writer = std::io::BufWriter::new(&file);
    writer.write_all(line.as_bytes())?;
    writer.flush()?;
    drop(writer);

    file.unlock()?;

    tracing::debug!("Appended record to {:?}", path);
    Ok(())
}

/// Whether the last write to `file` stopped before its newline
fn ends_mid_line(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Read every parsable record from a JSON-lines log
fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();

    // raw bytes: a line that is not UTF-8 is just another corrupt record
    for (line_num, line_result) in reader.split(b'\n').enumerate() {
        let line = line_result?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match serde_json::from_slice::<T>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(
                    "Skipping unparsable record at {:?} line {}: {}",
                    path,
                    line_num + 1,
                    e
                );
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} records from {:?}", records.len(), path);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn store() -> (tempfile::TempDir, FileStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());
        (temp_dir, store)
    }

    fn stats(name: &str) -> ExerciseStats {
        ExerciseStats {
            id: Uuid::new_v4(),
            exercise_name: name.into(),
            date: Utc::now(),
            weight: 40.0,
            reps: 10,
            set_number: 1,
            sets: 3,
            avg_heart_rate: Some(130),
            calories_burned: None,
        }
    }

    #[test]
    fn test_cycle_roundtrip_and_clear() {
        let (_dir, store) = store();
        assert!(store.load_cycle("alice").unwrap().is_none());

        let mut cycle = Cycle::new(1, Utc::now());
        cycle.days_completed = 4;
        store.save_cycle("alice", &cycle).unwrap();

        let loaded = store.load_cycle("alice").unwrap().unwrap();
        assert_eq!(loaded.days_completed, 4);
        assert_eq!(loaded.cycle_number, 1);

        store.clear_cycle("alice").unwrap();
        assert!(store.load_cycle("alice").unwrap().is_none());
        // clearing twice is fine
        store.clear_cycle("alice").unwrap();
    }

    #[test]
    fn test_corrupted_document_is_absent() {
        let (_dir, store) = store();
        let path = store.user_dir("alice").unwrap().join("cycle.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ invalid json }").unwrap();

        assert!(store.load_cycle("alice").unwrap().is_none());
    }

    #[test]
    fn test_users_are_isolated() {
        let (_dir, store) = store();
        store.set_completion_marker("alice", "0_Squat").unwrap();
        store.append_exercise_stats("alice", &stats("Squat")).unwrap();

        assert!(store.load_completion_markers("bob").unwrap().is_empty());
        assert!(store.load_exercise_stats_log("bob").unwrap().is_empty());
        assert_eq!(store.load_completion_markers("alice").unwrap().len(), 1);
    }

    #[test]
    fn test_marker_set_and_clear_removes_key() {
        let (_dir, store) = store();
        store.set_completion_marker("alice", "0_Squat").unwrap();
        store.set_completion_marker("alice", "1_Row").unwrap();
        store.clear_completion_marker("alice", "0_Squat").unwrap();

        let markers = store.load_completion_markers("alice").unwrap();
        assert_eq!(markers.into_iter().collect::<Vec<_>>(), vec!["1_Row"]);

        store.clear_completion_markers("alice").unwrap();
        let file = store.user_dir("alice").unwrap().join("completions.json");
        assert!(!file.exists());
    }

    #[test]
    fn test_logs_append_and_skip_corrupt_lines() {
        let (_dir, store) = store();
        store.append_exercise_stats("alice", &stats("Squat")).unwrap();

        let path = store.user_dir("alice").unwrap().join("stats.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{ not a record").unwrap();
        drop(file);

        store.append_exercise_stats("alice", &stats("Row")).unwrap();

        let log = store.load_exercise_stats_log("alice").unwrap();
        let names: Vec<_> = log.iter().map(|s| s.exercise_name.as_str()).collect();
        assert_eq!(names, vec!["Squat", "Row"]);

        store.clear_exercise_stats("alice").unwrap();
        assert!(store.load_exercise_stats_log("alice").unwrap().is_empty());
    }

    #[test]
    fn test_non_utf8_lines_are_skipped() {
        let (_dir, store) = store();
        store.append_exercise_stats("alice", &stats("Squat")).unwrap();

        let path = store.user_dir("alice").unwrap().join("stats.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\xff\xfe garbage\n").unwrap();
        drop(file);

        store.append_exercise_stats("alice", &stats("Row")).unwrap();

        let log = store.load_exercise_stats_log("alice").unwrap();
        let names: Vec<_> = log.iter().map(|s| s.exercise_name.as_str()).collect();
        assert_eq!(names, vec!["Squat", "Row"]);

        let history = store.user_dir("alice").unwrap().join("cycle_history.jsonl");
        std::fs::write(&history, b"\xff\xfe garbage\n").unwrap();
        assert!(store.load_cycle_history("alice").unwrap().is_empty());
    }

    #[test]
    fn test_migration_state_defaults() {
        let (_dir, store) = store();
        assert_eq!(store.load_migration_state("alice").unwrap().completion_keys_version, 0);

        let state = MigrationState {
            completion_keys_version: 1,
        };
        store.save_migration_state("alice", &state).unwrap();
        assert_eq!(store.load_migration_state("alice").unwrap(), state);
    }

    #[test]
    fn test_invalid_usernames_rejected() {
        let (_dir, store) = store();
        for name in ["", "../etc", "a/b", ".hidden", "white space"] {
            let err = store.load_cycle(name).unwrap_err();
            assert!(err.is_precondition(), "{:?} should be rejected", name);
        }
        assert!(validate_username("alice.smith-2_x").is_ok());
    }

    #[test]
    fn test_lock_user_is_released_on_drop() {
        let (_dir, store) = store();
        {
            let _guard = store.lock_user("alice").unwrap();
        }
        // a second acquisition would block forever if the first leaked
        let _guard = store.lock_user("alice").unwrap();
    }

    #[test]
    fn test_atomic_save_leaves_no_temp_files() {
        let (_dir, store) = store();
        store.save_cycle("alice", &Cycle::new(1, Utc::now())).unwrap();

        let dir = store.user_dir("alice").unwrap();
        let extras: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "cycle.json")
            .collect();
        assert!(extras.is_empty(), "Expected only cycle.json, found {:?}", extras);
    }

    #[test]
    fn test_append_after_partial_line_starts_new_line() {
        let (_dir, store) = store();
        store.append_exercise_stats("alice", &stats("Squat")).unwrap();

        let path = store.user_dir("alice").unwrap().join("stats.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"id":"trunc"#).unwrap();
        drop(file);

        store.append_exercise_stats("alice", &stats("Row")).unwrap();

        let names: Vec<String> = store
            .load_exercise_stats_log("alice")
            .unwrap()
            .into_iter()
            .map(|s| s.exercise_name)
            .collect();
        assert_eq!(names, vec!["Squat", "Row"]);
    }
}
