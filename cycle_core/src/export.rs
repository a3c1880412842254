//! CSV export of the logged sets.
//!
//! Volume is written as a derived column so spreadsheets don't have to
//! recompute it; it is never read back.

use crate::{ExerciseStats, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    id: String,
    exercise_name: &'a str,
    date: String,
    weight: f64,
    reps: u32,
    volume: f64,
    set_number: u32,
    sets: u32,
    avg_heart_rate: Option<u32>,
    calories_burned: Option<f64>,
}

impl<'a> From<&'a ExerciseStats> for CsvRow<'a> {
    fn from(stats: &'a ExerciseStats) -> Self {
        CsvRow {
            id: stats.id.to_string(),
            exercise_name: &stats.exercise_name,
            date: stats.date.to_rfc3339(),
            weight: stats.weight,
            reps: stats.reps,
            volume: stats.volume(),
            set_number: stats.set_number,
            sets: stats.sets,
            avg_heart_rate: stats.avg_heart_rate,
            calories_burned: stats.calories_burned,
        }
    }
}

/// Write the log as CSV (with a header row) to any writer.
///
/// Returns the number of rows written.
pub fn write_stats_csv<W: Write>(stats: &[ExerciseStats], writer: W) -> Result<usize> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(writer);

    if stats.is_empty() {
        // serialize() emits headers lazily, so write them explicitly
        csv_writer.write_record([
            "id",
            "exercise_name",
            "date",
            "weight",
            "reps",
            "volume",
            "set_number",
            "sets",
            "avg_heart_rate",
            "calories_burned",
        ])?;
    }

    for set in stats {
        csv_writer.serialize(CsvRow::from(set))?;
    }

    csv_writer.flush()?;
    Ok(stats.len())
}

/// Export the log to `path`, replacing any existing file atomically.
pub fn export_stats_csv(stats: &[ExerciseStats], path: &Path) -> Result<usize> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    let count = write_stats_csv(stats, temp.as_file())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| crate::Error::Io(e.error))?;

    tracing::info!("Exported {} sets to {:?}", count, path);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn set(name: &str, weight: f64, reps: u32) -> ExerciseStats {
        ExerciseStats {
            id: Uuid::new_v4(),
            exercise_name: name.into(),
            date: Utc::now(),
            weight,
            reps,
            set_number: 1,
            sets: 3,
            avg_heart_rate: None,
            calories_burned: Some(12.5),
        }
    }

    #[test]
    fn test_export_creates_file_with_header() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("out").join("stats.csv");

        let log = vec![set("Squat", 100.0, 5), set("Row", 50.0, 10)];
        let count = export_stats_csv(&log, &path).unwrap();
        assert_eq!(count, 2);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[1], "exercise_name");
        assert_eq!(&headers[5], "volume");

        let records: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][1], "Squat");
        assert_eq!(&records[0][5], "500.0");
    }

    #[test]
    fn test_export_empty_log_writes_header_only() {
        let mut buffer = Vec::new();
        let count = write_stats_csv(&[], &mut buffer).unwrap();
        assert_eq!(count, 0);

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("id,exercise_name,date"));
    }

    #[test]
    fn test_export_replaces_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stats.csv");
        std::fs::write(&path, "stale").unwrap();

        export_stats_csv(&[set("Squat", 100.0, 5)], &path).unwrap();

        let reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.into_records().count(), 1);
    }
}
