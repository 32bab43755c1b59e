//! Append-only CSV attempt log.

use crate::{AttemptSink, SinkError};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use turnstile_core::AttemptRecord;

/// Local attempt log with a fixed header row.
///
/// The header is written whenever the file is new or empty; existing rows
/// are never rewritten.
pub struct CsvLog {
    path: PathBuf,
    enabled: bool,
}

impl CsvLog {
    /// Prepare `path` (parent directories and header). A path that cannot be
    /// prepared yields a disabled sink.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let enabled = match prepare(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "local attempt log ready");
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "local attempt log disabled");
                false
            }
        };
        Self { path, enabled }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &AttemptRecord) -> Result<(), SinkError> {
        let file = open_with_header(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }
}

impl AttemptSink for CsvLog {
    fn name(&self) -> &str {
        "local"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn record(&mut self, record: &AttemptRecord) -> bool {
        if !self.enabled {
            return false;
        }
        match self.append(record) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to append attempt");
                false
            }
        }
    }
}

fn prepare(path: &Path) -> Result<(), SinkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    open_with_header(path)?;
    Ok(())
}

/// Open for appending, writing the header first if the file is empty.
fn open_with_header(path: &Path) -> Result<File, SinkError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    if file.metadata()?.len() > 0 {
        return Ok(file);
    }

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    writer.write_record(AttemptRecord::COLUMNS)?;
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| SinkError::Io(std::io::Error::new(e.error().kind(), e.error().to_string())))
}

/// The last `limit` records of a CSV attempt log, oldest first.
pub fn read_recent(path: &Path, limit: usize) -> Result<Vec<AttemptRecord>, SinkError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = VecDeque::with_capacity(limit.saturating_add(1).min(1024));
    for row in reader.deserialize::<AttemptRecord>() {
        records.push_back(row?);
        if records.len() > limit {
            records.pop_front();
        }
    }
    Ok(records.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use turnstile_core::Verdict;

    const HEADER: &str = "timestamp,detected_name,confidence,granted_or_denied,reason";

    fn record(name: &str, granted: bool) -> AttemptRecord {
        AttemptRecord {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap(),
            detected_name: name.to_string(),
            confidence: 0.4286,
            granted_or_denied: if granted { Verdict::Granted } else { Verdict::Denied },
            reason: "Face found in dataset".to_string(),
        }
    }

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_new_file_gets_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/nested/entry_logs.csv");

        let mut log = CsvLog::open(&path);
        assert!(log.is_enabled());
        assert_eq!(lines(&path), vec![HEADER.to_string()]);

        assert!(log.record(&record("Alice", true)));
        assert!(log.record(&record("Unknown", false)));

        let content = lines(&path);
        assert_eq!(content.len(), 3);
        assert_eq!(content[0], HEADER);
        assert_eq!(content.iter().filter(|l| l.as_str() == HEADER).count(), 1);
        assert!(content[1].contains("Alice"));
        assert!(content[1].contains("GRANTED"));
        assert!(content[1].contains("0.4286"));
        assert!(content[2].contains("DENIED"));
    }

    #[test]
    fn test_reopening_existing_log_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry_logs.csv");

        CsvLog::open(&path).record(&record("Alice", true));
        let mut again = CsvLog::open(&path);
        assert!(again.record(&record("Bob", true)));

        let content = lines(&path);
        assert_eq!(content.len(), 3);
        assert_eq!(content.iter().filter(|l| l.as_str() == HEADER).count(), 1);
    }

    #[test]
    fn test_empty_existing_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry_logs.csv");
        fs::write(&path, "").unwrap();

        let mut log = CsvLog::open(&path);
        log.record(&record("Alice", true));
        assert_eq!(lines(&path)[0], HEADER);
    }

    #[test]
    fn test_truncated_file_regains_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry_logs.csv");
        let mut log = CsvLog::open(&path);
        fs::write(&path, "").unwrap();

        assert!(log.record(&record("Alice", true)));
        let content = lines(&path);
        assert_eq!(content[0], HEADER);
        assert_eq!(content.len(), 2);
    }

    #[test]
    fn test_reason_with_comma_is_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry_logs.csv");
        let mut log = CsvLog::open(&path);

        let mut r = record("Unknown", false);
        r.reason = "Face not found in dataset: Recognition error: bad, worse".to_string();
        assert!(log.record(&r));

        let back = read_recent(&path, 10).unwrap();
        assert_eq!(back, vec![r]);
    }

    #[test]
    fn test_unwritable_destination_is_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "x").unwrap();

        let mut log = CsvLog::open(blocker.join("entry_logs.csv"));
        assert!(!log.is_enabled());
        assert!(!log.record(&record("Alice", true)));
    }

    #[test]
    fn test_read_recent_keeps_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry_logs.csv");
        let mut log = CsvLog::open(&path);
        for name in ["A", "B", "C", "D"] {
            log.record(&record(name, true));
        }

        let tail = read_recent(&path, 2).unwrap();
        let names: Vec<_> = tail.iter().map(|r| r.detected_name.as_str()).collect();
        assert_eq!(names, vec!["C", "D"]);

        assert_eq!(read_recent(&path, 10).unwrap().len(), 4);
        assert!(read_recent(&path, 0).unwrap().is_empty());
    }
}
