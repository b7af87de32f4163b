use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::IdentityId;

/// Fixed header row of the detection log.
pub const LOG_HEADER: &str = "Timestamp,Person_ID_Numeric,Person_Name_or_ID,Category,Image_Filename";

/// Timestamp format used in log rows and notification text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CAPTURE_STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const BACKUP_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Failures of detection-log operations, classified so the administrative
/// surface can map them to distinct statuses.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("detection log file not found")]
    NotFound,
    #[error("permission denied; ensure the log and image files are not open elsewhere")]
    PermissionDenied(#[source] io::Error),
    #[error("no data entries to clear")]
    NoData,
    #[error("malformed log entry: expected at least 5 fields, found {fields}")]
    Malformed { fields: usize },
    #[error("log i/o failed")]
    Io(#[source] io::Error),
}

/// Classify an I/O failure into the log error taxonomy.
fn io_err(err: io::Error) -> LogError {
    match err.kind() {
        io::ErrorKind::NotFound => LogError::NotFound,
        io::ErrorKind::PermissionDenied => LogError::PermissionDenied(err),
        _ => LogError::Io(err),
    }
}

fn fmt_timestamp<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
}

/// One detection log row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    #[serde(serialize_with = "fmt_timestamp")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "id")]
    pub identity: IdentityId,
    /// Display label column. The pipeline writes the numeric id here.
    pub label: String,
    pub category: String,
    /// Image path relative to the static-asset root.
    #[serde(rename = "image")]
    pub image_path: String,
}

impl LogEntry {
    /// Entry stamped with the current local time.
    pub fn new(identity: IdentityId, category: impl Into<String>, image_path: impl Into<String>) -> Self {
        Self::at(Local::now().naive_local(), identity, category, image_path)
    }

    /// Entry with an explicit timestamp.
    pub fn at(
        timestamp: NaiveDateTime,
        identity: IdentityId,
        category: impl Into<String>,
        image_path: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            identity,
            label: identity.to_string(),
            category: category.into(),
            image_path: image_path.into(),
        }
    }

    fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.identity,
            self.label,
            self.category,
            self.image_path
        )
    }

    /// Parse one data line. Returns `None` for lines that do not carry the
    /// 5 expected fields or whose typed fields do not parse.
    fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 5 {
            return None;
        }
        let timestamp = NaiveDateTime::parse_from_str(fields[0].trim(), TIMESTAMP_FORMAT).ok()?;
        let identity: IdentityId = fields[1].parse().ok()?;
        Some(Self {
            timestamp,
            identity,
            label: fields[2].trim().to_string(),
            category: fields[3].trim().to_string(),
            image_path: fields[4].trim().to_string(),
        })
    }
}

/// Summary of a completed `clear_all`.
#[derive(Debug)]
pub struct ClearSummary {
    pub backup_path: PathBuf,
    pub images_removed: usize,
}

/// Summary of a completed `clear_latest`.
#[derive(Debug)]
pub struct RemovedEntry {
    /// The raw line that was removed.
    pub line: String,
    /// Whether the referenced snapshot file was found and deleted.
    pub image_removed: bool,
}

/// Snapshot kind, which selects the capture filename prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    /// Written automatically when an alert fires.
    Auto,
    /// Written on operator request.
    Manual,
}

impl CaptureKind {
    fn prefix(self) -> &'static str {
        match self {
            CaptureKind::Auto => "auto_capture",
            CaptureKind::Manual => "manual_capture",
        }
    }
}

/// A snapshot written to the image directory.
#[derive(Debug)]
pub struct SavedSnapshot {
    pub file_name: String,
    /// Path relative to the static-asset root, as stored in log rows.
    pub relative_path: String,
    pub disk_path: PathBuf,
}

/// The durable CSV detection log and its snapshot image directory.
///
/// The file is shared with an independent dashboard process; appends are
/// single flushed writes and destructive rewrites go through a sibling
/// temp file plus rename so readers never observe a half-written log.
pub struct DetectionLog {
    log_path: PathBuf,
    image_dir: PathBuf,
    /// Prefix joined onto snapshot filenames to form the stored relative path.
    image_prefix: String,
}

impl DetectionLog {
    pub fn new(
        log_path: impl Into<PathBuf>,
        image_dir: impl Into<PathBuf>,
        image_prefix: impl Into<String>,
    ) -> Self {
        Self {
            log_path: log_path.into(),
            image_dir: image_dir.into(),
            image_prefix: image_prefix.into(),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Append one entry, creating the file (with its header) on first use.
    ///
    /// The row is written in a single flushed write so a concurrent reader
    /// never sees a partial line.
    pub fn append(&self, entry: &LogEntry) -> Result<(), LogError> {
        if let Some(parent) = self.log_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let fresh = !self.log_path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(io_err)?;
        let mut chunk = String::new();
        if fresh {
            chunk.push_str(LOG_HEADER);
            chunk.push('\n');
        }
        chunk.push_str(&entry.to_csv_row());
        chunk.push('\n');
        file.write_all(chunk.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        debug!(id = %entry.identity, category = %entry.category, "detection entry appended");
        Ok(())
    }

    /// Read every data row, oldest first.
    ///
    /// Header lines are recognized by content, not position, so legacy
    /// headerless files still read correctly. Rows that do not parse are
    /// skipped with a warning.
    pub fn read_all(&self) -> Result<Vec<LogEntry>, LogError> {
        let content = fs::read_to_string(&self.log_path).map_err(io_err)?;
        let mut entries = Vec::new();
        for line in content.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || is_header(line) {
                continue;
            }
            match LogEntry::parse(line) {
                Some(entry) => entries.push(entry),
                None => warn!(line, "skipping unparseable log row"),
            }
        }
        Ok(entries)
    }

    /// Back up the log, purge the image directory, and rewrite the header.
    ///
    /// If the backup copy fails nothing else is touched.
    pub fn clear_all(&self) -> Result<ClearSummary, LogError> {
        if !self.log_path.exists() {
            return Err(LogError::NotFound);
        }
        let backup_name = format!(
            "detection_log_backup_{}.csv",
            Local::now().format(BACKUP_STAMP_FORMAT)
        );
        let backup_path = match self.log_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(&backup_name),
            _ => PathBuf::from(&backup_name),
        };
        fs::copy(&self.log_path, &backup_path).map_err(io_err)?;
        info!(backup = %backup_path.display(), "detection log backed up");

        let mut images_removed = 0usize;
        match fs::read_dir(&self.image_dir) {
            Ok(dirents) => {
                for dirent in dirents {
                    let path = dirent.map_err(io_err)?.path();
                    if path.is_file() {
                        fs::remove_file(&path).map_err(io_err)?;
                        images_removed += 1;
                    }
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(dir = %self.image_dir.display(), "image directory missing; nothing to purge");
            }
            Err(err) => return Err(io_err(err)),
        }

        self.rewrite(format!("{LOG_HEADER}\n").as_bytes())?;
        info!(images_removed, "detection log cleared");
        Ok(ClearSummary { backup_path, images_removed })
    }

    /// Remove the most recent data line and its snapshot image.
    ///
    /// Every byte before the removed line is preserved verbatim, header
    /// included. The referenced image being absent is only a warning.
    pub fn clear_latest(&self) -> Result<RemovedEntry, LogError> {
        if !self.log_path.exists() {
            return Err(LogError::NotFound);
        }
        let content = fs::read_to_string(&self.log_path).map_err(io_err)?;
        let (prefix, last_line) = split_last_line(&content);
        let last_trimmed = last_line.trim_end_matches('\r');

        if last_trimmed.trim().is_empty() && prefix.is_empty() {
            return Err(LogError::NoData);
        }
        if is_header(last_trimmed) {
            // only line left is the header
            return Err(LogError::NoData);
        }
        let fields: Vec<&str> = last_trimmed.split(',').collect();
        if fields.len() < 5 {
            return Err(LogError::Malformed { fields: fields.len() });
        }

        self.rewrite(prefix.as_bytes())?;

        let image_field = fields[4].trim();
        let mut image_removed = false;
        match Path::new(image_field).file_name() {
            Some(name) => {
                let disk_path = self.image_dir.join(name);
                if disk_path.exists() {
                    fs::remove_file(&disk_path).map_err(io_err)?;
                    image_removed = true;
                    info!(image = %disk_path.display(), "snapshot removed with its log entry");
                } else {
                    warn!(image = %disk_path.display(), "snapshot referenced by the removed entry was not found");
                }
            }
            None => warn!(field = image_field, "removed entry has no usable image filename"),
        }

        Ok(RemovedEntry { line: last_trimmed.to_string(), image_removed })
    }

    /// Write a snapshot stamped with the current local time.
    pub fn save_snapshot(&self, jpeg: &[u8], kind: CaptureKind) -> Result<SavedSnapshot, LogError> {
        self.save_snapshot_at(jpeg, kind, Local::now().naive_local())
    }

    /// Write a snapshot with an explicit timestamp.
    pub fn save_snapshot_at(
        &self,
        jpeg: &[u8],
        kind: CaptureKind,
        stamp: NaiveDateTime,
    ) -> Result<SavedSnapshot, LogError> {
        fs::create_dir_all(&self.image_dir).map_err(io_err)?;
        let file_name = format!("{}_{}.jpg", kind.prefix(), stamp.format(CAPTURE_STAMP_FORMAT));
        let disk_path = self.image_dir.join(&file_name);
        fs::write(&disk_path, jpeg).map_err(io_err)?;
        let relative_path = if self.image_prefix.is_empty() {
            file_name.clone()
        } else {
            format!("{}/{}", self.image_prefix.trim_end_matches('/'), file_name)
        };
        debug!(path = %disk_path.display(), "snapshot saved");
        Ok(SavedSnapshot { file_name, relative_path, disk_path })
    }

    /// Replace the log content atomically via a sibling temp file.
    fn rewrite(&self, bytes: &[u8]) -> Result<(), LogError> {
        let tmp_path = self.log_path.with_extension("csv.tmp");
        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.flush()?;
            fs::rename(&tmp_path, &self.log_path)
        };
        write().map_err(|err| {
            let _ = fs::remove_file(&tmp_path);
            io_err(err)
        })
    }
}

/// Whether a line is the fixed header row, judged by its first field.
fn is_header(line: &str) -> bool {
    line.split(',').next().map(str::trim) == Some("Timestamp")
}

/// Split `content` into everything before its last line (verbatim, with
/// line endings intact) and the last line itself (without its newline).
fn split_last_line(content: &str) -> (&str, &str) {
    let body = content.strip_suffix('\n').unwrap_or(content);
    match body.rfind('\n') {
        Some(idx) => (&content[..idx + 1], &body[idx + 1..]),
        None => ("", body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn stamp(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    fn test_log(dir: &TempDir) -> DetectionLog {
        DetectionLog::new(
            dir.path().join("detection_log.csv"),
            dir.path().join("captured_faces/alerts"),
            "captured_faces/alerts",
        )
    }

    fn entry(ts: &str, id: u32, category: &str, image: &str) -> LogEntry {
        LogEntry::at(stamp(ts), IdentityId(id), category, image)
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        log.append(&entry("2025-05-01 10:00:00", 1, "Flagged", "a.jpg")).unwrap();
        log.append(&entry("2025-05-01 10:00:05", 2, "Staff", "b.jpg")).unwrap();

        let content = fs::read_to_string(log.log_path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], LOG_HEADER);
        assert_eq!(lines[1], "2025-05-01 10:00:00,1,1,Flagged,a.jpg");
        assert_eq!(lines[2], "2025-05-01 10:00:05,2,2,Staff,b.jpg");
    }

    #[test]
    fn test_round_trip_preserves_entries() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        let written = vec![
            entry("2025-05-01 10:00:00", 1, "Flagged", "captured_faces/alerts/a.jpg"),
            entry("2025-05-01 10:01:00", 2, "Staff", "captured_faces/alerts/b.jpg"),
            entry("2025-05-01 10:02:00", 3, "Flagged", "captured_faces/alerts/c.jpg"),
        ];
        for e in &written {
            log.append(e).unwrap();
        }
        let read = log.read_all().unwrap();
        assert_eq!(read, written);
    }

    #[test]
    fn test_read_all_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        assert!(matches!(log.read_all(), Err(LogError::NotFound)));
    }

    #[test]
    fn test_read_all_skips_unparseable_rows() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        fs::write(
            log.log_path(),
            format!("{LOG_HEADER}\n2025-05-01 10:00:00,1,1,Flagged,a.jpg\nnot,a,row\n2025-05-01 10:01:00,2,2,Staff,b.jpg\n"),
        )
        .unwrap();
        let read = log.read_all().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[1].identity, IdentityId(2));
    }

    #[test]
    fn test_read_all_handles_headerless_log() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        fs::write(log.log_path(), "2025-05-01 10:00:00,1,1,Flagged,a.jpg\n").unwrap();
        let read = log.read_all().unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].label, "1");
    }

    #[test]
    fn test_clear_latest_removes_row_and_image() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        fs::create_dir_all(log.image_dir()).unwrap();
        fs::write(log.image_dir().join("auto_capture_20250501-100000.jpg"), b"jpeg").unwrap();
        fs::write(
            log.log_path(),
            format!("{LOG_HEADER}\n2025-05-01 10:00:00,1,1,Flagged,captured_faces/alerts/auto_capture_20250501-100000.jpg\n"),
        )
        .unwrap();

        let removed = log.clear_latest().unwrap();
        assert!(removed.image_removed);
        assert!(!log.image_dir().join("auto_capture_20250501-100000.jpg").exists());
        let content = fs::read_to_string(log.log_path()).unwrap();
        assert_eq!(content, format!("{LOG_HEADER}\n"));
    }

    #[test]
    fn test_clear_latest_missing_image_is_nonfatal() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        fs::write(
            log.log_path(),
            format!("{LOG_HEADER}\n2025-05-01 10:00:00,1,1,Flagged,captured_faces/alerts/gone.jpg\n"),
        )
        .unwrap();

        let removed = log.clear_latest().unwrap();
        assert!(!removed.image_removed);
        assert_eq!(fs::read_to_string(log.log_path()).unwrap(), format!("{LOG_HEADER}\n"));
    }

    #[test]
    fn test_clear_latest_header_only_is_no_data() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        let original = format!("{LOG_HEADER}\n");
        fs::write(log.log_path(), &original).unwrap();

        assert!(matches!(log.clear_latest(), Err(LogError::NoData)));
        assert_eq!(fs::read_to_string(log.log_path()).unwrap(), original);
    }

    #[test]
    fn test_clear_latest_empty_file_is_no_data() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        fs::write(log.log_path(), "").unwrap();
        assert!(matches!(log.clear_latest(), Err(LogError::NoData)));
    }

    #[test]
    fn test_clear_latest_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        assert!(matches!(log.clear_latest(), Err(LogError::NotFound)));
    }

    #[test]
    fn test_clear_latest_short_row_is_malformed() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        let original = format!("{LOG_HEADER}\n2025-05-01 10:00:00,1,1\n");
        fs::write(log.log_path(), &original).unwrap();

        match log.clear_latest() {
            Err(LogError::Malformed { fields }) => assert_eq!(fields, 3),
            other => panic!("expected malformed error, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(log.log_path()).unwrap(), original);
    }

    #[test]
    fn test_clear_latest_preserves_prior_lines_verbatim() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        // odd spacing in the first data row must survive untouched
        let prior = format!("{LOG_HEADER}\n2025-05-01 10:00:00, 1 ,1,Flagged,  a.jpg\n");
        fs::write(log.log_path(), format!("{prior}2025-05-01 10:01:00,2,2,Staff,b.jpg\n")).unwrap();

        log.clear_latest().unwrap();
        assert_eq!(fs::read_to_string(log.log_path()).unwrap(), prior);
    }

    #[test]
    fn test_clear_latest_headerless_single_row() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        fs::write(log.log_path(), "2025-05-01 10:00:00,1,1,Flagged,a.jpg\n").unwrap();

        let removed = log.clear_latest().unwrap();
        assert_eq!(removed.line, "2025-05-01 10:00:00,1,1,Flagged,a.jpg");
        assert_eq!(fs::read_to_string(log.log_path()).unwrap(), "");
    }

    #[test]
    fn test_clear_all_consistency() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        fs::create_dir_all(log.image_dir()).unwrap();
        fs::write(log.image_dir().join("a.jpg"), b"a").unwrap();
        fs::write(log.image_dir().join("b.jpg"), b"b").unwrap();
        log.append(&entry("2025-05-01 10:00:00", 1, "Flagged", "a.jpg")).unwrap();
        log.append(&entry("2025-05-01 10:01:00", 2, "Staff", "b.jpg")).unwrap();
        let pre_clear = fs::read_to_string(log.log_path()).unwrap();

        let summary = log.clear_all().unwrap();

        assert_eq!(fs::read_to_string(log.log_path()).unwrap(), format!("{LOG_HEADER}\n"));
        assert_eq!(summary.images_removed, 2);
        let remaining: Vec<_> = fs::read_dir(log.image_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|d| d.path().is_file())
            .collect();
        assert!(remaining.is_empty());
        assert!(summary.backup_path.exists());
        assert_eq!(fs::read_to_string(&summary.backup_path).unwrap(), pre_clear);
    }

    #[test]
    fn test_clear_all_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        assert!(matches!(log.clear_all(), Err(LogError::NotFound)));
    }

    #[test]
    fn test_clear_all_without_image_dir() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        log.append(&entry("2025-05-01 10:00:00", 1, "Flagged", "a.jpg")).unwrap();

        let summary = log.clear_all().unwrap();
        assert_eq!(summary.images_removed, 0);
        assert_eq!(fs::read_to_string(log.log_path()).unwrap(), format!("{LOG_HEADER}\n"));
    }

    #[test]
    fn test_snapshot_naming_and_relative_path() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        let at = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();

        let auto = log.save_snapshot_at(b"jpegbytes", CaptureKind::Auto, at).unwrap();
        assert_eq!(auto.file_name, "auto_capture_20250501-100000.jpg");
        assert_eq!(auto.relative_path, "captured_faces/alerts/auto_capture_20250501-100000.jpg");
        assert_eq!(fs::read(&auto.disk_path).unwrap(), b"jpegbytes");

        let manual = log.save_snapshot_at(b"x", CaptureKind::Manual, at).unwrap();
        assert_eq!(manual.file_name, "manual_capture_20250501-100000.jpg");
    }

    #[test]
    fn test_append_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let log = DetectionLog::new(dir.path().join("data/logs/detection_log.csv"), dir.path().join("imgs"), "");
        log.append(&entry("2025-05-01 10:00:00", 1, "Flagged", "a.jpg")).unwrap();
        assert!(log.log_path().exists());
    }
}
