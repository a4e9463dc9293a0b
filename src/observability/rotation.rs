//! Time-based log file rotation.
//!
//! # Responsibilities
//! - Resolve the retention window from `LOG_ROTATE_DAYS`
//! - Write to `<dir>/<service>.<YYYYMMDDHH>.log`
//! - Open a fresh file at every 24-hour boundary
//! - Prune files whose embedded timestamp falls outside the retention window
//!
//! # Design Decisions
//! - The writer is owned by the `tracing-appender` worker thread, so it needs
//!   no locking of its own
//! - Periods are aligned to fixed 24-hour boundaries of the Unix epoch, not
//!   to process start; a restart within a period appends to the same file
//! - Pruning keys off the timestamp in the file name, not the mtime
//! - Nothing in here emits tracing events (the worker would feed itself)

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, TimeDelta, TimeZone, Utc};

/// Environment variable holding the retention window in days.
pub const LOG_ROTATE_DAYS_ENV: &str = "LOG_ROTATE_DAYS";

/// Retention used when the environment gives nothing usable.
pub const DEFAULT_LOG_ROTATE_DAYS: u32 = 3;

/// Lower bound on the retention window.
pub const MIN_LOG_ROTATE_DAYS: u32 = 1;

/// Fixed interval between rotations.
pub const ROTATION_INTERVAL_HOURS: i64 = 24;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H";
const TIMESTAMP_LEN: usize = 10;
const SUFFIX: &str = ".log";

/// Resolve a raw `LOG_ROTATE_DAYS` value.
///
/// Missing, non-numeric and non-positive values all fall back to
/// [`DEFAULT_LOG_ROTATE_DAYS`].
pub fn resolve_rotate_days(raw: Option<&str>) -> u32 {
    let days = raw
        .map(str::trim)
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|days| *days > 0)
        .map(|days| u32::try_from(days).unwrap_or(u32::MAX))
        .unwrap_or(DEFAULT_LOG_ROTATE_DAYS);

    days.max(MIN_LOG_ROTATE_DAYS)
}

/// Rotation settings, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Days a rotated file is kept before pruning.
    pub max_age_days: u32,
}

impl RotationPolicy {
    /// Policy with an explicit retention window, floored at one day.
    pub fn with_retention_days(days: u32) -> Self {
        Self {
            max_age_days: days.max(MIN_LOG_ROTATE_DAYS),
        }
    }

    /// Read the retention window from the process environment.
    pub fn from_env() -> Self {
        let raw = std::env::var(LOG_ROTATE_DAYS_ENV).ok();
        Self::with_retention_days(resolve_rotate_days(raw.as_deref()))
    }

    pub fn interval(&self) -> TimeDelta {
        TimeDelta::hours(ROTATION_INTERVAL_HOURS)
    }

    pub fn max_age(&self) -> TimeDelta {
        TimeDelta::days(i64::from(self.max_age_days))
    }

    /// Start of the rotation period containing `now`.
    pub fn period_start(&self, now: DateTime<Local>) -> DateTime<Local> {
        let period = self.interval().num_seconds();
        let ts = now.timestamp();
        DateTime::<Utc>::from_timestamp(ts - ts.rem_euclid(period), 0)
            .map(|start| start.with_timezone(&Local))
            .unwrap_or(now)
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::with_retention_days(DEFAULT_LOG_ROTATE_DAYS)
    }
}

/// File sink that rolls over on a fixed interval.
#[derive(Debug)]
pub struct RotatingFile {
    dir: PathBuf,
    prefix: String,
    policy: RotationPolicy,
    file: File,
    path: PathBuf,
    next_rotation: DateTime<Local>,
}

impl RotatingFile {
    /// Create the directory if needed, prune stale files and open the
    /// current file.
    pub fn open(dir: impl AsRef<Path>, prefix: &str, policy: RotationPolicy) -> io::Result<Self> {
        Self::open_at(dir.as_ref(), prefix, policy, Local::now())
    }

    fn open_at(dir: &Path, prefix: &str, policy: RotationPolicy, now: DateTime<Local>) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        let start = policy.period_start(now);
        let path = dir.join(file_name(prefix, start));
        let file = open_append(&path)?;

        let sink = Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            policy,
            file,
            path,
            next_rotation: start + policy.interval(),
        };
        sink.prune(now);
        Ok(sink)
    }

    /// Path of the file currently written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotate_if_due(&mut self, now: DateTime<Local>) -> io::Result<()> {
        if now < self.next_rotation {
            return Ok(());
        }

        let _ = self.file.flush();
        let start = self.policy.period_start(now);
        let path = self.dir.join(file_name(&self.prefix, start));
        self.file = open_append(&path)?;
        self.path = path;
        self.next_rotation = start + self.policy.interval();
        self.prune(now);
        Ok(())
    }

    /// Delete files of this sink that are older than the retention window.
    /// Returns how many were removed.
    fn prune(&self, now: DateTime<Local>) -> usize {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };

        let cutoff = now - self.policy.max_age();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path == self.path {
                continue;
            }
            let Some(stamp) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| parse_stamp(&self.prefix, name))
            else {
                continue;
            };
            if stamp < cutoff && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.rotate_if_due(Local::now())?;
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn file_name(prefix: &str, at: DateTime<Local>) -> String {
    format!("{}.{}{}", prefix, at.format(TIMESTAMP_FORMAT), SUFFIX)
}

/// Parse the timestamp out of `<prefix>.<YYYYMMDDHH>.log`.
fn parse_stamp(prefix: &str, name: &str) -> Option<DateTime<Local>> {
    let stamp = name
        .strip_prefix(prefix)?
        .strip_prefix('.')?
        .strip_suffix(SUFFIX)?;
    if stamp.len() != TIMESTAMP_LEN || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let date = NaiveDate::parse_from_str(&stamp[..8], "%Y%m%d").ok()?;
    let hour: u32 = stamp[8..].parse().ok()?;
    let naive = date.and_hms_opt(hour, 0, 0)?;
    Local.from_local_datetime(&naive).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).earliest().unwrap()
    }

    #[test]
    fn test_rotate_days_defaults() {
        assert_eq!(resolve_rotate_days(None), 3);
        assert_eq!(resolve_rotate_days(Some("")), 3);
        assert_eq!(resolve_rotate_days(Some("abc")), 3);
        assert_eq!(resolve_rotate_days(Some("2.5")), 3);
        assert_eq!(resolve_rotate_days(Some("0")), 3);
        assert_eq!(resolve_rotate_days(Some("-4")), 3);
    }

    #[test]
    fn test_rotate_days_explicit() {
        for days in [1u32, 2, 7, 30, 365] {
            assert_eq!(resolve_rotate_days(Some(&days.to_string())), days);
        }
        assert_eq!(resolve_rotate_days(Some(" 14 ")), 14);
    }

    #[test]
    fn test_policy_floor() {
        assert_eq!(RotationPolicy::with_retention_days(0).max_age_days, 1);
        assert_eq!(RotationPolicy::default().max_age(), TimeDelta::days(3));
        assert_eq!(RotationPolicy::default().interval(), TimeDelta::hours(24));
    }

    #[test]
    fn test_file_name_pattern() {
        assert_eq!(file_name("httpserver", at(2024, 3, 7, 9)), "httpserver.2024030709.log");
    }

    #[test]
    fn test_parse_stamp() {
        assert_eq!(parse_stamp("svc", "svc.2024030709.log"), Some(at(2024, 3, 7, 9)));
        assert_eq!(parse_stamp("svc", "other.2024030709.log"), None);
        assert_eq!(parse_stamp("svc", "svc.20240307.log"), None);
        assert_eq!(parse_stamp("svc", "svc.2024030799.log"), None);
        assert_eq!(parse_stamp("svc", "svc.2024030709.txt"), None);
    }

    #[test]
    fn test_open_creates_directory_and_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("nested").join("logs");
        let now = at(2024, 3, 7, 9);

        let policy = RotationPolicy::default();
        let sink = RotatingFile::open_at(&dir, "svc", policy, now).unwrap();

        assert_eq!(sink.path(), dir.join(file_name("svc", policy.period_start(now))));
        assert!(sink.path().exists());
    }

    #[test]
    fn test_prune_removes_expired_files_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        let now = at(2024, 3, 10, 12);

        let expired = dir.join("svc.2024030511.log");
        let retained = dir.join("svc.2024030813.log");
        let foreign = dir.join("other.2024010100.log");
        let unrelated = dir.join("notes.txt");
        for path in [&expired, &retained, &foreign, &unrelated] {
            fs::write(path, b"x").unwrap();
        }

        let sink = RotatingFile::open_at(dir, "svc", RotationPolicy::default(), now).unwrap();

        assert!(!expired.exists());
        assert!(retained.exists());
        assert!(foreign.exists());
        assert!(unrelated.exists());
        assert!(sink.path().exists());
    }

    #[test]
    fn test_period_start_is_fixed_boundary() {
        let policy = RotationPolicy::default();
        let start = policy.period_start(at(2024, 3, 7, 9));

        assert_eq!(start.timestamp() % 86_400, 0);
        assert!(start <= at(2024, 3, 7, 9));
        assert_eq!(policy.period_start(start + TimeDelta::hours(23)), start);
        assert_eq!(policy.period_start(start + TimeDelta::hours(24)), start + TimeDelta::hours(24));
    }

    #[test]
    fn test_reopen_within_period_appends_same_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let policy = RotationPolicy::default();
        let start = policy.period_start(at(2024, 3, 7, 9));

        let mut first = RotatingFile::open_at(temp_dir.path(), "svc", policy, start + TimeDelta::hours(1)).unwrap();
        first.file.write_all(b"one\n").unwrap();
        drop(first);
        let mut second = RotatingFile::open_at(temp_dir.path(), "svc", policy, start + TimeDelta::hours(4)).unwrap();
        second.file.write_all(b"two\n").unwrap();

        let files: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().flatten().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(second.path(), temp_dir.path().join(file_name("svc", start)));
        assert_eq!(fs::read_to_string(second.path()).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_rotates_at_period_boundary() {
        let temp_dir = tempfile::tempdir().unwrap();
        let policy = RotationPolicy::default();
        let start = policy.period_start(at(2024, 3, 7, 9));
        let mut sink = RotatingFile::open_at(temp_dir.path(), "svc", policy, start + TimeDelta::hours(2)).unwrap();
        let first = sink.path().to_path_buf();

        sink.rotate_if_due(start + TimeDelta::hours(23)).unwrap();
        assert_eq!(sink.path(), first);

        sink.rotate_if_due(start + TimeDelta::hours(24)).unwrap();
        let next = start + TimeDelta::hours(24);
        assert_eq!(sink.path(), temp_dir.path().join(file_name("svc", next)));
        assert_eq!(sink.next_rotation, next + TimeDelta::hours(24));
        assert!(sink.path().exists());
        assert!(first.exists());
    }

    #[test]
    fn test_write_appends() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut sink = RotatingFile::open(temp_dir.path(), "svc", RotationPolicy::default()).unwrap();

        sink.write_all(b"first\n").unwrap();
        sink.write_all(b"second\n").unwrap();
        sink.flush().unwrap();

        let content = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }
}
