use chrono::{DateTime, Duration as TimeDelta, FixedOffset, Local, NaiveDate, Offset, TimeZone, Timelike, Utc};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::LogSink;
use crate::record::LogRecord;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Source of the current time and of the local UTC offset.
pub trait RotationClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Local offset in effect at `at`
    fn utc_offset(&self, at: DateTime<Utc>) -> FixedOffset;
}

/// Wall clock in the local time zone of the process
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl RotationClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn utc_offset(&self, at: DateTime<Utc>) -> FixedOffset {
        Local.offset_from_utc_datetime(&at.naive_utc()).fix()
    }
}

struct RotatingState {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    date: NaiveDate,
    rollover_at: DateTime<Utc>,
}

/// File sink that starts a new file at every local midnight.
///
/// Files are never renamed. Each file is named after the base file name and
/// the local date it was opened on, `<stem><YYYY-MM-DD>_<n>.<ext>`, where `n`
/// is the first counter for which no file exists yet. Several runs started on
/// the same day therefore never overwrite one another.
pub struct DayRotatingFileSink {
    base: PathBuf,
    clock: Arc<dyn RotationClock>,
    interval: Duration,
    state: Mutex<RotatingState>,
}

impl DayRotatingFileSink {
    /// Open a sink rotating daily on the system clock
    pub fn new(base: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::open(
            base,
            Arc::new(SystemClock),
            Duration::from_secs(SECONDS_PER_DAY as u64),
        )
    }

    pub fn open(
        base: impl AsRef<Path>,
        clock: Arc<dyn RotationClock>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let base = base.as_ref().to_path_buf();

        // Create parent directory if it doesn't exist
        if let Some(parent) = base.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let now = clock.now();
        let today = now.with_timezone(&clock.utc_offset(now)).date_naive();
        let (path, file) = open_dated_file(&base, today)?;

        let sink = Self {
            base,
            clock,
            interval,
            state: Mutex::new(RotatingState {
                writer: Some(BufWriter::new(file)),
                path,
                date: today,
                rollover_at: now,
            }),
        };
        let rollover_at = sink.compute_rollover(now);
        sink.lock_state().rollover_at = rollover_at;
        Ok(sink)
    }

    /// Path of the file currently written to
    pub fn current_path(&self) -> PathBuf {
        self.lock_state().path.clone()
    }

    /// Instant at which the next rollover happens
    pub fn rollover_at(&self) -> DateTime<Utc> {
        self.lock_state().rollover_at
    }

    /// Close the current file and open a new one for the current date
    pub fn do_rollover(&self) -> std::io::Result<()> {
        let mut state = self.lock_state();
        self.rollover_locked(&mut state)
    }

    /// Flush and close the current file; later records are discarded
    pub fn close(&self) {
        let mut state = self.lock_state();
        if let Some(mut writer) = state.writer.take() {
            let _ = writer.flush();
        }
    }

    fn rollover_locked(&self, state: &mut RotatingState) -> std::io::Result<()> {
        let now = self.clock.now();
        let today = now.with_timezone(&self.clock.utc_offset(now)).date_naive();

        if let Some(writer) = state.writer.as_mut() {
            writer.flush()?;
            // An untouched file of the same day is kept rather than left empty
            if state.date == today && writer.get_ref().metadata()?.len() == 0 {
                state.rollover_at = self.compute_rollover(now);
                return Ok(());
            }
        }
        state.writer = None;

        let (path, file) = open_dated_file(&self.base, today)?;
        state.writer = Some(BufWriter::new(file));
        state.path = path;
        state.date = today;
        state.rollover_at = self.compute_rollover(now);
        Ok(())
    }

    /// Next local midnight after `now`, corrected when the UTC offset changes
    /// before it is reached.
    fn compute_rollover(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let offset_now = self.clock.utc_offset(now);
        let since_midnight = now
            .with_timezone(&offset_now)
            .num_seconds_from_midnight() as i64;
        let interval = TimeDelta::from_std(self.interval)
            .ok()
            .filter(|d| *d > TimeDelta::zero())
            .unwrap_or_else(|| TimeDelta::seconds(SECONDS_PER_DAY));

        let mut rollover = now + TimeDelta::seconds(SECONDS_PER_DAY - since_midnight);
        while rollover <= now {
            rollover += interval;
        }

        let offset_at_rollover = self.clock.utc_offset(rollover);
        let drift = offset_now.local_minus_utc() - offset_at_rollover.local_minus_utc();
        rollover + TimeDelta::seconds(drift as i64)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RotatingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_record(&self, record: &LogRecord) -> std::io::Result<()> {
        let mut state = self.lock_state();
        if state.writer.is_none() {
            return Ok(());
        }

        if self.clock.now() >= state.rollover_at {
            self.rollover_locked(&mut state)?;
        }

        let offset = self.clock.utc_offset(record.timestamp);
        let line = format!(
            "{} | {} | {}\n",
            record.timestamp.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S"),
            record.level.as_str().to_uppercase(),
            record.display_message()
        );

        if let Some(writer) = state.writer.as_mut() {
            writer.write_all(line.as_bytes())?;
            writer.flush()?;
        }
        Ok(())
    }
}

impl LogSink for DayRotatingFileSink {
    fn log(&self, record: LogRecord) {
        if let Err(e) = self.write_record(&record) {
            eprintln!("Failed to write log record to {}: {}", self.base.display(), e);
        }
    }

    fn flush(&self) {
        if let Some(writer) = self.lock_state().writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

impl Drop for DayRotatingFileSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_dated_file(base: &Path, date: NaiveDate) -> std::io::Result<(PathBuf, File)> {
    let dir = base.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = base
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());

    let mut counter = 0u32;
    loop {
        let path = dir.join(format!(
            "{}{}_{}.{}",
            stem,
            date.format("%Y-%m-%d"),
            counter,
            extension
        ));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogLevel;
    use tempfile::TempDir;

    /// Clock with an optional switch to a second offset at a given instant
    struct FakeClock {
        now: Mutex<DateTime<Utc>>,
        offset: FixedOffset,
        switch: Option<(DateTime<Utc>, FixedOffset)>,
    }

    impl FakeClock {
        fn new(now: DateTime<Utc>, offset_hours: i32) -> Self {
            Self {
                now: Mutex::new(now),
                offset: FixedOffset::east_opt(offset_hours * 3600).unwrap(),
                switch: None,
            }
        }

        fn with_switch(mut self, at: DateTime<Utc>, offset_hours: i32) -> Self {
            self.switch = Some((at, FixedOffset::east_opt(offset_hours * 3600).unwrap()));
            self
        }

        fn advance(&self, by: TimeDelta) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl RotationClock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }

        fn utc_offset(&self, at: DateTime<Utc>) -> FixedOffset {
            match self.switch {
                Some((switch_at, offset)) if at >= switch_at => offset,
                _ => self.offset,
            }
        }
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn day() -> Duration {
        Duration::from_secs(SECONDS_PER_DAY as u64)
    }

    #[test]
    fn test_file_name_carries_date_and_counter() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(utc("2026-05-04T10:00:00Z"), 0));
        let sink = DayRotatingFileSink::open(dir.path().join("measure.log"), clock, day()).unwrap();

        assert_eq!(
            sink.current_path(),
            dir.path().join("measure2026-05-04_0.log")
        );
    }

    #[test]
    fn test_same_day_start_increments_suffix() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("measure.log");
        let clock = Arc::new(FakeClock::new(utc("2026-05-04T10:00:00Z"), 0));

        let first = DayRotatingFileSink::open(&base, clock.clone(), day()).unwrap();
        first.log(LogRecord::new(LogLevel::Info, "t", "first run"));
        let second = DayRotatingFileSink::open(&base, clock, day()).unwrap();
        second.log(LogRecord::new(LogLevel::Info, "t", "second run"));

        assert_ne!(first.current_path(), second.current_path());
        assert_eq!(
            second.current_path(),
            dir.path().join("measure2026-05-04_1.log")
        );

        let first_content = std::fs::read_to_string(first.current_path()).unwrap();
        assert!(first_content.contains("first run"));
        assert!(!first_content.contains("second run"));
    }

    #[test]
    fn test_forced_rollovers_produce_distinct_files() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(utc("2026-05-04T10:00:00Z"), 0));
        let sink =
            DayRotatingFileSink::open(dir.path().join("measure.log"), clock.clone(), day()).unwrap();

        sink.do_rollover().unwrap();
        let at_t = sink.current_path();
        assert_eq!(at_t, dir.path().join("measure2026-05-04_0.log"));
        sink.log(LogRecord::new(LogLevel::Info, "t", "at T"));

        clock.advance(TimeDelta::seconds(SECONDS_PER_DAY));
        sink.do_rollover().unwrap();
        let at_t_plus_interval = sink.current_path();
        sink.log(LogRecord::new(LogLevel::Info, "t", "at T+interval"));

        assert_ne!(at_t, at_t_plus_interval);
        assert_eq!(at_t_plus_interval, dir.path().join("measure2026-05-05_0.log"));
        assert!(std::fs::read_to_string(&at_t).unwrap().contains("at T"));
        let later = std::fs::read_to_string(&at_t_plus_interval).unwrap();
        assert!(later.contains("| INFO | at T+interval"));
    }

    #[test]
    fn test_same_day_rollover_skips_only_empty_files() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(utc("2026-05-04T10:00:00Z"), 0));
        let sink = DayRotatingFileSink::open(dir.path().join("measure.log"), clock, day()).unwrap();

        sink.do_rollover().unwrap();
        assert_eq!(sink.current_path(), dir.path().join("measure2026-05-04_0.log"));
        assert!(!dir.path().join("measure2026-05-04_1.log").exists());

        sink.log(LogRecord::new(LogLevel::Info, "t", "written"));
        sink.do_rollover().unwrap();
        assert_eq!(sink.current_path(), dir.path().join("measure2026-05-04_1.log"));
    }

    #[test]
    fn test_rollover_at_local_midnight() {
        let dir = TempDir::new().unwrap();
        // 12:00 local at UTC+1
        let clock = Arc::new(FakeClock::new(utc("2026-03-20T11:00:00Z"), 1));
        let sink = DayRotatingFileSink::open(dir.path().join("run.log"), clock, day()).unwrap();

        assert_eq!(sink.rollover_at(), utc("2026-03-20T23:00:00Z"));
    }

    #[test]
    fn test_rollover_adjusted_when_dst_starts() {
        let dir = TempDir::new().unwrap();
        // Offset moves from +1 to +2 before the next midnight
        let clock = Arc::new(
            FakeClock::new(utc("2026-03-28T11:00:00Z"), 1)
                .with_switch(utc("2026-03-28T20:00:00Z"), 2),
        );
        let sink = DayRotatingFileSink::open(dir.path().join("run.log"), clock, day()).unwrap();

        // Local midnight at +2 is one hour earlier in UTC
        assert_eq!(sink.rollover_at(), utc("2026-03-28T22:00:00Z"));
    }

    #[test]
    fn test_rollover_adjusted_when_dst_ends() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(
            FakeClock::new(utc("2026-10-24T10:00:00Z"), 2)
                .with_switch(utc("2026-10-24T20:00:00Z"), 1),
        );
        let sink = DayRotatingFileSink::open(dir.path().join("run.log"), clock, day()).unwrap();

        assert_eq!(sink.rollover_at(), utc("2026-10-24T23:00:00Z"));
    }

    #[test]
    fn test_write_past_rollover_opens_next_day_file() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(utc("2026-05-04T23:59:00Z"), 0));
        let sink =
            DayRotatingFileSink::open(dir.path().join("run.log"), clock.clone(), day()).unwrap();

        clock.advance(TimeDelta::minutes(2));
        sink.log(LogRecord::new(LogLevel::Info, "t", "after midnight"));

        assert_eq!(sink.current_path(), dir.path().join("run2026-05-05_0.log"));
        assert_eq!(sink.rollover_at(), utc("2026-05-06T00:00:00Z"));
    }

    #[test]
    fn test_closed_sink_discards_records() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(utc("2026-05-04T10:00:00Z"), 0));
        let sink = DayRotatingFileSink::open(dir.path().join("run.log"), clock, day()).unwrap();
        sink.log(LogRecord::new(LogLevel::Warn, "t", "kept"));
        sink.close();
        sink.log(LogRecord::new(LogLevel::Warn, "t", "discarded"));

        let content = std::fs::read_to_string(sink.current_path()).unwrap();
        assert!(content.contains("| WARN | kept"));
        assert!(!content.contains("discarded"));
    }
}
