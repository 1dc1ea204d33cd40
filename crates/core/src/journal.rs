//! Append-only JSONL event journal.
//!
//! Each line is one JSON-serialized event. The journal supports replay for
//! crash recovery, rotation for archival, and skips corrupt lines on replay
//! instead of failing the whole read.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Append-only journal of events of type `E`.
///
/// Writes are flushed after every batch. A batch that fails to write leaves
/// the writer usable: unflushed bytes are discarded and the next batch starts
/// on a fresh line, so a torn line is skipped on replay rather than merged
/// into the next event.
pub struct EventJournal<E> {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Lines in the live file.
    lines: usize,
    /// Set after a failed write; the file may end in a partial line.
    torn: bool,
    _event: PhantomData<fn() -> E>,
}

impl<E> EventJournal<E>
where
    E: Serialize + DeserializeOwned,
{
    /// Create or open a journal file at the given path.
    pub fn open(path: PathBuf) -> Result<Self> {
        let writer = Self::open_writer(&path)?;
        let lines = Self::count_lines(&path)?;
        Ok(Self {
            path,
            writer,
            lines,
            torn: false,
            _event: PhantomData,
        })
    }

    /// Path of the live journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of events in the live file, including any present at open.
    pub fn len(&self) -> usize {
        self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines == 0
    }

    /// Append a batch of events, flushing once at the end.
    ///
    /// Either every event reaches the file or an error is returned. On error
    /// the caller still owns the events and may retry them.
    pub fn append_all<'a, I>(&mut self, events: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        let mut buf = String::new();
        if self.torn {
            buf.push('\n');
        }
        let mut written = 0;
        for event in events {
            let json = serde_json::to_string(event).context("failed to serialize event")?;
            buf.push_str(&json);
            buf.push('\n');
            written += 1;
        }
        if written == 0 {
            return Ok(0);
        }

        let result = self
            .writer
            .write_all(buf.as_bytes())
            .and_then(|()| self.writer.flush());
        if let Err(e) = result {
            self.reset_writer()?;
            self.torn = true;
            return Err(e).context("failed to write to journal");
        }
        self.torn = false;
        self.lines += written;
        Ok(written)
    }

    /// Replay all events in file order.
    ///
    /// Corrupt lines are skipped with a warning.
    pub fn replay(&self) -> Result<Vec<E>> {
        let file = File::open(&self.path).with_context(|| {
            format!("failed to open journal for replay at {}", self.path.display())
        })?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.context("failed to read journal line")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<E>(&line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(
                        line_num = line_num + 1,
                        error = %e,
                        "skipping corrupt journal line"
                    );
                }
            }
        }

        Ok(events)
    }

    /// Rename the current file with a timestamp suffix and start a fresh one.
    ///
    /// Returns the path of the rotated (old) file. If the rename fails the
    /// journal keeps writing to the current file.
    pub fn rotate(&mut self) -> Result<PathBuf> {
        self.writer.flush().context("failed to flush journal before rotation")?;

        let rotated_path = self.archive_path();
        std::fs::rename(&self.path, &rotated_path)
            .with_context(|| format!("failed to rotate journal to {}", rotated_path.display()))?;

        self.writer = Self::open_writer(&self.path)?;
        self.lines = 0;
        self.torn = false;
        Ok(rotated_path)
    }

    /// `<stem>_<utc timestamp>[_<n>].<ext>` next to the live file, never an
    /// existing path.
    fn archive_path(&self) -> PathBuf {
        let suffix = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "journal".into());
        let ext = self
            .path
            .extension()
            .map(|s| format!(".{}", s.to_string_lossy()))
            .unwrap_or_default();
        let dir = self.path.parent().unwrap_or(Path::new("."));

        let mut candidate = dir.join(format!("{}_{}{}", stem, suffix, ext));
        let mut n = 1;
        while candidate.exists() {
            candidate = dir.join(format!("{}_{}_{}{}", stem, suffix, n, ext));
            n += 1;
        }
        candidate
    }

    /// Drop unflushed bytes and reopen the file for appending.
    fn reset_writer(&mut self) -> Result<()> {
        let fresh = Self::open_writer(&self.path)?;
        let old = std::mem::replace(&mut self.writer, fresh);
        // `into_parts` hands back the buffer instead of flushing it on drop.
        let (_file, _unflushed) = old.into_parts();
        Ok(())
    }

    fn count_lines(path: &Path) -> Result<usize> {
        // Devices and pipes have no meaningful line count.
        if !path.is_file() {
            return Ok(0);
        }
        let file = File::open(path).with_context(|| {
            format!("failed to open journal for counting at {}", path.display())
        })?;
        let count = BufReader::new(file)
            .lines()
            .map_while(|l| l.ok())
            .filter(|l| !l.trim().is_empty())
            .count();
        Ok(count)
    }

    fn open_writer(path: &Path) -> Result<BufWriter<File>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create journal directory {}", parent.display())
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open journal at {}", path.display()))?;
        Ok(BufWriter::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write as IoWrite;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Marker {
        seq: u64,
        note: String,
    }

    fn marker(seq: u64) -> Marker {
        Marker {
            seq,
            note: format!("event {}", seq),
        }
    }

    fn journal_in(dir: &tempfile::TempDir, name: &str) -> EventJournal<Marker> {
        EventJournal::open(dir.path().join(format!("{}.jsonl", name))).unwrap()
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut journal = journal_in(&dir, "write_read");
            journal.append_all([&marker(1)]).unwrap();
        }
        let journal = journal_in(&dir, "write_read");
        assert_eq!(journal.replay().unwrap(), vec![marker(1)]);
    }

    #[test]
    fn test_multiple_events_maintain_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = journal_in(&dir, "order");
        let batch: Vec<_> = (1..=5).map(marker).collect();
        assert_eq!(journal.append_all(&batch).unwrap(), 5);

        let events = journal.replay().unwrap();
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.seq, (i + 1) as u64);
        }
    }

    #[test]
    fn test_len_counts_existing_and_new_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = journal_in(&dir, "count");
        assert!(journal.is_empty());
        for i in 1..=3 {
            journal.append_all([&marker(i)]).unwrap();
        }
        assert_eq!(journal.len(), 3);
        assert_eq!(journal.append_all(&Vec::<Marker>::new()).unwrap(), 0);

        let reopened = journal_in(&dir, "count");
        assert_eq!(reopened.len(), 3);
    }

    #[test]
    fn test_rotate_creates_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = journal_in(&dir, "rotate");
        journal.append_all([&marker(1), &marker(2)]).unwrap();

        let rotated = journal.rotate().unwrap();
        assert!(rotated.exists());
        let old_lines = BufReader::new(File::open(&rotated).unwrap()).lines().count();
        assert_eq!(old_lines, 2);

        assert!(journal.is_empty());
        journal.append_all([&marker(3)]).unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.replay().unwrap(), vec![marker(3)]);
    }

    #[test]
    fn test_rotations_never_overwrite_archives() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = journal_in(&dir, "archive");
        let mut archives = Vec::new();
        for i in 1..=3 {
            journal.append_all([&marker(i)]).unwrap();
            archives.push(journal.rotate().unwrap());
        }
        archives.sort();
        archives.dedup();
        assert_eq!(archives.len(), 3);
        for path in &archives {
            assert_eq!(BufReader::new(File::open(path).unwrap()).lines().count(), 1);
        }
    }

    #[test]
    fn test_failed_rotation_keeps_writer() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = journal_in(&dir, "stuck");
        journal.append_all([&marker(1)]).unwrap();
        // Rename cannot succeed once the live file is gone.
        std::fs::remove_file(journal.path()).unwrap();

        assert!(journal.rotate().is_err());
        journal.append_all([&marker(2)]).unwrap();
        assert_eq!(journal.len(), 2);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_write_reports_error_and_stays_usable() {
        let mut journal: EventJournal<Marker> =
            EventJournal::open(PathBuf::from("/dev/full")).unwrap();
        assert!(journal.append_all([&marker(1)]).is_err());
        assert!(journal.append_all([&marker(2)]).is_err());
        assert_eq!(journal.len(), 0);
    }

    #[test]
    fn test_line_after_torn_write_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("torn.jsonl");
        let mut journal: EventJournal<Marker> = EventJournal::open(path.clone()).unwrap();
        journal.append_all([&marker(1)]).unwrap();
        // A partial line left behind by an interrupted write.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            write!(file, "{{\"seq\":2,\"no").unwrap();
        }
        journal.torn = true;
        journal.append_all([&marker(3)]).unwrap();

        assert_eq!(journal.replay().unwrap(), vec![marker(1), marker(3)]);
    }

    #[test]
    fn test_handle_corrupt_line_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.jsonl");
        {
            let mut file = File::create(&path).unwrap();
            writeln!(file, "{}", serde_json::to_string(&marker(1)).unwrap()).unwrap();
            writeln!(file, "{{this is not valid json}}").unwrap();
            writeln!(file, "{}", serde_json::to_string(&marker(2)).unwrap()).unwrap();
        }

        let journal: EventJournal<Marker> = EventJournal::open(path).unwrap();
        assert_eq!(journal.replay().unwrap(), vec![marker(1), marker(2)]);
    }

    #[test]
    fn test_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.jsonl");
        let mut journal: EventJournal<Marker> = EventJournal::open(path.clone()).unwrap();
        journal.append_all([&marker(7)]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        journal_in(&dir, "persist").append_all([&marker(1)]).unwrap();
        journal_in(&dir, "persist").append_all([&marker(2)]).unwrap();
        assert_eq!(journal_in(&dir, "persist").replay().unwrap().len(), 2);
    }
}
