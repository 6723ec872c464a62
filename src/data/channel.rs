// ============================================================
// Layer 4 — Channel Sources
// ============================================================
// Concrete implementations of the ChannelSource trait.
//
// The managed platform delivers a channel in one of two modes:
//
//   File mode → the whole channel is copied to a local directory
//               (SM_CHANNEL_<NAME>) before the trial starts.
//               Every pass re-reads the same files.
//
//   Pipe mode → the channel is streamed through a named pipe.
//               The platform creates a fresh FIFO per pass,
//               named <root>/<channel>_<pass>, and a pass ends
//               when the writer closes it. The FIFO of pass n+1
//               only shows up once pass n has been read, so
//               PipeChannel polls for it up to a deadline.
//
// MemoryChannel (test builds only) replays in-memory records
// and can add an artificial per-record delay to mimic a slow
// network source. It also counts open and live streams so tests
// can check that every stream handle gets released.

use std::{
    collections::{HashMap, VecDeque},
    fs::{self, File},
    io::{self, BufReader, ErrorKind},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use crate::data::tfrecord::TfRecordReader;
use crate::domain::error::RecordError;
use crate::domain::traits::{Channel, ChannelSource, RecordStream};

// ─── File mode ────────────────────────────────────────────────────────────────

/// Reads every `.tfrecord` / `.tfrecords` file of a channel directory.
#[derive(Debug, Clone, Default)]
pub struct FileChannel {
    dirs: HashMap<Channel, PathBuf>,
}

impl FileChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(mut self, channel: Channel, dir: impl Into<PathBuf>) -> Self {
        self.dirs.insert(channel, dir.into());
        self
    }

    fn record_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("tfrecord") | Some("tfrecords")
                    )
            })
            .collect();
        // Deterministic pass order regardless of directory listing order
        files.sort();
        Ok(files)
    }
}

impl ChannelSource for FileChannel {
    fn open(&self, channel: Channel, pass: usize) -> io::Result<RecordStream> {
        let dir = self.dirs.get(&channel).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no directory configured for channel '{channel}'"))
        })?;

        let files = Self::record_files(dir)?;
        if files.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no record files in '{}'", dir.display()),
            ));
        }

        tracing::debug!("Channel '{}' pass {}: {} record files", channel, pass, files.len());
        Ok(Box::new(FileStream { files: files.into(), current: None }))
    }
}

/// Opens the files of one pass lazily, one after another.
struct FileStream {
    files:   VecDeque<PathBuf>,
    current: Option<TfRecordReader<BufReader<File>>>,
}

impl Iterator for FileStream {
    type Item = Result<Vec<u8>, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                match reader.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }

            let path = self.files.pop_front()?;
            match File::open(&path) {
                Ok(file) => self.current = Some(TfRecordReader::new(BufReader::new(file))),
                Err(e) => {
                    self.files.clear();
                    return Some(Err(RecordError::Io(e)));
                }
            }
        }
    }
}

// ─── Pipe mode ────────────────────────────────────────────────────────────────

const PIPE_WAIT: Duration = Duration::from_secs(60);
const PIPE_POLL: Duration = Duration::from_millis(50);

/// Opens the per-pass FIFO `<root>/<channel>_<pass>`.
#[derive(Debug, Clone)]
pub struct PipeChannel {
    root: PathBuf,
    wait: Duration,
    poll: Duration,
}

impl PipeChannel {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), wait: PIPE_WAIT, poll: PIPE_POLL }
    }

    /// How long to wait for a pass's FIFO before giving up.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self.poll = self.poll.min(wait);
        self
    }

    pub fn fifo_path(&self, channel: Channel, pass: usize) -> PathBuf {
        self.root.join(format!("{}_{}", channel.name(), pass))
    }
}

impl ChannelSource for PipeChannel {
    fn open(&self, channel: Channel, pass: usize) -> io::Result<RecordStream> {
        self.open_until(channel, pass, &AtomicBool::new(false))
    }

    fn open_until(&self, channel: Channel, pass: usize, stop: &AtomicBool) -> io::Result<RecordStream> {
        let path     = self.fifo_path(channel, pass);
        let deadline = Instant::now() + self.wait;

        while !path.exists() {
            if stop.load(Ordering::SeqCst) {
                return Err(io::Error::new(
                    ErrorKind::Interrupted,
                    format!("stopped waiting for '{}'", path.display()),
                ));
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    ErrorKind::TimedOut,
                    format!("'{}' did not appear within {:?}", path.display(), self.wait),
                ));
            }
            thread::sleep(self.poll);
        }

        tracing::debug!("Opening pipe '{}'", path.display());
        // Blocks until the platform attaches a writer.
        let file = File::open(&path)?;
        Ok(Box::new(TfRecordReader::new(BufReader::new(file))))
    }
}

// ─── In-memory ────────────────────────────────────────────────────────────────

#[cfg(test)]
pub use memory::MemoryChannel;


// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tfrecord::TfRecordWriter;

    fn write_records(path: &Path, records: &[&[u8]]) {
        let mut writer = TfRecordWriter::new(File::create(path).unwrap());
        for r in records {
            writer.write_record(r).unwrap();
        }
        writer.into_inner().unwrap();
    }

    #[test]
    fn test_file_channel_reads_sorted_files_each_pass() {
        let dir = tempfile::tempdir().unwrap();
        write_records(&dir.path().join("b.tfrecords"), &[b"b1"]);
        write_records(&dir.path().join("a.tfrecord"), &[b"a1", b"a2"]);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = FileChannel::new().with_dir(Channel::Train, dir.path());
        for pass in 0..2 {
            let records: Vec<Vec<u8>> = source
                .open(Channel::Train, pass)
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap();
            assert_eq!(records, vec![b"a1".to_vec(), b"a2".to_vec(), b"b1".to_vec()]);
        }
    }

    #[test]
    fn test_file_channel_without_records_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileChannel::new().with_dir(Channel::Eval, dir.path());
        assert!(source.open(Channel::Eval, 0).is_err());
        assert!(source.open(Channel::Train, 0).is_err());
    }

    #[test]
    fn test_pipe_channel_opens_per_pass_path() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file stands in for the FIFO.
        write_records(&dir.path().join("eval_3"), &[b"x"]);

        let source = PipeChannel::new(dir.path()).with_wait(Duration::from_millis(100));
        assert_eq!(source.fifo_path(Channel::Train, 0), dir.path().join("train_0"));
        assert_eq!(source.open(Channel::Eval, 3).unwrap().count(), 1);

        let err = source.open(Channel::Eval, 4).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn test_pipe_channel_waits_for_late_pass() {
        let dir     = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let path    = dir.path().join("train_1");
        let late = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            // Appear whole, the way a FIFO appears before its writer attaches.
            write_records(&staging, &[b"late"]);
            fs::rename(&staging, &path).unwrap();
        });

        let source  = PipeChannel::new(dir.path()).with_wait(Duration::from_secs(10));
        let records: Vec<Vec<u8>> = source
            .open(Channel::Train, 1)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records, vec![b"late".to_vec()]);
        late.join().unwrap();
    }

    #[test]
    fn test_pipe_channel_stops_waiting_when_asked() {
        let dir    = tempfile::tempdir().unwrap();
        let source = PipeChannel::new(dir.path());
        let stop   = AtomicBool::new(true);

        let started = Instant::now();
        let err = source.open_until(Channel::Eval, 0, &stop).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_memory_channel_tracks_live_streams() {
        let source = MemoryChannel::new().with_records(Channel::Train, vec![vec![1], vec![2]]);
        let stream = source.open(Channel::Train, 0).unwrap();
        assert_eq!(source.live(), 1);
        assert_eq!(stream.count(), 2);
        assert_eq!(source.live(), 0);
        assert_eq!(source.opened(), 1);
    }
}
