//! Per-worker trace logs for counterexample reconstruction.
//!
//! Every worker appends one record per newly discovered state to its own
//! file, `<dir>/<spec>-<worker>.trace`. A record names the predecessor's
//! [`Uid`] and the new state's fingerprint, so the files together form a
//! forest whose roots are the initial states. Only fingerprints are kept:
//! after a violation, the path back to an initial state is recovered by
//! walking predecessor links, and the states themselves can be regenerated
//! by replaying the model along those fingerprints.
//!
//! # File Format
//!
//! ```text
//! Record at offset N:
//!   predecessor worker: u16 (2 bytes, little-endian)
//!   predecessor offset: u64 (8 bytes) - u64::MAX for initial states
//!   fingerprint: u64 (8 bytes)
//! ```
//!
//! Each record is exactly 18 bytes. A worker only ever appends to its own
//! file, so no locking is needed; reads happen after exploration stops.

use crate::collab::Expander;
use crate::error::{ExploreError, ExploreResult};
use crate::state::{Fingerprint, ModelState, Uid};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Extension of trace log files.
pub const TRACE_EXT: &str = "trace";

/// Predecessor offset marking an initial state.
/// 0 is a valid file offset (the first record).
const NO_PREDECESSOR: u64 = u64::MAX;

/// Size of each trace record in bytes.
pub const RECORD_SIZE: u64 = 18;

/// Append-only trace log owned by one worker.
///
/// # Thread Safety
///
/// Not thread-safe; each worker owns exactly one.
pub struct TraceFile {
    worker: u16,
    path: PathBuf,
    writer: BufWriter<File>,
    /// Offset of the next record
    write_pos: u64,
}

impl TraceFile {
    /// Path of the trace log for `worker`.
    pub fn file_path(dir: &Path, spec_name: &str, worker: u16) -> PathBuf {
        dir.join(format!("{}-{}.{}", spec_name, worker, TRACE_EXT))
    }

    /// Create (or truncate) the trace log for `worker` in `dir`.
    pub fn create(dir: &Path, spec_name: &str, worker: u16) -> io::Result<Self> {
        let path = Self::file_path(dir, spec_name, worker);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        Ok(TraceFile {
            worker,
            path,
            writer: BufWriter::new(file),
            write_pos: 0,
        })
    }

    pub fn worker(&self) -> u16 {
        self.worker
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an initial state, which has no predecessor.
    pub fn write_initial(&mut self, fingerprint: Fingerprint) -> io::Result<Uid> {
        self.write_record(Uid::new(self.worker, NO_PREDECESSOR), fingerprint)
    }

    /// Record a state reached from the state whose record is `predecessor`.
    pub fn write_state(&mut self, predecessor: Uid, fingerprint: Fingerprint) -> io::Result<Uid> {
        self.write_record(predecessor, fingerprint)
    }

    fn write_record(&mut self, predecessor: Uid, fingerprint: Fingerprint) -> io::Result<Uid> {
        let offset = self.write_pos;
        predecessor.encode(&mut self.writer)?;
        self.writer.write_all(&fingerprint.0.to_le_bytes())?;
        self.write_pos += RECORD_SIZE;
        Ok(Uid::new(self.worker, offset))
    }

    /// Flush any buffered writes to disk.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Get the number of records written.
    pub fn record_count(&self) -> u64 {
        self.write_pos / RECORD_SIZE
    }

    /// Read the record at `offset`: its predecessor (`None` for initial
    /// states) and its fingerprint.
    pub fn read_record(&mut self, offset: u64) -> io::Result<(Option<Uid>, Fingerprint)> {
        if offset % RECORD_SIZE != 0 || offset >= self.write_pos {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no trace record at offset {} in {}", offset, self.path.display()),
            ));
        }
        self.flush()?;

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let predecessor = Uid::decode(&mut file)?;
        let mut fp = [0u8; 8];
        file.read_exact(&mut fp)?;

        let predecessor = (predecessor.offset != NO_PREDECESSOR).then_some(predecessor);
        Ok((predecessor, Fingerprint(u64::from_le_bytes(fp))))
    }

    /// Predecessor of the record at `offset`.
    pub fn get_prev(&mut self, offset: u64) -> io::Result<Option<Uid>> {
        self.read_record(offset).map(|(prev, _)| prev)
    }

    /// Fingerprint stored in the record at `offset`.
    pub fn get_fp(&mut self, offset: u64) -> io::Result<Fingerprint> {
        self.read_record(offset).map(|(_, fp)| fp)
    }
}

impl Drop for TraceFile {
    fn drop(&mut self) {
        // Best-effort flush on drop
        let _ = self.flush();
    }
}

/// The trace logs of all workers of a finished run.
pub struct TraceSet {
    files: Vec<TraceFile>,
}

impl TraceSet {
    /// Collect trace logs; order does not matter.
    pub fn new(mut files: Vec<TraceFile>) -> Self {
        files.sort_by_key(TraceFile::worker);
        TraceSet { files }
    }

    fn file_mut(&mut self, worker: u16) -> ExploreResult<&mut TraceFile> {
        let idx = self
            .files
            .binary_search_by_key(&worker, TraceFile::worker)
            .map_err(|_| ExploreError::trace(worker, "no trace log for worker"))?;
        Ok(&mut self.files[idx])
    }

    pub fn record_count(&self) -> u64 {
        self.files.iter().map(TraceFile::record_count).sum()
    }

    /// Fingerprints from an initial state to the state recorded at `end`.
    ///
    /// Follows predecessor links backward, possibly hopping between
    /// workers' files, then reverses the path.
    pub fn fingerprint_path(&mut self, end: Uid) -> ExploreResult<Vec<Fingerprint>> {
        let limit = self.record_count();
        let mut fps = Vec::new();
        let mut current = Some(end);

        while let Some(uid) = current {
            if fps.len() as u64 >= limit {
                return Err(ExploreError::trace(
                    uid.worker,
                    format!("predecessor cycle reached from {}", end),
                ));
            }
            let file = self.file_mut(uid.worker)?;
            let (prev, fp) = file
                .read_record(uid.offset)
                .map_err(|e| ExploreError::trace(uid.worker, e))?;
            fps.push(fp);
            current = prev;
        }

        fps.reverse();
        Ok(fps)
    }
}

/// Rebuild the states along a fingerprint path.
///
/// Starts from the initial state matching `path[0]` and, for each later
/// fingerprint, regenerates the successors of the previous state and picks
/// the one that matches.
pub fn replay<S, E>(initial: &[S], expander: &E, path: &[Fingerprint]) -> ExploreResult<Vec<S>>
where
    S: ModelState,
    E: Expander<S> + ?Sized,
{
    let Some((first, rest)) = path.split_first() else {
        return Ok(Vec::new());
    };
    let start = initial
        .iter()
        .find(|s| s.fingerprint() == *first)
        .cloned()
        .ok_or_else(|| ExploreError::expansion(format!("no initial state has fingerprint {}", first)))?;

    let mut states = vec![start];
    for (step, fp) in rest.iter().enumerate() {
        let prev = &states[states.len() - 1];
        let next = expander
            .expand(prev)?
            .into_iter()
            .find(|s| s.fingerprint() == *fp)
            .ok_or_else(|| {
                ExploreError::expansion(format!(
                    "step {}: no successor has fingerprint {}",
                    step + 1,
                    fp
                ))
            })?;
        states.push(next);
    }
    Ok(states)
}
