//! Pages: the unit of transfer through the frontier
//!
//! A page is a bounded, append-only run of states with an id handed out by
//! [`PageQueue::claim`](crate::page_queue::PageQueue::claim). A producer
//! fills it, the queue either keeps it in memory or spills it to disk, and
//! exactly one worker consumes it.
//!
//! # File Format
//!
//! ```text
//! count: u32 (4 bytes, little-endian)
//! state 0 .. state count-1: StateNode encoding
//! ```
//!
//! Files are written as `<id>.pq.tmp` and renamed to `<id>.pq`, so a reader
//! polling for `<id>.pq` sees either nothing or the complete page.

use crate::error::{ExploreError, ExploreResult};
use crate::state::{ModelState, StateNode};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Page identifier; allocated from 1 upwards and never reused within a run.
pub type PageId = u64;

/// Extension of a complete page file.
pub const PAGE_EXT: &str = "pq";

/// Upper bound on slots reserved up front; large pages grow on demand.
const PREALLOC_LIMIT: usize = 4096;

/// A fixed-capacity batch of states.
#[derive(Debug)]
pub struct Page<S> {
    id: PageId,
    capacity: usize,
    states: Vec<StateNode<S>>,
}

impl<S: ModelState> Page<S> {
    /// Create an empty page. No I/O happens until [`Page::write`].
    pub fn new(id: PageId, capacity: usize) -> Self {
        Page {
            id,
            capacity,
            states: Vec::with_capacity(capacity.min(PREALLOC_LIMIT)),
        }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of states added so far.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.states.len() == self.capacity
    }

    /// Append a state.
    ///
    /// # Panics
    ///
    /// Panics if the page is already full. Producers check
    /// [`Page::is_full`] after every add and hand full pages to the queue.
    pub fn add(&mut self, node: StateNode<S>) {
        assert!(
            self.states.len() < self.capacity,
            "page {} overflow: capacity is {}",
            self.id,
            self.capacity
        );
        self.states.push(node);
    }

    pub fn get(&self, idx: usize) -> Option<&StateNode<S>> {
        self.states.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateNode<S>> {
        self.states.iter()
    }

    /// Consume the page, yielding its states in insertion order.
    pub fn into_states(self) -> Vec<StateNode<S>> {
        self.states
    }

    /// Path of the complete page file for `id` in `dir`.
    pub fn file_path(dir: &Path, id: PageId) -> PathBuf {
        dir.join(format!("{}.{}", id, PAGE_EXT))
    }

    fn tmp_path(dir: &Path, id: PageId) -> PathBuf {
        dir.join(format!("{}.{}.tmp", id, PAGE_EXT))
    }

    /// Serialize the page into `dir` and make it visible with an atomic rename.
    ///
    /// Returns the path of the visible page file.
    pub fn write(&self, dir: &Path) -> ExploreResult<PathBuf> {
        let tmp = Self::tmp_path(dir, self.id);
        self.write_tmp(&tmp)
            .map_err(|e| ExploreError::page_write(&tmp, e))?;

        let path = Self::file_path(dir, self.id);
        fs::rename(&tmp, &path).map_err(|e| ExploreError::page_write(&path, e))?;
        Ok(path)
    }

    fn write_tmp(&self, tmp: &Path) -> std::io::Result<()> {
        let count = u32::try_from(self.states.len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "page exceeds u32 states")
        })?;
        let mut writer = BufWriter::new(File::create(tmp)?);
        writer.write_all(&count.to_le_bytes())?;
        for node in &self.states {
            node.encode(&mut writer)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Deserialize the page stored at `path` and delete the file.
    ///
    /// Any decode failure is reported as [`ExploreError::PageRead`]; the
    /// caller treats it as a corrupted frontier.
    pub fn read(path: &Path, id: PageId, capacity: usize) -> ExploreResult<Self> {
        let file = File::open(path).map_err(|e| ExploreError::page_read(path, e))?;
        let mut reader = BufReader::new(file);

        let mut count = [0u8; 4];
        reader
            .read_exact(&mut count)
            .map_err(|e| ExploreError::page_read(path, e))?;
        let count = u32::from_le_bytes(count) as usize;
        if count == 0 || count > capacity {
            return Err(ExploreError::page_read(
                path,
                format!("page {} holds {} states, capacity is {}", id, count, capacity),
            ));
        }

        let mut page = Page::new(id, capacity);
        for i in 0..count {
            let node = StateNode::decode(&mut reader).map_err(|e| {
                ExploreError::page_read(path, format!("state {} of {}: {}", i, count, e))
            })?;
            page.states.push(node);
        }
        drop(reader);

        fs::remove_file(path).map_err(|e| ExploreError::page_read(path, e))?;
        Ok(page)
    }
}
