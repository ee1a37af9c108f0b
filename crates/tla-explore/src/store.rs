//! Residency of queued pages
//!
//! A queued page lives in exactly one place until a worker takes it: the
//! in-memory map for ids within the memory budget, a page file on disk for
//! everything after. [`PageStore`] is the capability both share; the queue
//! picks one per page id.

use crate::error::{ExploreError, ExploreResult};
use crate::page::{Page, PageId, PAGE_EXT};
use crate::state::ModelState;
use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::fs;
use std::hash::BuildHasherDefault;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// FxHasher-based BuildHasher for u64 page ids.
type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Where queued pages are kept until dequeued.
pub trait PageStore<S: ModelState>: Send + Sync {
    /// Make `page` available to whichever worker holds its ticket.
    fn put(&self, page: Page<S>) -> ExploreResult<()>;

    /// Remove and return page `id`.
    ///
    /// `Ok(None)` means the page has not been produced yet; that is the
    /// expected state of affairs for a freshly dispensed ticket.
    fn take(&self, id: PageId, capacity: usize) -> ExploreResult<Option<Page<S>>>;

    /// Number of pages currently resident.
    fn resident(&self) -> usize;

    /// Drop every resident page. Returns how many were dropped.
    fn clear(&self) -> ExploreResult<usize>;
}

/// Pages kept in a concurrent map.
pub struct MemoryStore<S> {
    pages: DashMap<PageId, Page<S>, FxBuildHasher>,
}

impl<S: ModelState> MemoryStore<S> {
    pub fn new() -> Self {
        MemoryStore {
            pages: DashMap::with_hasher(FxBuildHasher::default()),
        }
    }
}

impl<S: ModelState> Default for MemoryStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ModelState> PageStore<S> for MemoryStore<S> {
    fn put(&self, page: Page<S>) -> ExploreResult<()> {
        let id = page.id();
        let previous = self.pages.insert(id, page);
        debug_assert!(previous.is_none(), "page {} enqueued twice", id);
        Ok(())
    }

    fn take(&self, id: PageId, _capacity: usize) -> ExploreResult<Option<Page<S>>> {
        Ok(self.pages.remove(&id).map(|(_, page)| page))
    }

    fn resident(&self) -> usize {
        self.pages.len()
    }

    fn clear(&self) -> ExploreResult<usize> {
        let dropped = self.pages.len();
        self.pages.clear();
        Ok(dropped)
    }
}

/// Pages spilled to `<dir>/<id>.pq` files.
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Use `dir` for page files, creating it if needed.
    ///
    /// Page files already in `dir` belong to an earlier run. Their ids would
    /// collide with this run's tickets, so they are deleted.
    pub fn new(dir: impl Into<PathBuf>) -> ExploreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let store = DiskStore { dir };
        let stale = store.remove_page_files()?;
        if stale > 0 {
            warn!(dir = %store.dir.display(), stale, "removed page files left by an earlier run");
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Complete and partially written page files in the directory.
    fn page_files(&self) -> ExploreResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if is_page_file(&path) {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn remove_page_files(&self) -> ExploreResult<usize> {
        let files = self.page_files()?;
        for path in &files {
            match fs::remove_file(path) {
                Ok(()) => {}
                // Taken by a reader in the meantime.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(ExploreError::page_write(path, e)),
            }
        }
        Ok(files.len())
    }
}

/// `<id>.pq` or `<id>.pq.tmp`
fn is_page_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let stem = name.strip_suffix(".tmp").unwrap_or(name);
    stem.strip_suffix(PAGE_EXT)
        .and_then(|id| id.strip_suffix('.'))
        .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
}

impl<S: ModelState> PageStore<S> for DiskStore {
    fn put(&self, page: Page<S>) -> ExploreResult<()> {
        let path = page.write(&self.dir)?;
        debug!(page = page.id(), states = page.len(), path = %path.display(), "spilled page to disk");
        Ok(())
    }

    fn take(&self, id: PageId, capacity: usize) -> ExploreResult<Option<Page<S>>> {
        let path = Page::<S>::file_path(&self.dir, id);
        if !path.exists() {
            return Ok(None);
        }
        let page = Page::read(&path, id, capacity)?;
        debug!(page = id, states = page.len(), "read page from disk");
        Ok(Some(page))
    }

    fn resident(&self) -> usize {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        entries
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == PAGE_EXT))
            .count()
    }

    fn clear(&self) -> ExploreResult<usize> {
        let dropped = self.remove_page_files()?;
        if dropped > 0 {
            debug!(dir = %self.dir.display(), dropped, "discarded unconsumed page files");
        }
        Ok(dropped)
    }
}
