//! The shared frontier of unexplored states
//!
//! `PageQueue` hands out page ids from `head` and dequeue tickets from
//! `tail`. Both are plain atomic counters; nothing serializes the queue as a
//! whole.
//!
//! # Protocol
//!
//! - `claim` allocates the next page id (`head += 1`).
//! - `enqueue` makes a filled page resident: in memory while its id is
//!   within the memory budget, on disk afterwards.
//! - `dequeue` takes the next ticket with a CAS on `tail`. The ticket *is*
//!   the id of the page the caller will receive, so every page is delivered
//!   to exactly one worker. If that page has not been enqueued yet the
//!   caller waits for it.
//!
//! While waiting, a worker re-reads both counters on every poll:
//!
//! 1. `tail == FINISH`: someone already declared completion.
//! 2. `head == tail - workers`: every worker waits on a ticket past the
//!    last allocated page, so no page can ever be produced again. The
//!    caller latches FINISH.
//! 3. The caller still holds its own partially filled page and either the
//!    queue has run dry (`head <= tail`) or it has polled
//!    `donation_retries` times: it donates that page. This breaks cycles
//!    where worker A waits for page 42 while holding page 43 and worker B
//!    waits for 43 while holding 42.
//!
//! Page ids are dispensed in order but may become resident out of order.

use crate::config::ExploreConfig;
use crate::error::{ExploreError, ExploreResult};
use crate::page::{Page, PageId};
use crate::state::{ModelState, StateNode};
use crate::store::{DiskStore, MemoryStore, PageStore};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Value of `tail` once exploration has finished. One-way latch.
pub const FINISH: u64 = u64::MAX;

/// How many states a page holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSizing {
    /// Every page has the same capacity
    Fixed(usize),
    /// Capacity grows with the page id, see [`stepped_page_size`]
    Stepped,
}

impl PageSizing {
    /// Capacity of the page with the given id.
    pub fn capacity(&self, id: PageId) -> usize {
        match *self {
            PageSizing::Fixed(n) => n,
            PageSizing::Stepped => stepped_page_size(id),
        }
    }
}

/// Small pages while the frontier is small, large ones once it has grown.
pub const fn stepped_page_size(h: u64) -> usize {
    if h < 10 {
        1
    } else if h < 100 {
        10
    } else if h < 1_000 {
        10_000
    } else if h < 10_000 {
        100_000
    } else {
        1_000_000
    }
}

/// True iff every one of `workers` workers holds a ticket beyond the last
/// allocated page, i.e. no outstanding ticket can ever be served.
pub const fn is_exhausted(head: u64, tail: u64, workers: u64) -> bool {
    if tail == FINISH || tail < workers {
        return false;
    }
    head == tail - workers
}

/// The side of a worker that `dequeue` may ask to donate its held page.
pub trait PageHolder<S> {
    /// Whether a claimed but not yet enqueued page is held.
    fn has_page(&self) -> bool;

    /// Give up the held page so it can be enqueued.
    fn release_page(&mut self) -> Option<Page<S>>;
}

/// A bare page slot, for callers without a worker around it.
impl<S> PageHolder<S> for Option<Page<S>> {
    fn has_page(&self) -> bool {
        self.is_some()
    }

    fn release_page(&mut self) -> Option<Page<S>> {
        self.take()
    }
}

/// Shared frontier for one exploration run.
pub struct PageQueue<S> {
    /// Last allocated page id
    head: AtomicU64,
    /// Last dispensed ticket, or FINISH
    tail: AtomicU64,
    memory: MemoryStore<S>,
    disk: DiskStore,
    workers: u64,
    page_sizing: PageSizing,
    in_memory_pages: u64,
    donation_retries: u32,
    poll_interval: Duration,
}

impl<S> PageQueue<S> {
    /// Latch FINISH; every later or waiting `dequeue` returns `None`.
    pub fn finish_all(&self) {
        self.tail.store(FINISH, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.tail.load(Ordering::SeqCst) == FINISH
    }

    pub fn head(&self) -> u64 {
        self.head.load(Ordering::SeqCst)
    }

    pub fn tail(&self) -> u64 {
        self.tail.load(Ordering::SeqCst)
    }

    pub fn workers(&self) -> usize {
        self.workers as usize
    }
}

impl<S: ModelState> PageQueue<S> {
    /// Create a queue for `config.resolved_workers()` workers spilling to
    /// `config.disk_dir`.
    pub fn new(config: &ExploreConfig) -> ExploreResult<Self> {
        config.validate()?;
        let queue = PageQueue {
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
            memory: MemoryStore::new(),
            disk: DiskStore::new(&config.disk_dir)?,
            workers: config.resolved_workers() as u64,
            page_sizing: config.page_sizing,
            in_memory_pages: config.in_memory_pages,
            donation_retries: config.donation_retries,
            poll_interval: config.poll_interval,
        };
        info!(
            mem_limit = queue.in_memory_pages,
            page_size = ?queue.page_sizing,
            workers = queue.workers,
            dir = %config.disk_dir.display(),
            "loaded page queue"
        );
        Ok(queue)
    }

    /// Allocate the next page id and return an empty page for it.
    pub fn claim(&self) -> Page<S> {
        let id = self.head.fetch_add(1, Ordering::SeqCst) + 1;
        Page::new(id, self.page_sizing.capacity(id))
    }

    /// Enqueue a single state on a page of its own. Used for seeding.
    pub fn enqueue_state(&self, node: StateNode<S>) -> ExploreResult<()> {
        let mut page = self.claim();
        page.add(node);
        self.enqueue(page)
    }

    /// Make a claimed page available to the worker holding its ticket.
    pub fn enqueue(&self, page: Page<S>) -> ExploreResult<()> {
        debug_assert!(!page.is_empty(), "enqueued empty page {}", page.id());
        self.store_for(page.id()).put(page)
    }

    /// Take the next ticket and wait for its page.
    ///
    /// Returns `Ok(None)` once exploration is complete, either because
    /// another worker latched FINISH or because this call detected global
    /// exhaustion. `holder` may be asked to donate its held page while the
    /// call waits.
    pub fn dequeue<H>(&self, holder: &mut H) -> ExploreResult<Option<Page<S>>>
    where
        H: PageHolder<S> + ?Sized,
    {
        let ticket = loop {
            let t = self.tail.load(Ordering::SeqCst);
            if t == FINISH {
                return Ok(None);
            }
            if self
                .tail
                .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break t + 1;
            }
        };

        let mut retries = 0u32;
        loop {
            if let Some(page) = self.get_page(ticket)? {
                return Ok(Some(page));
            }

            let tail = self.tail.load(Ordering::SeqCst);
            let head = self.head.load(Ordering::SeqCst);
            if tail == FINISH {
                return Ok(None);
            }
            if is_exhausted(head, tail, self.workers) {
                debug_assert!(!holder.has_page(), "exhausted while holding a page");
                debug!(head, tail, "frontier exhausted");
                self.finish_all();
                return Ok(None);
            }
            if holder.has_page() {
                if head <= tail || retries >= self.donation_retries {
                    if let Some(page) = holder.release_page() {
                        trace!(ticket, donated = page.id(), retries, "donating held page");
                        self.enqueue(page)?;
                    }
                    retries = 0;
                    continue;
                }
                retries += 1;
            }
        }
    }

    fn store_for(&self, id: PageId) -> &dyn PageStore<S> {
        if id > self.in_memory_pages {
            &self.disk
        } else {
            &self.memory
        }
    }

    fn get_page(&self, ticket: PageId) -> ExploreResult<Option<Page<S>>> {
        let page = self
            .store_for(ticket)
            .take(ticket, self.page_sizing.capacity(ticket))?;
        if page.is_none() {
            if ticket > self.in_memory_pages && self.workers > 1 {
                // Nobody else can produce the page for a lone worker.
                std::thread::sleep(self.poll_interval);
            } else {
                std::thread::yield_now();
            }
        }
        Ok(page)
    }

    /// True iff no page has ever been allocated.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::SeqCst) == 0
    }

    /// Rough number of states allocated but not yet dequeued.
    ///
    /// Pages are not all full and the counters move while they are read, so
    /// this is only good for progress display.
    pub fn size(&self) -> u64 {
        let low = self.tail.load(Ordering::SeqCst);
        if low == FINISH {
            return 0;
        }
        let high = self.head.load(Ordering::SeqCst);
        let pages = high.saturating_sub(low);
        pages.saturating_mul(self.page_sizing.capacity(high) as u64)
    }

    /// Capacity of the next page `claim` will return.
    pub fn page_size(&self) -> usize {
        self.page_sizing
            .capacity(self.head.load(Ordering::SeqCst) + 1)
    }

    /// Pause all workers, e.g. for a checkpoint.
    pub fn suspend_all(&self) -> ExploreResult<bool> {
        Err(ExploreError::Unsupported("suspend_all"))
    }

    pub fn resume_all(&self) -> ExploreResult<()> {
        Err(ExploreError::Unsupported("resume_all"))
    }

    pub fn disk_dir(&self) -> &Path {
        self.disk.dir()
    }

    /// Drop every page that was enqueued but never dequeued, deleting
    /// spilled page files. Only meaningful once no worker runs.
    pub fn discard_pending(&self) -> ExploreResult<usize> {
        debug_assert!(self.is_finished(), "pages discarded while the queue is live");
        let dropped = self.memory.clear()? + PageStore::<S>::clear(&self.disk)?;
        if dropped > 0 {
            debug!(dropped, "discarded unexplored pages");
        }
        Ok(dropped)
    }

    /// Pages currently waiting in memory and on disk.
    pub fn resident_pages(&self) -> usize {
        self.memory.resident() + PageStore::<S>::resident(&self.disk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::{node, Num};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn queue(workers: usize, page_size: usize, in_memory: u64) -> (PageQueue<Num>, TempDir) {
        let dir = tempdir().unwrap();
        let config = ExploreConfig {
            workers,
            page_sizing: PageSizing::Fixed(page_size),
            in_memory_pages: in_memory,
            disk_dir: dir.path().to_path_buf(),
            poll_interval: Duration::from_millis(1),
            ..ExploreConfig::default()
        };
        (PageQueue::new(&config).unwrap(), dir)
    }

    #[test]
    fn test_stepped_page_size_breakpoints() {
        assert_eq!(stepped_page_size(0), 1);
        assert_eq!(stepped_page_size(9), 1);
        assert_eq!(stepped_page_size(10), 10);
        assert_eq!(stepped_page_size(99), 10);
        assert_eq!(stepped_page_size(100), 10_000);
        assert_eq!(stepped_page_size(999), 10_000);
        assert_eq!(stepped_page_size(1_000), 100_000);
        assert_eq!(stepped_page_size(9_999), 100_000);
        assert_eq!(stepped_page_size(10_000), 1_000_000);
    }

    #[test]
    fn test_exhaustion_predicate() {
        assert!(is_exhausted(3, 5, 2));
        assert!(is_exhausted(0, 1, 1));
        assert!(!is_exhausted(3, 4, 2));
        assert!(!is_exhausted(0, 1, 2));
        assert!(!is_exhausted(3, FINISH, 2));
    }

    #[test]
    fn test_claim_allocates_increasing_ids() {
        let (q, _dir) = queue(1, 4, 10);
        assert!(q.is_empty());
        let a = q.claim();
        let b = q.claim();
        assert_eq!((a.id(), b.id()), (1, 2));
        assert_eq!(a.capacity(), 4);
        assert!(!q.is_empty());
        assert_eq!(q.head(), 2);
    }

    #[test]
    fn test_single_worker_drains_then_finishes() {
        let (q, _dir) = queue(1, 1, 10);
        q.enqueue_state(node(1)).unwrap();
        q.enqueue_state(node(2)).unwrap();

        let mut none: Option<Page<Num>> = None;
        assert_eq!(q.dequeue(&mut none).unwrap().unwrap().id(), 1);
        assert_eq!(q.dequeue(&mut none).unwrap().unwrap().id(), 2);
        assert!(q.dequeue(&mut none).unwrap().is_none());
        assert!(q.is_finished());
        assert!(q.dequeue(&mut none).unwrap().is_none());
    }

    #[test]
    fn test_pages_past_budget_spill_to_disk() {
        let (q, dir) = queue(1, 2, 1);
        q.enqueue_state(node(1)).unwrap();
        let mut page = q.claim();
        page.add(node(2));
        page.add(node(3));
        q.enqueue(page).unwrap();

        assert!(!dir.path().join("1.pq").exists());
        assert!(dir.path().join("2.pq").exists());
        assert_eq!(q.resident_pages(), 2);

        let mut none: Option<Page<Num>> = None;
        q.dequeue(&mut none).unwrap().unwrap();
        let spilled = q.dequeue(&mut none).unwrap().unwrap();
        assert_eq!(spilled.len(), 2);
        assert!(!dir.path().join("2.pq").exists());
        assert_eq!(q.resident_pages(), 0);
    }

    #[test]
    fn test_held_page_is_donated_to_own_ticket() {
        // The only outstanding page is the caller's own.
        let (q, _dir) = queue(2, 1, 10);
        let mut held = Some(q.claim());
        if let Some(p) = held.as_mut() {
            p.add(node(7));
        }

        let page = q.dequeue(&mut held).unwrap().unwrap();
        assert_eq!(page.id(), 1);
        assert!(held.is_none());
    }

    #[test]
    fn test_finish_all_wakes_waiter() {
        let (q, _dir) = queue(3, 1, 10);
        let q = Arc::new(q);
        let waiter = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                let mut none: Option<Page<Num>> = None;
                q.dequeue(&mut none).unwrap().is_none()
            })
        };
        while q.tail() == 0 {
            std::thread::yield_now();
        }
        q.finish_all();
        assert!(waiter.join().unwrap());
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn test_size_is_approximate_page_count() {
        let (q, _dir) = queue(1, 5, 10);
        for i in 0..3 {
            q.enqueue_state(node(i)).unwrap();
        }
        assert_eq!(q.size(), 15);
        let mut none: Option<Page<Num>> = None;
        q.dequeue(&mut none).unwrap();
        assert_eq!(q.size(), 10);
    }

    #[test]
    fn test_suspend_resume_unsupported() {
        let (q, _dir) = queue(1, 1, 1);
        assert!(matches!(q.suspend_all(), Err(ExploreError::Unsupported("suspend_all"))));
        assert!(matches!(q.resume_all(), Err(ExploreError::Unsupported("resume_all"))));
    }

    #[test]
    fn test_concurrent_dequeue_delivers_each_page_once() {
        let workers = 4;
        let (q, _dir) = queue(workers, 1, 8);
        for i in 0..40 {
            q.enqueue_state(node(i)).unwrap();
        }

        let seen: Vec<Vec<PageId>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    s.spawn(|| {
                        let mut none: Option<Page<Num>> = None;
                        let mut ids = Vec::new();
                        while let Some(page) = q.dequeue(&mut none).unwrap() {
                            ids.push(page.id());
                        }
                        ids
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let all: Vec<PageId> = seen.into_iter().flatten().collect();
        let unique: HashSet<PageId> = all.iter().copied().collect();
        assert_eq!(all.len(), 40);
        assert_eq!(unique, (1..=40).collect());
        assert_eq!(q.tail(), FINISH);
    }

    #[test]
    fn test_discard_pending_after_finish() {
        let (q, dir) = queue(2, 1, 1);
        q.enqueue_state(node(1)).unwrap();
        q.enqueue_state(node(2)).unwrap();
        q.enqueue_state(node(3)).unwrap();
        assert_eq!(q.resident_pages(), 3);

        q.finish_all();
        assert_eq!(q.discard_pending().unwrap(), 3);
        assert_eq!(q.resident_pages(), 0);
        assert!(!dir.path().join("2.pq").exists());
    }

    #[test]
    fn test_new_queue_ignores_leftover_pages() {
        let dir = tempdir().unwrap();
        let mut stale = Page::new(2, 1);
        stale.add(node(1000));
        stale.write(dir.path()).unwrap();

        let config = ExploreConfig {
            workers: 1,
            page_sizing: PageSizing::Fixed(1),
            in_memory_pages: 0,
            disk_dir: dir.path().to_path_buf(),
            poll_interval: Duration::from_millis(1),
            ..ExploreConfig::default()
        };
        let q: PageQueue<Num> = PageQueue::new(&config).unwrap();
        q.enqueue_state(node(1)).unwrap();

        let mut none: Option<Page<Num>> = None;
        let first = q.dequeue(&mut none).unwrap().unwrap();
        assert_eq!(first.get(0).map(|n| n.state.clone()), Some(Num(1)));
        // Ticket 2 names a page this queue never allocated.
        assert!(q.dequeue(&mut none).unwrap().is_none());
        assert!(q.is_finished());
    }
}
