//! Exploration worker
//!
//! Each worker thread loops over:
//!
//! 1. Take a state from the private backlog. If the backlog is empty,
//!    dequeue a page from the shared queue and move its states into the
//!    backlog. If the queue reports completion, stop.
//! 2. Expand the state, check each successor for novelty, and record a
//!    trace entry for every new one.
//! 3. Keep new states in the backlog while it is below the local limit;
//!    otherwise add them to the worker's held page, which goes to the queue
//!    as soon as it is full (or earlier, when `dequeue` asks for it).
//!
//! Any error stops the worker. It is published to the run's error sink
//! and FINISH is latched so the other workers drain out.

use crate::collab::{ErrorSink, Expander, NoveltyCheck};
use crate::error::{ExploreError, ExploreResult};
use crate::page::Page;
use crate::page_queue::{PageHolder, PageQueue};
use crate::state::{Fingerprint, ModelState, StateNode, Uid};
use crate::stats::{BucketStatistics, OUT_DEGREE_BUCKETS};
use crate::trace_file::TraceFile;
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, error};

/// What a worker needs besides the queue.
pub struct Collaborators<'a, S> {
    pub expander: &'a dyn Expander<S>,
    pub seen: &'a dyn NoveltyCheck,
    pub errors: &'a dyn ErrorSink<S>,
}

/// One exploration thread's private state.
pub struct Worker<S> {
    id: u16,
    /// States taken off the queue or kept locally, not yet expanded
    backlog: VecDeque<StateNode<S>>,
    /// Claimed page collecting overflow successors
    held: Option<Page<S>>,
    local_limit: usize,
    /// States put into the backlog
    local_generated: u64,
    /// States taken out of the backlog
    local_processed: u64,
    trace: TraceFile,
    states_generated: u64,
    out_degree: BucketStatistics,
    max_level: u32,
}

/// Stops every other worker if this one unwinds.
struct FinishOnPanic<'a, S>(&'a PageQueue<S>);

impl<S> Drop for FinishOnPanic<'_, S> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.finish_all();
        }
    }
}

impl<S: ModelState> Worker<S> {
    /// Create worker `id` with its trace log in `dir`.
    pub fn create(id: u16, dir: &Path, spec_name: &str, local_limit: usize) -> ExploreResult<Self> {
        let trace = TraceFile::create(dir, spec_name, id).map_err(|e| ExploreError::trace(id, e))?;
        Ok(Worker {
            id,
            backlog: VecDeque::new(),
            held: None,
            local_limit,
            local_generated: 0,
            local_processed: 0,
            trace,
            states_generated: 0,
            out_degree: BucketStatistics::new(format!("worker {} out-degree", id), OUT_DEGREE_BUCKETS),
            max_level: 0,
        })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    /// Run until the queue is exhausted or an error is reported anywhere.
    pub fn run(&mut self, queue: &PageQueue<S>, collab: &Collaborators<'_, S>) {
        let _guard = FinishOnPanic(queue);
        let mut current = None;
        let result = self
            .explore(queue, collab, &mut current)
            .and_then(|()| self.trace.flush().map_err(|e| ExploreError::trace(self.id, e)));

        match result {
            Ok(()) => debug!(
                worker = self.id,
                generated = self.states_generated,
                max_level = self.max_level,
                "worker done"
            ),
            Err(cause) => {
                error!(worker = self.id, %cause, "worker stopped");
                collab.errors.set_error_state(current.as_ref(), cause);
                queue.finish_all();
            }
        }
    }

    fn explore(
        &mut self,
        queue: &PageQueue<S>,
        collab: &Collaborators<'_, S>,
        current: &mut Option<StateNode<S>>,
    ) -> ExploreResult<()> {
        loop {
            if collab.errors.has_error() {
                return Ok(());
            }

            let node = match self.backlog.pop_front() {
                Some(node) => node,
                None => match queue.dequeue(self)? {
                    Some(page) => {
                        self.local_generated += page.len() as u64;
                        self.backlog.extend(page.into_states());
                        continue;
                    }
                    None => return Ok(()),
                },
            };
            self.local_processed += 1;

            let node = current.insert(node);
            self.expand(queue, collab, node)?;
            *current = None;
        }
    }

    fn expand(
        &mut self,
        queue: &PageQueue<S>,
        collab: &Collaborators<'_, S>,
        node: &StateNode<S>,
    ) -> ExploreResult<()> {
        let successors = collab.expander.expand(&node.state)?;
        self.states_generated += successors.len() as u64;
        self.out_degree.add_sample(successors.len() as u64);

        for succ in successors {
            let fp = succ.fingerprint();
            if !collab.seen.is_new(fp) {
                continue;
            }
            let uid = self.write_state(node, fp)?;
            self.push(queue, StateNode::new(succ, node.level + 1, uid))?;
        }
        Ok(())
    }

    fn push(&mut self, queue: &PageQueue<S>, node: StateNode<S>) -> ExploreResult<()> {
        if self.backlog.len() < self.local_limit {
            self.backlog.push_back(node);
            self.local_generated += 1;
            return Ok(());
        }

        let page = self.held.get_or_insert_with(|| queue.claim());
        page.add(node);
        if page.is_full() {
            if let Some(full) = self.held.take() {
                queue.enqueue(full)?;
            }
        }
        Ok(())
    }

    /// Record an initial state in this worker's trace log.
    pub fn write_initial(&mut self, fp: Fingerprint) -> ExploreResult<Uid> {
        self.max_level = self.max_level.max(1);
        self.trace
            .write_initial(fp)
            .map_err(|e| ExploreError::trace(self.id, e))
    }

    /// Record that `cur` led to the state with fingerprint `successor`.
    pub fn write_state(&mut self, cur: &StateNode<S>, successor: Fingerprint) -> ExploreResult<Uid> {
        self.max_level = self.max_level.max(cur.level + 1);
        self.trace
            .write_state(cur.uid, successor)
            .map_err(|e| ExploreError::trace(self.id, e))
    }

    /// Predecessor of this worker's trace record at `offset`.
    pub fn get_prev(&mut self, offset: u64) -> ExploreResult<Option<Uid>> {
        self.trace
            .get_prev(offset)
            .map_err(|e| ExploreError::trace(self.id, e))
    }

    /// Fingerprint of this worker's trace record at `offset`.
    pub fn get_fp(&mut self, offset: u64) -> ExploreResult<Fingerprint> {
        self.trace
            .get_fp(offset)
            .map_err(|e| ExploreError::trace(self.id, e))
    }

    /// Successor states computed, duplicates included.
    pub fn states_generated(&self) -> u64 {
        self.states_generated
    }

    pub fn out_degree(&self) -> &BucketStatistics {
        &self.out_degree
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// States in the backlog that were never expanded.
    pub fn unexplored(&self) -> u64 {
        self.local_generated - self.local_processed
    }

    /// Give up the trace log, e.g. to reconstruct a counterexample.
    pub fn into_trace(self) -> TraceFile {
        self.trace
    }
}

impl<S> PageHolder<S> for Worker<S> {
    fn has_page(&self) -> bool {
        self.held.is_some()
    }

    fn release_page(&mut self) -> Option<Page<S>> {
        self.held.take()
    }
}
