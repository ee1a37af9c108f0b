//! Driver for a parallel exploration run
//!
//! [`Explorer::run`] seeds the queue with the initial states, starts one
//! thread per worker, waits for all of them and summarizes the result. If
//! the model reported an error, the fingerprint path from an initial state
//! to the offending state is recovered from the workers' trace logs.
//!
//! Each run works in a fresh directory `<disk_dir>/<spec>-<pid>-<seq>`, so
//! runs sharing a `disk_dir` never see each other's page files or trace
//! logs. Pages still queued when a run stops are deleted; trace logs are
//! kept for the caller.

use crate::collab::{ErrorSink, Expander, FingerprintSet, FirstError, NoveltyCheck};
use crate::config::ExploreConfig;
use crate::error::{ExploreError, ExploreResult};
use crate::page_queue::PageQueue;
use crate::state::{Fingerprint, ModelState, StateNode};
use crate::stats::RunStats;
use crate::trace_file::TraceSet;
use crate::worker::{Collaborators, Worker};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Result of a run that did not fail inside the engine itself.
#[derive(Debug)]
pub enum Outcome<S> {
    /// Every reachable state was explored.
    Complete { stats: RunStats, run_dir: PathBuf },
    /// The model reported an error while expanding `state`.
    Error {
        state: StateNode<S>,
        cause: ExploreError,
        /// Fingerprints from an initial state to `state`, inclusive
        trace: Vec<Fingerprint>,
        stats: RunStats,
        run_dir: PathBuf,
    },
}

impl<S> Outcome<S> {
    pub fn stats(&self) -> &RunStats {
        match self {
            Outcome::Complete { stats, .. } | Outcome::Error { stats, .. } => stats,
        }
    }

    /// Directory holding this run's trace logs.
    pub fn run_dir(&self) -> &Path {
        match self {
            Outcome::Complete { run_dir, .. } | Outcome::Error { run_dir, .. } => run_dir,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Outcome::Complete { .. })
    }
}

/// Runs explorations with a fixed configuration.
pub struct Explorer {
    config: ExploreConfig,
}

impl Explorer {
    pub fn new(config: ExploreConfig) -> Self {
        Explorer { config }
    }

    pub fn config(&self) -> &ExploreConfig {
        &self.config
    }

    /// Explore from `initial` with an in-memory fingerprint set.
    pub fn check<S, E>(&self, initial: Vec<S>, expander: &E) -> ExploreResult<Outcome<S>>
    where
        S: ModelState,
        E: Expander<S>,
    {
        self.run(initial, expander, &FingerprintSet::new())
    }

    /// Explore from `initial`, deduplicating through `seen`.
    ///
    /// Engine failures (page or trace I/O, corrupted pages) are returned as
    /// `Err`. Errors raised by the model are returned as [`Outcome::Error`].
    pub fn run<S, E>(
        &self,
        initial: Vec<S>,
        expander: &E,
        seen: &dyn NoveltyCheck,
    ) -> ExploreResult<Outcome<S>>
    where
        S: ModelState,
        E: Expander<S>,
    {
        self.config.validate()?;
        let run_dir = create_run_dir(&self.config.disk_dir, &self.config.spec_name)?;
        let config = &ExploreConfig {
            disk_dir: run_dir.clone(),
            ..self.config.clone()
        };

        let workers = config.resolved_workers();
        let queue = PageQueue::new(config)?;
        let mut pool = (0..workers)
            .map(|id| Worker::create(id as u16, &run_dir, &config.spec_name, config.local_backlog))
            .collect::<ExploreResult<Vec<_>>>()?;

        let initial_generated = initial.len() as u64;
        let mut seeded = 0usize;
        for state in initial {
            let fp = state.fingerprint();
            if !seen.is_new(fp) {
                continue;
            }
            let uid = pool[0].write_initial(fp)?;
            queue.enqueue_state(StateNode::new(state, 1, uid))?;
            seeded += 1;
        }
        info!(workers, initial = seeded, dir = %run_dir.display(), "starting exploration");

        let started = Instant::now();
        let errors: FirstError<S> = FirstError::new();
        let collab = Collaborators {
            expander,
            seen,
            errors: &errors,
        };
        let joined = run_workers(pool, &queue, &collab);
        let discarded = queue.discard_pending();
        let pool = joined?;
        discarded?;

        let mut stats = RunStats::new(workers);
        stats.states_generated = initial_generated;
        stats.distinct_states = seen.len();
        for worker in &pool {
            stats.states_generated += worker.states_generated();
            stats.max_level = stats.max_level.max(worker.max_level());
            stats.out_degree.merge(worker.out_degree());
        }
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            generated = stats.states_generated,
            distinct = stats.distinct_states,
            depth = stats.max_level,
            "exploration finished"
        );

        let Some(report) = errors.into_inner() else {
            return Ok(Outcome::Complete { stats, run_dir });
        };
        let is_model_error = matches!(
            report.cause,
            ExploreError::Violation { .. } | ExploreError::Expansion { .. }
        );
        let state = match report.state {
            Some(state) if is_model_error => state,
            _ => return Err(report.cause),
        };

        let mut traces = TraceSet::new(pool.into_iter().map(Worker::into_trace).collect());
        let trace = traces.fingerprint_path(state.uid)?;
        warn!(cause = %report.cause, length = trace.len(), "error trace reconstructed");
        Ok(Outcome::Error {
            state,
            cause: report.cause,
            trace,
            stats,
            run_dir,
        })
    }
}

/// Sequence number distinguishing runs of one process.
static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

/// Create a directory under `base` that no other run uses.
fn create_run_dir(base: &Path, spec_name: &str) -> ExploreResult<PathBuf> {
    fs::create_dir_all(base)?;
    loop {
        let seq = RUN_SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = base.join(format!("{}-{}-{}", spec_name, std::process::id(), seq));
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            // Left behind by an earlier process with the same pid.
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Run every worker on its own named thread and hand the workers back.
fn run_workers<S: ModelState>(
    pool: Vec<Worker<S>>,
    queue: &PageQueue<S>,
    collab: &Collaborators<'_, S>,
) -> ExploreResult<Vec<Worker<S>>> {
    std::thread::scope(|s| {
        let mut handles = Vec::with_capacity(pool.len());
        for mut worker in pool {
            let spawned = std::thread::Builder::new()
                .name(format!("tla-explore-worker-{:03}", worker.id()))
                .spawn_scoped(s, move || {
                    worker.run(queue, collab);
                    worker
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Threads already running would wait for this one forever.
                    queue.finish_all();
                    return Err(ExploreError::Io(e));
                }
            }
        }
        Ok(handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_queue::PageSizing;
    use crate::state::tests::Num;
    use std::time::Duration;
    use tempfile::tempdir;

    fn explorer(dir: &std::path::Path, workers: usize) -> Explorer {
        Explorer::new(ExploreConfig {
            workers,
            page_sizing: PageSizing::Fixed(3),
            in_memory_pages: 4,
            disk_dir: dir.to_path_buf(),
            local_backlog: 2,
            poll_interval: Duration::from_millis(1),
            ..ExploreConfig::default()
        })
    }

    /// n -> n+1, n+2 below 50
    fn line(n: &Num) -> ExploreResult<Vec<Num>> {
        Ok([n.0 + 1, n.0 + 2].into_iter().filter(|&c| c < 50).map(Num).collect())
    }

    #[test]
    fn test_complete_run() {
        let dir = tempdir().unwrap();
        let outcome = explorer(dir.path(), 3).check(vec![Num(0)], &line).unwrap();
        let stats = outcome.stats();
        assert!(outcome.is_complete());
        assert_eq!(stats.distinct_states, 50);
        // 48 states with two successors, one with one, one with none
        assert_eq!(stats.states_generated, 1 + 48 * 2 + 1);
        assert_eq!(stats.out_degree.observations(), 50);
        assert_eq!(stats.workers, 3);
    }

    #[test]
    fn test_duplicate_initial_states_seeded_once() {
        let dir = tempdir().unwrap();
        let outcome = explorer(dir.path(), 2)
            .check(vec![Num(45), Num(45), Num(48)], &line)
            .unwrap();
        assert_eq!(outcome.stats().distinct_states, 5);
        // 45, 46 and 47 have two successors, 48 has one, 49 none
        assert_eq!(outcome.stats().states_generated, 3 + 2 + 2 + 2 + 1);
    }

    #[test]
    fn test_no_initial_states() {
        let dir = tempdir().unwrap();
        let outcome = explorer(dir.path(), 2).check(Vec::<Num>::new(), &line).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.stats().distinct_states, 0);
    }

    #[test]
    fn test_violation_reports_trace() {
        let dir = tempdir().unwrap();
        let guarded = |n: &Num| -> ExploreResult<Vec<Num>> {
            if n.0 == 7 {
                return Err(ExploreError::violation("reached 7"));
            }
            line(n)
        };
        let outcome = explorer(dir.path(), 2).check(vec![Num(0)], &guarded).unwrap();
        match outcome {
            Outcome::Error {
                state, cause, trace, ..
            } => {
                assert_eq!(state.state, Num(7));
                assert!(cause.is_violation());
                assert_eq!(trace.first(), Some(&Num(0).fingerprint()));
                assert_eq!(trace.last(), Some(&Num(7).fingerprint()));
                assert_eq!(trace.len() as u32, state.level);
            }
            Outcome::Complete { .. } => panic!("violation not reported"),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempdir().unwrap();
        let explorer = Explorer::new(ExploreConfig {
            page_sizing: PageSizing::Fixed(0),
            disk_dir: dir.path().to_path_buf(),
            ..ExploreConfig::default()
        });
        let err = explorer.check(vec![Num(0)], &line).unwrap_err();
        assert!(matches!(err, ExploreError::Config(_)));
    }

    #[test]
    fn test_run_dirs_are_unique() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("runs");
        let a = create_run_dir(&base, "Spec").unwrap();
        let b = create_run_dir(&base, "Spec").unwrap();
        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("Spec-"));
    }

    #[test]
    fn test_outcome_names_run_dir() {
        let dir = tempdir().unwrap();
        let outcome = explorer(dir.path(), 2).check(vec![Num(40)], &line).unwrap();
        let run_dir = outcome.run_dir();
        assert_eq!(run_dir.parent(), Some(dir.path()));
        assert!(run_dir.join("spec-0.trace").exists());
        assert_eq!(fs::read_dir(run_dir).unwrap().count(), 2);
    }
}
