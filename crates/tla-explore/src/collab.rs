//! Collaborators of the exploration engine
//!
//! The engine does not evaluate models or store fingerprints itself. It
//! talks to three collaborators:
//! - [`Expander`]: computes the successors of a state
//! - [`NoveltyCheck`]: decides whether a state was seen before
//! - [`ErrorSink`]: receives the first fatal error of the run
//!
//! [`FingerprintSet`] and [`FirstError`] are the in-memory implementations
//! used by [`Explorer`](crate::explorer::Explorer) when nothing else is
//! supplied.

use crate::error::{ExploreError, ExploreResult};
use crate::state::{Fingerprint, StateNode};
use dashmap::DashSet;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;
use std::sync::OnceLock;

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Successor generator.
///
/// Must not mutate `state`. Returning [`ExploreError::Violation`] reports a
/// property violation found in `state`; any other error is an evaluation
/// failure. Both stop the run.
pub trait Expander<S>: Sync {
    fn expand(&self, state: &S) -> ExploreResult<Vec<S>>;
}

impl<S, F> Expander<S> for F
where
    F: Fn(&S) -> ExploreResult<Vec<S>> + Sync,
{
    fn expand(&self, state: &S) -> ExploreResult<Vec<S>> {
        self(state)
    }
}

/// Deduplication store.
pub trait NoveltyCheck: Sync {
    /// Record `fp` and report whether it was unseen. Must be atomic: of two
    /// concurrent calls with the same fingerprint exactly one returns true.
    fn is_new(&self, fp: Fingerprint) -> bool;

    /// Number of distinct fingerprints recorded.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The first fatal error of a run and the state being expanded when it
/// happened, if any.
#[derive(Debug)]
pub struct ErrorReport<S> {
    pub state: Option<StateNode<S>>,
    pub cause: ExploreError,
}

/// Receiver of fatal errors.
pub trait ErrorSink<S>: Sync {
    /// Publish an error. Returns true iff this call was the first to report.
    fn set_error_state(&self, state: Option<&StateNode<S>>, cause: ExploreError) -> bool;

    /// Whether an error has been reported.
    fn has_error(&self) -> bool;
}

/// Concurrent in-memory fingerprint set.
pub struct FingerprintSet {
    seen: DashSet<Fingerprint, FxBuildHasher>,
}

impl FingerprintSet {
    pub fn new() -> Self {
        FingerprintSet {
            seen: DashSet::with_hasher(FxBuildHasher::default()),
        }
    }

    pub fn contains(&self, fp: Fingerprint) -> bool {
        self.seen.contains(&fp)
    }
}

impl Default for FingerprintSet {
    fn default() -> Self {
        Self::new()
    }
}

impl NoveltyCheck for FingerprintSet {
    fn is_new(&self, fp: Fingerprint) -> bool {
        self.seen.insert(fp)
    }

    fn len(&self) -> u64 {
        self.seen.len() as u64
    }
}

/// Keeps the first reported error; later reports are dropped.
pub struct FirstError<S> {
    slot: OnceLock<ErrorReport<S>>,
}

impl<S> FirstError<S> {
    pub fn new() -> Self {
        FirstError {
            slot: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Option<&ErrorReport<S>> {
        self.slot.get()
    }

    pub fn into_inner(self) -> Option<ErrorReport<S>> {
        self.slot.into_inner()
    }
}

impl<S> Default for FirstError<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Clone + Send + Sync> ErrorSink<S> for FirstError<S> {
    fn set_error_state(&self, state: Option<&StateNode<S>>, cause: ExploreError) -> bool {
        self.slot
            .set(ErrorReport {
                state: state.cloned(),
                cause,
            })
            .is_ok()
    }

    fn has_error(&self) -> bool {
        self.slot.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::{node, Num};

    #[test]
    fn test_fingerprint_set_is_new_once() {
        let set = FingerprintSet::new();
        assert!(set.is_empty());
        assert!(set.is_new(Fingerprint(1)));
        assert!(!set.is_new(Fingerprint(1)));
        assert!(set.is_new(Fingerprint(2)));
        assert_eq!(set.len(), 2);
        assert!(set.contains(Fingerprint(2)));
    }

    #[test]
    fn test_fingerprint_set_concurrent_inserts() {
        let set = FingerprintSet::new();
        let winners: u64 = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| (0..1000).filter(|&i| set.is_new(Fingerprint(i))).count() as u64))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1000);
        assert_eq!(set.len(), 1000);
    }

    #[test]
    fn test_first_error_wins() {
        let sink: FirstError<Num> = FirstError::new();
        assert!(!sink.has_error());
        assert!(sink.set_error_state(Some(&node(4)), ExploreError::violation("first")));
        assert!(!sink.set_error_state(None, ExploreError::expansion("second")));

        let report = sink.into_inner().unwrap();
        assert_eq!(report.state, Some(node(4)));
        assert!(report.cause.is_violation());
    }

    #[test]
    fn test_closure_expander() {
        let expander = |n: &Num| -> ExploreResult<Vec<Num>> { Ok(vec![Num(n.0 + 1)]) };
        assert_eq!(expander.expand(&Num(1)).unwrap(), vec![Num(2)]);
    }
}
