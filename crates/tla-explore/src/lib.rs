//! Parallel breadth-first state exploration
//!
//! This crate is the exploration core of a TLC-style explicit-state model
//! checker. Worker threads jointly enumerate the reachable states of a
//! transition system, deduplicate them and stop once no unexplored state
//! remains anywhere.
//!
//! # Components
//!
//! - [`page_queue::PageQueue`]: the shared frontier. Pages of states are
//!   addressed by id; workers take dequeue tickets with a CAS and wait for
//!   exactly the page their ticket names. Pages beyond a memory budget are
//!   spilled to disk.
//! - [`worker::Worker`]: one exploration thread with a private backlog, a
//!   held page for overflow successors and an append-only trace log.
//! - [`explorer::Explorer`]: seeds the queue, runs the workers and turns an
//!   error into a counterexample fingerprint path.
//!
//! The successor relation and the fingerprint store are supplied by the
//! caller through [`collab::Expander`] and [`collab::NoveltyCheck`].
//!
//! # Example
//!
//! ```no_run
//! use tla_explore::grid::CounterGrid;
//! use tla_explore::{ExploreConfig, Explorer};
//!
//! let model = CounterGrid::new(100, 100);
//! let outcome = Explorer::new(ExploreConfig::default())
//!     .check(model.initial_states(), &model)
//!     .unwrap();
//! assert_eq!(outcome.stats().distinct_states, model.state_count());
//! ```

pub mod collab;
pub mod config;
pub mod error;
pub mod explorer;
pub mod grid;
pub mod page;
pub mod page_queue;
pub mod state;
pub mod stats;
pub mod store;
pub mod trace_file;
pub mod worker;

#[cfg(kani)]
mod kani_harnesses;

pub use collab::{ErrorSink, Expander, FingerprintSet, FirstError, NoveltyCheck};
pub use config::{ConfigError, ExploreConfig};
pub use error::{ExploreError, ExploreResult};
pub use explorer::{Explorer, Outcome};
pub use page::{Page, PageId};
pub use page_queue::{PageHolder, PageQueue, PageSizing};
pub use state::{Fingerprint, ModelState, StateNode, Uid};
pub use stats::{BucketStatistics, RunStats};
pub use worker::Worker;
