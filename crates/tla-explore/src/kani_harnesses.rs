//! Kani harnesses for the page queue arithmetic
//!
//! Only compiled under `cargo kani`:
//!
//! ```bash
//! cargo kani --harness verify_exhaustion_requires_all_workers
//! cargo kani --harness verify_stepped_page_size_monotone
//! ```
//!
//! # Properties Verified
//!
//! ## P1: Exhaustion needs every worker
//! `is_exhausted(head, tail, n)` holds only if exactly `n` tickets are
//! outstanding past the last allocated page, and never once FINISH is set.
//!
//! ## P2: Page sizes never shrink
//! Page capacity is non-decreasing in the page id and always at least 1.

use crate::page_queue::{is_exhausted, stepped_page_size, FINISH};

#[kani::proof]
fn verify_exhaustion_requires_all_workers() {
    let head: u64 = kani::any();
    let tail: u64 = kani::any();
    let workers: u64 = kani::any();
    kani::assume(workers >= 1 && workers <= 64);

    if is_exhausted(head, tail, workers) {
        assert!(tail != FINISH);
        assert!(tail - head == workers);
    }
    assert!(!is_exhausted(head, FINISH, workers));
}

#[kani::proof]
fn verify_exhaustion_not_premature() {
    let head: u64 = kani::any();
    let workers: u64 = kani::any();
    let waiting: u64 = kani::any();
    kani::assume(workers >= 1 && workers <= 64);
    kani::assume(waiting < workers);
    kani::assume(head < u64::MAX - 64);

    // Fewer than all workers hold tickets past head.
    assert!(!is_exhausted(head, head + waiting, workers));
}

#[kani::proof]
fn verify_stepped_page_size_monotone() {
    let a: u64 = kani::any();
    let b: u64 = kani::any();
    kani::assume(a <= b);
    assert!(stepped_page_size(a) >= 1);
    assert!(stepped_page_size(a) <= stepped_page_size(b));
}
