//! Counter grid: a small built-in model
//!
//! The state is a pair of counters `(x, y)` starting at `(0, 0)`. Each step
//! increments one counter up to its bound, so the reachable space is the
//! full `(max_x + 1) * (max_y + 1)` grid with BFS depth `max_x + max_y + 1`.
//! An optional invariant `x + y <= max_sum` turns the model into one with a
//! shortest counterexample of known length.

use crate::collab::Expander;
use crate::error::{ExploreError, ExploreResult};
use crate::state::{Fingerprint, ModelState};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridState {
    pub x: u32,
    pub y: u32,
}

impl GridState {
    pub const fn new(x: u32, y: u32) -> Self {
        GridState { x, y }
    }
}

impl ModelState for GridState {
    fn fingerprint(&self) -> Fingerprint {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        Fingerprint(hasher.finish())
    }

    fn encode<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.x.to_le_bytes())?;
        out.write_all(&self.y.to_le_bytes())
    }

    fn decode<R: Read>(input: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 4];
        input.read_exact(&mut buf)?;
        let x = u32::from_le_bytes(buf);
        input.read_exact(&mut buf)?;
        let y = u32::from_le_bytes(buf);
        Ok(GridState { x, y })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CounterGrid {
    pub max_x: u32,
    pub max_y: u32,
    /// Invariant bound on `x + y`, if checked
    pub max_sum: Option<u32>,
}

impl CounterGrid {
    pub fn new(max_x: u32, max_y: u32) -> Self {
        CounterGrid {
            max_x,
            max_y,
            max_sum: None,
        }
    }

    pub fn with_max_sum(mut self, max_sum: u32) -> Self {
        self.max_sum = Some(max_sum);
        self
    }

    pub fn initial_states(&self) -> Vec<GridState> {
        vec![GridState::new(0, 0)]
    }

    /// Number of reachable states.
    pub fn state_count(&self) -> u64 {
        (self.max_x as u64 + 1) * (self.max_y as u64 + 1)
    }
}

impl Expander<GridState> for CounterGrid {
    fn expand(&self, state: &GridState) -> ExploreResult<Vec<GridState>> {
        if let Some(max_sum) = self.max_sum {
            let sum = state.x as u64 + state.y as u64;
            if sum > max_sum as u64 {
                return Err(ExploreError::violation(format!(
                    "x + y = {} exceeds {} at ({}, {})",
                    sum, max_sum, state.x, state.y
                )));
            }
        }

        let mut next = Vec::with_capacity(2);
        if state.x < self.max_x {
            next.push(GridState::new(state.x + 1, state.y));
        }
        if state.y < self.max_y {
            next.push(GridState::new(state.x, state.y + 1));
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successors_respect_bounds() {
        let grid = CounterGrid::new(2, 1);
        assert_eq!(
            grid.expand(&GridState::new(0, 0)).unwrap(),
            vec![GridState::new(1, 0), GridState::new(0, 1)]
        );
        assert_eq!(grid.expand(&GridState::new(2, 0)).unwrap(), vec![GridState::new(2, 1)]);
        assert!(grid.expand(&GridState::new(2, 1)).unwrap().is_empty());
        assert_eq!(grid.state_count(), 6);
    }

    #[test]
    fn test_invariant_violation() {
        let grid = CounterGrid::new(5, 5).with_max_sum(3);
        assert!(grid.expand(&GridState::new(2, 1)).is_ok());
        let err = grid.expand(&GridState::new(2, 2)).unwrap_err();
        assert!(err.is_violation());
        assert!(err.to_string().contains("(2, 2)"));
    }

    #[test]
    fn test_state_codec() {
        let mut buf = Vec::new();
        GridState::new(7, 70_000).encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(GridState::decode(&mut buf.as_slice()).unwrap(), GridState::new(7, 70_000));
    }

    #[test]
    fn test_fingerprints_distinguish_axes() {
        assert_ne!(GridState::new(1, 0).fingerprint(), GridState::new(0, 1).fingerprint());
    }
}
