//! States as seen by the exploration engine
//!
//! The engine never looks inside a model's state. It needs three things
//! from it, captured by [`ModelState`]:
//! - a 64-bit fingerprint for deduplication and trace records
//! - a binary encoding so that pages can be spilled to disk
//! - cheap cloning, so a state can be both expanded and reported
//!
//! Every state in flight is wrapped in a [`StateNode`] that adds the BFS
//! `level` and the [`Uid`] of the trace record that introduced it.

use std::fmt;
use std::io::{self, Read, Write};

/// A 64-bit state fingerprint for fast state comparison
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64);

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FP({:016x})", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Stable reference to one record in one worker's trace log.
///
/// Together the per-worker trace files form a forest; a `Uid` names a node
/// of that forest by the worker that wrote it and its byte offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid {
    pub worker: u16,
    pub offset: u64,
}

impl Uid {
    /// Encoded size: u16 worker + u64 offset
    pub const ENCODED_LEN: usize = 10;

    pub const fn new(worker: u16, offset: u64) -> Self {
        Uid { worker, offset }
    }

    pub fn encode<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.worker.to_le_bytes())?;
        out.write_all(&self.offset.to_le_bytes())
    }

    pub fn decode<R: Read>(input: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; Self::ENCODED_LEN];
        input.read_exact(&mut buf)?;
        let mut worker = [0u8; 2];
        let mut offset = [0u8; 8];
        worker.copy_from_slice(&buf[0..2]);
        offset.copy_from_slice(&buf[2..10]);
        Ok(Uid {
            worker: u16::from_le_bytes(worker),
            offset: u64::from_le_bytes(offset),
        })
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.worker, self.offset)
    }
}

/// A model state the engine can explore.
///
/// Implementations must be immutable once handed to the engine: the same
/// state may be held by a page, a worker backlog and the error sink at once.
pub trait ModelState: Clone + Send + Sync + 'static {
    /// Fingerprint used for deduplication and recorded in the trace log.
    fn fingerprint(&self) -> Fingerprint;

    /// Write the binary encoding of this state.
    fn encode<W: Write>(&self, out: &mut W) -> io::Result<()>;

    /// Read a state previously written by [`ModelState::encode`].
    fn decode<R: Read>(input: &mut R) -> io::Result<Self>;
}

/// A state together with its position in the explored graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateNode<S> {
    pub state: S,
    /// BFS depth; initial states are level 1
    pub level: u32,
    /// Trace record that introduced this state
    pub uid: Uid,
}

impl<S: ModelState> StateNode<S> {
    pub fn new(state: S, level: u32, uid: Uid) -> Self {
        StateNode { state, level, uid }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.state.fingerprint()
    }

    /// Layout: level (u32), uid, then the model's own encoding.
    pub fn encode<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.level.to_le_bytes())?;
        self.uid.encode(out)?;
        self.state.encode(out)
    }

    pub fn decode<R: Read>(input: &mut R) -> io::Result<Self> {
        let mut level = [0u8; 4];
        input.read_exact(&mut level)?;
        let uid = Uid::decode(input)?;
        let state = S::decode(input)?;
        Ok(StateNode {
            state,
            level: u32::from_le_bytes(level),
            uid,
        })
    }
}
