//! Collective communication for a fixed-size group of ranks.
//!
//! Every method of [`Communicator`] is collective: all ranks of the group must call it,
//! in the same order, for any of them to return. Payloads are moved (or cloned) between
//! ranks; nothing is shared by reference.

mod local;

pub use local::{LocalCommunicator, ProcessGroup};

use thiserror::Error;

/// Rank that owns the trajectory reader and collects results.
pub const ROOT: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collective {
    Broadcast,
    Scatter,
    Gather,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommError {
    #[error("Process group size must be at least 1")]
    EmptyGroup,
    #[error("Rank {rank} expected a {expected:?} from rank {peer} but received a {received:?}")]
    OutOfStep {
        rank: usize,
        peer: usize,
        expected: Collective,
        received: Collective,
    },
    #[error("Rank {rank} received a {collective:?} payload of an unexpected type from rank {peer}")]
    PayloadType {
        rank: usize,
        peer: usize,
        collective: Collective,
    },
    #[error("Rank {rank} lost its connection to rank {peer}")]
    Disconnected { rank: usize, peer: usize },
    #[error("Root must supply the {0:?} payload")]
    MissingRootPayload(Collective),
    #[error("Scatter needs one payload per rank: group has {expected}, got {actual}")]
    ScatterLength { expected: usize, actual: usize },
    #[error("Failed to start rank {rank}: {reason}")]
    Spawn { rank: usize, reason: String },
    #[error("Rank {rank} panicked")]
    RankPanicked { rank: usize },
}

pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// One-to-all. Root passes `Some(value)`; every rank returns its own copy.
    fn broadcast<T>(&self, value: Option<T>) -> Result<T, CommError>
    where
        T: Clone + Send + 'static;

    /// One-to-each. Root passes exactly `size()` payloads; rank `r` receives payload `r`.
    fn scatter<T>(&self, values: Option<Vec<T>>) -> Result<T, CommError>
    where
        T: Send + 'static;

    /// Each-to-one. Root returns all payloads ordered by rank; other ranks return `None`.
    fn gather<T>(&self, value: T) -> Result<Option<Vec<T>>, CommError>
    where
        T: Send + 'static;

    fn barrier(&self) -> Result<(), CommError> {
        self.gather(())?;
        self.broadcast(Some(()))
    }
}
