//! # Engine Module
//!
//! The distributed runtime of CPML: a fixed-size group of ranks that cooperate through
//! collective operations to process a trajectory that only rank 0 reads.
//!
//! ## Architecture
//!
//! - **Communication** ([`comm`]) - The [`comm::Communicator`] trait and its channel-backed process group
//! - **Configuration** ([`config`]) - The immutable run configuration and the derived [`config::Mode`]
//! - **Replication** ([`broadcast`]) - The startup handshake and the run manifest shared by all ranks
//! - **Partitioning** ([`distributor`]) - Deterministic assignment of frames to rounds and ranks
//! - **Processing** ([`processor`]) - The per-frame transform executed on every rank
//! - **Collection** ([`collector`]) - Root-side ordering, padding removal, integrity checks and persistence
//! - **Context** ([`context`]) - Per-rank state threaded explicitly through a run
//! - **Progress Monitoring** ([`progress`]) - Progress callbacks for front ends
//! - **Error Handling** ([`error`]) - The engine error taxonomy
//!
//! ## Key Invariants
//!
//! - Every rank executes the same sequence of collectives; any decision that could make
//!   ranks diverge is taken on rank 0 and broadcast.
//! - Frame `round * worker_count + rank` is always processed by `rank` in `round`.
//! - Shared state is replicated by value; no rank can observe another rank's mutations.

pub mod broadcast;
pub mod collector;
pub mod comm;
pub mod config;
pub mod context;
pub mod distributor;
pub mod error;
pub mod processor;
pub mod progress;
