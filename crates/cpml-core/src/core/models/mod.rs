//! # Core Models Module
//!
//! Data structures shared by every stage of the pipeline.
//!
//! ## Key Components
//!
//! - [`element`] - Chemical species appearing in a trajectory, including the Wannier-centre marker
//! - [`cell`] - Periodic simulation cell with the minimum-image convention
//! - [`frame`] - A single trajectory snapshot, or the padding placeholder used in partial rounds
//! - [`topology`] - Per-molecule atom ordering, bonds and bond-class partitions

pub mod cell;
pub mod element;
pub mod frame;
pub mod topology;
