//! # Workflows Module
//!
//! High-level entry points that sequence the engine into complete runs.
//!
//! ## Overview
//!
//! A workflow is executed by every rank of a process group. Rank 0 owns all file access
//! (configuration, topology, models, the trajectory stream and every output); the other
//! ranks receive their share of the work through collectives and return once rank 0
//! announces the end of the run.
//!
//! ## Architecture
//!
//! - **Dipole Pipeline** ([`pipeline`]) - Descriptor extraction, optional reference
//!   labelling from Wannier-centre markers and optional dipole prediction over a whole
//!   trajectory.

pub mod pipeline;
