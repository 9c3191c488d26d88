//! # CPML Core Library
//!
//! A library for machine-learned dipole analysis of molecular-dynamics trajectories. It
//! streams a trajectory, computes bond and lone-pair descriptors, optionally derives
//! reference dipoles from Wannier-centre markers, and optionally predicts the cell dipole
//! with per-bond-class regressors, all across a fixed-size group of cooperating ranks.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Topology`, `UnitCell`, `Frame`),
//!   file formats (extended XYZ, GROMACS `.itp`, NumPy `.npy`, descriptor CSV) and the
//!   numerics of geometry, descriptors, labels and regression networks.
//!
//! - **[`engine`]: The Distributed Runtime.** The process group and its collectives, the
//!   deterministic work partition, the startup handshake, per-frame processing and the
//!   root-side result collection.
//!
//! - **[`workflows`]: The Public API.** The pipeline orchestrator that sequences the engine
//!   into a complete run, executed identically by every rank of the group.

pub mod core;
pub mod engine;
pub mod workflows;
