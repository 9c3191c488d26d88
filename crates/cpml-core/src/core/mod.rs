//! # Core Module
//!
//! Fundamental data structures, file formats and numerical kernels of CPML.
//!
//! ## Architecture
//!
//! - **Data Models** ([`models`]) - Elements, unit cells, frames and molecular topology
//! - **File I/O** ([`io`]) - Trajectory streaming, topology parsing and result persistence
//! - **Descriptors** ([`descriptor`]) - Local-environment feature vectors for bond and lone-pair sites
//! - **Labels** ([`labels`]) - Reference dipoles from Wannier-centre markers
//! - **Regression** ([`ml`]) - Per-bond-class dipole regressors
//! - **Utilities** ([`utils`]) - Periodic geometry and physical constants
//!
//! Everything in this module is free of communication concerns; the same functions run
//! unchanged on every rank.

pub mod descriptor;
pub mod io;
pub mod labels;
pub mod ml;
pub mod models;
pub mod utils;
