//! File formats read and written by the pipeline.
//!
//! Trajectories are streamed from extended XYZ files by a single owner, topologies come
//! from GROMACS `.itp` files, and results are persisted as per-frame descriptor CSV files
//! and NumPy `.npy` dipole arrays.

pub mod descriptors;
pub mod itp;
pub mod npy;
pub mod xyz;
