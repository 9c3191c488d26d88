//! # Labels Module
//!
//! Reference dipoles derived from Wannier-centre markers stored alongside the atoms of a
//! trajectory frame. These serve as ground-truth labels for training and validating the
//! dipole regressors.

pub mod wannier;
