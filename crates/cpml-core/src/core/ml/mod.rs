//! # Regression Module
//!
//! Pre-trained dipole regressors, one per bond class.
//!
//! - [`network`] - The [`network::Regressor`] seam and a dense feed-forward implementation
//! - [`models`] - Loading and validating the per-class model set from a directory

pub mod models;
pub mod network;
