use super::comm::CommError;
use super::config::ConfigError;
use crate::core::io::descriptors::DescriptorWriteError;
use crate::core::io::npy::NpyError;
use crate::core::io::xyz::TrajectoryError;
use crate::core::ml::models::ModelLoadError;
use crate::core::models::topology::TopologyError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Round {round}: read {actual} frames from the trajectory, expected {expected}")]
    RoundReadCount {
        round: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Round {round}: gathered {actual} outputs from a group of {expected}")]
    GatherSize {
        round: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Round {round}, rank {rank}: expected frame {expected}, found frame {found}")]
    FrameOrder {
        round: usize,
        rank: usize,
        expected: usize,
        found: usize,
    },
    #[error("Round {round}, rank {rank}: expected frame {expected}, found a padding output")]
    UnexpectedPadding {
        round: usize,
        rank: usize,
        expected: usize,
    },
    #[error("Round {round}, rank {rank}: expected a padding output, found frame {found}")]
    UnexpectedResult {
        round: usize,
        rank: usize,
        found: usize,
    },
    #[error("Frame {frame} is missing its {what}")]
    MissingValue { frame: usize, what: &'static str },
    #[error("Collected {actual} frames, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Cannot create output directory '{path}': {source}")]
    Directory {
        path: String,
        source: std::io::Error,
    },
    #[error("Cannot move '{from}' into the output directory: {source}")]
    Promote {
        from: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Descriptors(#[from] DescriptorWriteError),
    #[error(transparent)]
    Array(#[from] NpyError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Trajectory error: {0}")]
    Trajectory(#[from] TrajectoryError),

    #[error("Model loading failed: {0}")]
    ModelLoad(#[from] ModelLoadError),

    #[error("Integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Communication failure: {0}")]
    Communication(#[from] CommError),

    #[error("Failed to persist results: {0}")]
    Persist(#[from] PersistError),

    #[error("Frame {frame} failed on rank {rank}: {reason}")]
    FrameFailed {
        frame: usize,
        rank: usize,
        reason: String,
    },

    #[error("Run aborted by rank 0: {reason}")]
    Aborted { reason: String },
}
