use super::config::Stages;
use super::distributor::{Round, WorkAssignment};
use super::error::{EngineError, IntegrityError, PersistError};
use super::processor::{FrameOutput, ResultRecord};
use crate::core::io::descriptors::write_frame_descriptors;
use crate::core::io::npy;
use nalgebra::Vector3;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const REFERENCE_DIPOLE_FILE: &str = "wannier_dipole.npy";
pub const PREDICTED_DIPOLE_FILE: &str = "result_dipole.npy";

/// Descriptor files wait here, inside the save directory, until the run is complete.
pub const STAGING_DIR: &str = ".descriptors.partial";

/// Everything root retained from a run, in global frame order.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedRun {
    pub frame_indices: Vec<usize>,
    pub reference_dipoles: Option<Vec<[f64; 3]>>,
    pub predicted_dipoles: Option<Vec<[f64; 3]>>,
    pub written: Vec<PathBuf>,
}

/// Root-side sink for gathered round outputs.
///
/// Each round is validated in full before its descriptor files are staged. Nothing reaches
/// the save directory until [`ResultCollector::finish`] passes the final length and order
/// checks; a collector dropped before that removes everything it staged.
pub struct ResultCollector {
    assignment: WorkAssignment,
    stages: Stages,
    save_dir: PathBuf,
    frame_indices: Vec<usize>,
    reference: Vec<[f64; 3]>,
    predicted: Vec<[f64; 3]>,
    staged: Vec<PathBuf>,
}

impl ResultCollector {
    pub fn new(assignment: WorkAssignment, stages: Stages, save_dir: &Path) -> Self {
        Self {
            assignment,
            stages,
            save_dir: save_dir.to_path_buf(),
            frame_indices: Vec::with_capacity(assignment.total_frames()),
            reference: Vec::new(),
            predicted: Vec::new(),
            staged: Vec::new(),
        }
    }

    fn staging_dir(&self) -> PathBuf {
        self.save_dir.join(STAGING_DIR)
    }

    pub fn collected(&self) -> usize {
        self.frame_indices.len()
    }

    /// Accepts the rank-ordered outputs of one round, drops padding and stores the rest.
    pub fn accept_round(&mut self, round: &Round, outputs: Vec<FrameOutput>) -> Result<(), EngineError> {
        let records = self.validate_round(round, outputs)?;
        let staging = self.staging_dir();
        if records.iter().any(|record| record.descriptors.is_some()) {
            fs::create_dir_all(&staging).map_err(|e| PersistError::Directory {
                path: staging.to_string_lossy().to_string(),
                source: e,
            })?;
        }
        for record in records {
            if let Some(descriptors) = &record.descriptors {
                let files = write_frame_descriptors(&staging, record.frame_index, descriptors)
                    .map_err(PersistError::from)?;
                self.staged.extend(files);
            }
            if let Some(dipole) = record.reference_dipole {
                self.reference.push(to_row(&dipole));
            }
            if let Some(dipole) = record.predicted_dipole {
                self.predicted.push(to_row(&dipole));
            }
            self.frame_indices.push(record.frame_index);
        }
        debug!(round = round.index, collected = self.collected(), "Round collected.");
        Ok(())
    }

    fn validate_round(&self, round: &Round, outputs: Vec<FrameOutput>) -> Result<Vec<ResultRecord>, EngineError> {
        let worker_count = self.assignment.worker_count();
        if outputs.len() != worker_count {
            return Err(IntegrityError::GatherSize {
                round: round.index,
                expected: worker_count,
                actual: outputs.len(),
            }
            .into());
        }

        let mut records = Vec::with_capacity(round.real_frames);
        for (rank, output) in outputs.into_iter().enumerate() {
            let expected = (rank < round.real_frames).then(|| self.assignment.frame_index(round.index, rank));
            match (expected, output) {
                (None, FrameOutput::Padding) => {}
                (None, FrameOutput::Computed(ResultRecord { frame_index, .. }))
                | (None, FrameOutput::Failed { frame_index, .. }) => {
                    return Err(IntegrityError::UnexpectedResult {
                        round: round.index,
                        rank,
                        found: frame_index,
                    }
                    .into());
                }
                (Some(expected), FrameOutput::Padding) => {
                    return Err(IntegrityError::UnexpectedPadding {
                        round: round.index,
                        rank,
                        expected,
                    }
                    .into());
                }
                (Some(expected), FrameOutput::Failed { frame_index, reason }) => {
                    if frame_index != expected {
                        return Err(frame_order(round, rank, expected, frame_index));
                    }
                    return Err(EngineError::FrameFailed {
                        frame: frame_index,
                        rank,
                        reason,
                    });
                }
                (Some(expected), FrameOutput::Computed(record)) => {
                    if record.frame_index != expected {
                        return Err(frame_order(round, rank, expected, record.frame_index));
                    }
                    self.check_values(&record)?;
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    fn check_values(&self, record: &ResultRecord) -> Result<(), IntegrityError> {
        let missing = |what| IntegrityError::MissingValue {
            frame: record.frame_index,
            what,
        };
        if self.stages.persist_descriptors && record.descriptors.is_none() {
            return Err(missing("descriptors"));
        }
        if self.stages.label && record.reference_dipole.is_none() {
            return Err(missing("reference dipole"));
        }
        if self.stages.predict && record.predicted_dipole.is_none() {
            return Err(missing("predicted dipole"));
        }
        Ok(())
    }

    /// Checks that exactly frames `0..total_frames` were collected, in order, then writes
    /// the dipole arrays of the mode and moves the staged descriptor files into place.
    pub fn finish(mut self) -> Result<CollectedRun, EngineError> {
        let total = self.assignment.total_frames();
        if self.frame_indices.len() != total {
            return Err(IntegrityError::LengthMismatch {
                expected: total,
                actual: self.frame_indices.len(),
            }
            .into());
        }
        if let Some((position, &found)) = self
            .frame_indices
            .iter()
            .enumerate()
            .find(|(position, index)| *position != **index)
        {
            let workers = self.assignment.worker_count();
            return Err(IntegrityError::FrameOrder {
                round: position / workers,
                rank: position % workers,
                expected: position,
                found,
            }
            .into());
        }

        let mut written = Vec::with_capacity(self.staged.len() + 2);
        let reference = if self.stages.label {
            written.push(write_dipoles(&self.save_dir, REFERENCE_DIPOLE_FILE, &self.reference)?);
            Some(std::mem::take(&mut self.reference))
        } else {
            None
        };
        let predicted = if self.stages.predict {
            written.push(write_dipoles(&self.save_dir, PREDICTED_DIPOLE_FILE, &self.predicted)?);
            Some(std::mem::take(&mut self.predicted))
        } else {
            None
        };
        for staged in std::mem::take(&mut self.staged) {
            written.push(promote(&staged, &self.save_dir)?);
        }
        info!(frames = total, files = written.len(), "Results persisted.");

        Ok(CollectedRun {
            frame_indices: std::mem::take(&mut self.frame_indices),
            reference_dipoles: reference,
            predicted_dipoles: predicted,
            written,
        })
    }
}

impl Drop for ResultCollector {
    fn drop(&mut self) {
        let staging = self.staging_dir();
        if !staging.exists() {
            return;
        }
        if !self.staged.is_empty() {
            warn!(files = self.staged.len(), "Discarding staged descriptor files.");
        }
        if let Err(e) = fs::remove_dir_all(&staging) {
            warn!(path = %staging.display(), "Failed to remove staging directory: {}", e);
        }
    }
}

fn promote(staged: &Path, save_dir: &Path) -> Result<PathBuf, PersistError> {
    let target = match staged.file_name() {
        Some(name) => save_dir.join(name),
        None => staged.to_path_buf(),
    };
    fs::rename(staged, &target).map_err(|e| PersistError::Promote {
        from: staged.to_string_lossy().to_string(),
        source: e,
    })?;
    Ok(target)
}

fn frame_order(round: &Round, rank: usize, expected: usize, found: usize) -> EngineError {
    IntegrityError::FrameOrder {
        round: round.index,
        rank,
        expected,
        found,
    }
    .into()
}

fn to_row(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

fn write_dipoles(dir: &Path, name: &str, rows: &[[f64; 3]]) -> Result<PathBuf, PersistError> {
    let path = dir.join(name);
    npy::write_matrix(&path, rows, 3)?;
    Ok(path)
}
