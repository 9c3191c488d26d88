use super::broadcast::RunManifest;
use super::config::Stages;
use crate::core::descriptor::{DescriptorSet, NeighborEnvironment, describe_frame};
use crate::core::labels::wannier::{LabelError, reference_dipole};
use crate::core::ml::models::{DIPOLE_COMPONENTS, ModelSet};
use crate::core::ml::network::RegressorError;
use crate::core::models::element::Element;
use crate::core::models::frame::{Frame, FrameData};
use crate::core::models::topology::BondClass;
use crate::core::utils::geometry::unwrap_molecules;
use nalgebra::{Point3, Vector3};
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Frame has {actual} positions, the run expects {expected}")]
    PositionCount { expected: usize, actual: usize },
    #[error("Reference labelling failed: {0}")]
    Label(#[from] LabelError),
    #[error("Frame received, but the trajectory declared no cell")]
    NoCell,
    #[error("Prediction requested but no models were loaded")]
    NoModels,
    #[error("Regressor for class '{class}' failed: {source}")]
    Regressor {
        class: BondClass,
        source: RegressorError,
    },
    #[error("Regressor for class '{class}' returned a {rows}x{columns} batch for {sites} sites")]
    OutputShape {
        class: BondClass,
        sites: usize,
        rows: usize,
        columns: usize,
    },
}

/// Per-frame values produced for the collector.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub frame_index: usize,
    /// Present when the mode persists descriptors.
    pub descriptors: Option<DescriptorSet>,
    pub reference_dipole: Option<Vector3<f64>>,
    pub predicted_dipole: Option<Vector3<f64>>,
}

/// What a rank contributes to a round's gather. Every rank produces exactly one.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutput {
    /// Sentinel for a padding frame; carries no data and is dropped by the collector.
    Padding,
    Computed(ResultRecord),
    /// The frame could not be processed on this rank. Sent instead of an error so that
    /// the gather stays in step.
    Failed { frame_index: usize, reason: String },
}

/// Runs the per-frame stages selected by the mode against the replicated manifest.
pub struct FrameProcessor<'a> {
    manifest: &'a RunManifest,
    stages: Stages,
    atom_slots: Vec<usize>,
    marker_slots: Vec<usize>,
    atom_elements: Vec<Element>,
}

impl<'a> FrameProcessor<'a> {
    pub fn new(manifest: &'a RunManifest, stages: Stages) -> Self {
        let (marker_slots, atom_slots): (Vec<usize>, Vec<usize>) =
            (0..manifest.species.len()).partition(|&slot| manifest.species[slot].is_marker());
        let atom_elements = atom_slots.iter().map(|&slot| manifest.species[slot]).collect();
        Self {
            manifest,
            stages,
            atom_slots,
            marker_slots,
            atom_elements,
        }
    }

    pub fn process(&self, frame: Frame) -> FrameOutput {
        let data = match frame {
            Frame::Padding => return FrameOutput::Padding,
            Frame::Real(data) => data,
        };
        let frame_index = data.index;
        match self.compute(data) {
            Ok(record) => FrameOutput::Computed(record),
            Err(e) => {
                warn!(frame = frame_index, "Frame processing failed: {}", e);
                FrameOutput::Failed {
                    frame_index,
                    reason: e.to_string(),
                }
            }
        }
    }

    fn compute(&self, data: FrameData) -> Result<ResultRecord, ProcessingError> {
        let manifest = self.manifest;
        if data.positions.len() != manifest.atoms_per_frame() {
            return Err(ProcessingError::PositionCount {
                expected: manifest.atoms_per_frame(),
                actual: data.positions.len(),
            });
        }
        let select = |slots: &[usize]| -> Vec<Point3<f64>> {
            slots.iter().map(|&slot| data.positions[slot]).collect()
        };
        let atoms = select(&self.atom_slots);

        // Step A
        let cell = manifest.cell.as_ref().ok_or(ProcessingError::NoCell)?;
        let molecules = unwrap_molecules(&atoms, &manifest.topology, cell);

        // Step B
        let reference = if self.stages.label {
            let markers = select(&self.marker_slots);
            Some(reference_dipole(&markers, &molecules, &manifest.topology, cell)?)
        } else {
            None
        };

        // Step C
        let environment = NeighborEnvironment::new(cell, &self.atom_elements, &atoms);
        let descriptors = describe_frame(
            &environment,
            &molecules,
            &manifest.topology,
            &manifest.config.descriptor,
        );

        // Step D
        let predicted = if self.stages.predict {
            let models = manifest.models.as_ref().ok_or(ProcessingError::NoModels)?;
            Some(predict_dipole(models, &descriptors)?)
        } else {
            None
        };

        trace!(frame = data.index, "Frame processed.");
        Ok(ResultRecord {
            frame_index: data.index,
            descriptors: self.stages.persist_descriptors.then_some(descriptors),
            reference_dipole: reference,
            predicted_dipole: predicted,
        })
    }
}

/// Sums the regressor outputs of every site of every class into one cell dipole.
///
/// Classes without sites or without a model contribute zero and never reach a model.
pub fn predict_dipole(
    models: &ModelSet,
    descriptors: &DescriptorSet,
) -> Result<Vector3<f64>, ProcessingError> {
    let mut total = Vector3::zeros();
    for (&class, batch) in descriptors {
        if batch.nrows() == 0 {
            continue;
        }
        let Some(model) = models.get(class) else {
            continue;
        };
        let output = model
            .predict(batch)
            .map_err(|source| ProcessingError::Regressor { class, source })?;
        if output.nrows() != batch.nrows() || output.ncols() != DIPOLE_COMPONENTS {
            return Err(ProcessingError::OutputShape {
                class,
                sites: batch.nrows(),
                rows: output.nrows(),
                columns: output.ncols(),
            });
        }
        let sum = output.row_sum();
        total += Vector3::new(sum[0], sum[1], sum[2]);
    }
    Ok(total)
}
