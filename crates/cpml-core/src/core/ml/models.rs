use super::network::{DenseNetwork, NetworkJsonError, Regressor};
use crate::core::models::topology::{BondClass, Topology};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Every regressor maps one site to a 3-component dipole.
pub const DIPOLE_COMPONENTS: usize = 3;

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("Model directory '{0}' does not exist")]
    MissingDirectory(String),
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("No model for class '{class}': '{path}' does not exist")]
    MissingModel { class: BondClass, path: String },
    #[error("Invalid model file '{path}': {source}")]
    Format {
        path: String,
        source: NetworkJsonError,
    },
    #[error("Model for class '{class}' takes {actual} inputs, descriptors have {expected} features")]
    InputWidth {
        class: BondClass,
        expected: usize,
        actual: usize,
    },
    #[error("Model for class '{class}' produces {actual} outputs, expected {expected}")]
    OutputWidth {
        class: BondClass,
        expected: usize,
        actual: usize,
    },
}

pub fn model_file_name(class: BondClass) -> String {
    format!("model_{}.json", class.label())
}

/// Per-class regressors. Classes without sites in the topology have no model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSet {
    models: BTreeMap<BondClass, DenseNetwork>,
}

impl ModelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `model_<class>.json` for every class the topology yields sites for.
    pub fn load(
        directory: &Path,
        topology: &Topology,
        descriptor_width: usize,
    ) -> Result<Self, ModelLoadError> {
        if !directory.is_dir() {
            return Err(ModelLoadError::MissingDirectory(
                directory.to_string_lossy().to_string(),
            ));
        }
        let mut set = Self::new();
        for class in BondClass::ALL {
            if !topology.has_sites(class) {
                debug!(class = class.label(), "No sites in topology; skipping model.");
                continue;
            }
            let path = directory.join(model_file_name(class));
            if !path.is_file() {
                return Err(ModelLoadError::MissingModel {
                    class,
                    path: path.to_string_lossy().to_string(),
                });
            }
            let network = load_network(&path)?;
            set.insert(class, network, descriptor_width)?;
        }
        info!(classes = set.len(), "Loaded regression models.");
        Ok(set)
    }

    pub fn insert(
        &mut self,
        class: BondClass,
        network: DenseNetwork,
        descriptor_width: usize,
    ) -> Result<(), ModelLoadError> {
        if network.input_width() != descriptor_width {
            return Err(ModelLoadError::InputWidth {
                class,
                expected: descriptor_width,
                actual: network.input_width(),
            });
        }
        if network.output_width() != DIPOLE_COMPONENTS {
            return Err(ModelLoadError::OutputWidth {
                class,
                expected: DIPOLE_COMPONENTS,
                actual: network.output_width(),
            });
        }
        self.models.insert(class, network);
        Ok(())
    }

    pub fn get(&self, class: BondClass) -> Option<&dyn Regressor> {
        self.models.get(&class).map(|model| model as &dyn Regressor)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn load_network(path: &Path) -> Result<DenseNetwork, ModelLoadError> {
    let text = std::fs::read_to_string(path).map_err(|e| ModelLoadError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    DenseNetwork::from_json(&text).map_err(|e| ModelLoadError::Format {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}
