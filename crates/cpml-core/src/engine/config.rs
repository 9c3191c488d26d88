use crate::core::descriptor::DescriptorParams;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Nothing to do: neither descriptor calculation nor prediction is enabled")]
    NoStageEnabled,
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("A process group needs at least one worker")]
    EmptyGroup,
    #[error("{0}")]
    Directive(String),
}

/// What a run computes. Derived once from the replicated configuration, so every rank
/// selects the same mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    DescriptorOnly,
    Label,
    Predict,
    LabelAndPredict,
}

/// Stage switches for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stages {
    pub label: bool,
    pub predict: bool,
    pub persist_descriptors: bool,
}

impl Mode {
    pub fn from_flags(
        calc_descriptor: bool,
        calc_predict: bool,
        has_reference_labels: bool,
    ) -> Result<Self, ConfigError> {
        match (calc_descriptor, calc_predict, has_reference_labels) {
            (false, false, _) => Err(ConfigError::NoStageEnabled),
            (true, false, false) => Ok(Mode::DescriptorOnly),
            (true, false, true) => Ok(Mode::Label),
            (_, true, false) => Ok(Mode::Predict),
            (_, true, true) => Ok(Mode::LabelAndPredict),
        }
    }

    pub const fn stages(self) -> Stages {
        match self {
            Mode::DescriptorOnly => Stages {
                label: false,
                predict: false,
                persist_descriptors: true,
            },
            Mode::Label => Stages {
                label: true,
                predict: false,
                persist_descriptors: true,
            },
            Mode::Predict => Stages {
                label: false,
                predict: true,
                persist_descriptors: false,
            },
            Mode::LabelAndPredict => Stages {
                label: true,
                predict: true,
                persist_descriptors: false,
            },
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::DescriptorOnly => "descriptor-only",
            Mode::Label => "label",
            Mode::Predict => "predict",
            Mode::LabelAndPredict => "label-and-predict",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub topology_path: PathBuf,
    pub trajectory_path: PathBuf,
    pub save_dir: PathBuf,
    pub has_reference_labels: bool,
    /// Caps the number of frames processed.
    pub frame_limit: Option<usize>,
    pub calc_descriptor: bool,
    pub calc_predict: bool,
    pub model_dir: Option<PathBuf>,
    pub descriptor: DescriptorParams,
}

impl RunConfig {
    pub fn mode(&self) -> Result<Mode, ConfigError> {
        Mode::from_flags(
            self.calc_descriptor,
            self.calc_predict,
            self.has_reference_labels,
        )
    }
}

#[derive(Default)]
pub struct RunConfigBuilder {
    topology_path: Option<PathBuf>,
    trajectory_path: Option<PathBuf>,
    save_dir: Option<PathBuf>,
    has_reference_labels: bool,
    frame_limit: Option<usize>,
    calc_descriptor: bool,
    calc_predict: bool,
    model_dir: Option<PathBuf>,
    descriptor: Option<DescriptorParams>,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topology_path(mut self, path: PathBuf) -> Self {
        self.topology_path = Some(path);
        self
    }
    pub fn trajectory_path(mut self, path: PathBuf) -> Self {
        self.trajectory_path = Some(path);
        self
    }
    pub fn save_dir(mut self, path: PathBuf) -> Self {
        self.save_dir = Some(path);
        self
    }
    pub fn has_reference_labels(mut self, value: bool) -> Self {
        self.has_reference_labels = value;
        self
    }
    pub fn frame_limit(mut self, limit: Option<usize>) -> Self {
        self.frame_limit = limit;
        self
    }
    pub fn calc_descriptor(mut self, value: bool) -> Self {
        self.calc_descriptor = value;
        self
    }
    pub fn calc_predict(mut self, value: bool) -> Self {
        self.calc_predict = value;
        self
    }
    pub fn model_dir(mut self, path: Option<PathBuf>) -> Self {
        self.model_dir = path;
        self
    }
    pub fn descriptor_params(mut self, params: DescriptorParams) -> Self {
        self.descriptor = Some(params);
        self
    }

    pub fn build(self) -> Result<RunConfig, ConfigError> {
        let descriptor = self.descriptor.unwrap_or_default();
        validate_descriptor_params(&descriptor)?;

        let config = RunConfig {
            topology_path: self
                .topology_path
                .ok_or(ConfigError::MissingParameter("topology_path"))?,
            trajectory_path: self
                .trajectory_path
                .ok_or(ConfigError::MissingParameter("trajectory_path"))?,
            save_dir: self
                .save_dir
                .ok_or(ConfigError::MissingParameter("save_dir"))?,
            has_reference_labels: self.has_reference_labels,
            frame_limit: self.frame_limit,
            calc_descriptor: self.calc_descriptor,
            calc_predict: self.calc_predict,
            model_dir: self.model_dir,
            descriptor,
        };
        config.mode()?;
        if config.calc_predict && config.model_dir.is_none() {
            return Err(ConfigError::MissingParameter("model_dir"));
        }
        Ok(config)
    }
}

fn validate_descriptor_params(params: &DescriptorParams) -> Result<(), ConfigError> {
    if params.inner_cutoff.is_nan() || params.inner_cutoff <= 0.0 {
        return Err(ConfigError::InvalidParameter {
            name: "inner_cutoff",
            reason: format!("must be positive, got {}", params.inner_cutoff),
        });
    }
    if params.outer_cutoff.is_nan() || params.outer_cutoff <= params.inner_cutoff {
        return Err(ConfigError::InvalidParameter {
            name: "outer_cutoff",
            reason: format!(
                "must exceed the inner cutoff {}, got {}",
                params.inner_cutoff, params.outer_cutoff
            ),
        });
    }
    if params.max_neighbors == 0 {
        return Err(ConfigError::InvalidParameter {
            name: "max_neighbors",
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}
