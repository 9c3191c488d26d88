use crate::error::{CliError, Result};
use cpml::core::descriptor::DescriptorParams;
use cpml::engine::config::{RunConfig, RunConfigBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Output directory used when the directive file names none, relative to the file.
const DEFAULT_SAVE_DIR: &str = "results";

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialGeneralConfig {
    topology: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialDescriptorConfig {
    calc: Option<bool>,
    trajectory: Option<PathBuf>,
    #[serde(rename = "has-reference-labels")]
    has_reference_labels: Option<bool>,
    #[serde(rename = "save-dir")]
    save_dir: Option<PathBuf>,
    step: Option<usize>,
    #[serde(rename = "inner-cutoff")]
    inner_cutoff: Option<f64>,
    #[serde(rename = "outer-cutoff")]
    outer_cutoff: Option<f64>,
    #[serde(rename = "max-neighbors")]
    max_neighbors: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialPredictConfig {
    calc: Option<bool>,
    #[serde(rename = "model-dir")]
    model_dir: Option<PathBuf>,
}

/// The directive file as written, before defaults and overrides are applied.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    general: Option<PartialGeneralConfig>,
    descriptor: Option<PartialDescriptorConfig>,
    predict: Option<PartialPredictConfig>,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading directive file: {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|source| CliError::DirectiveRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| CliError::DirectiveSyntax {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `--set` overrides and defaults and builds the run configuration.
    /// Relative paths are resolved against `base_dir`, the directive file's directory.
    pub fn merge_with_cli(mut self, set_values: &[String], base_dir: &Path) -> Result<RunConfig> {
        self.apply_set_values(set_values)?;

        let general = self.general.take().unwrap_or_default();
        let descriptor = self.descriptor.take().unwrap_or_default();
        let predict = self.predict.take().unwrap_or_default();

        let resolve = |path: PathBuf| -> PathBuf {
            if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            }
        };

        let topology = general
            .topology
            .map(resolve)
            .ok_or_else(|| CliError::Directive("`general.topology` is required.".to_string()))?;
        let trajectory = descriptor
            .trajectory
            .map(resolve)
            .ok_or_else(|| CliError::Directive("`descriptor.trajectory` is required.".to_string()))?;
        let save_dir = resolve(
            descriptor
                .save_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_DIR)),
        );

        let defaults = DescriptorParams::default();
        let params = DescriptorParams {
            inner_cutoff: descriptor.inner_cutoff.unwrap_or(defaults.inner_cutoff),
            outer_cutoff: descriptor.outer_cutoff.unwrap_or(defaults.outer_cutoff),
            max_neighbors: descriptor.max_neighbors.unwrap_or(defaults.max_neighbors),
        };

        RunConfigBuilder::new()
            .topology_path(topology)
            .trajectory_path(trajectory)
            .save_dir(save_dir)
            .has_reference_labels(descriptor.has_reference_labels.unwrap_or(false))
            .frame_limit(descriptor.step)
            .calc_descriptor(descriptor.calc.unwrap_or(false))
            .calc_predict(predict.calc.unwrap_or(false))
            .model_dir(predict.model_dir.map(resolve))
            .descriptor_params(params)
            .build()
            .map_err(|e| CliError::Directive(e.to_string()))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Override {
                    entry: kv_pair.clone(),
                    reason: "expected KEY=VALUE".to_string(),
                });
            };

            match key {
                "general.topology" => {
                    self.general.get_or_insert_with(Default::default).topology =
                        Some(PathBuf::from(value_str));
                }
                "predict.calc" => {
                    self.predict.get_or_insert_with(Default::default).calc =
                        Some(parse_value(key, value_str)?);
                }
                "predict.model-dir" => {
                    self.predict.get_or_insert_with(Default::default).model_dir =
                        Some(PathBuf::from(value_str));
                }
                _ => self.apply_descriptor_value(key, value_str)?,
            }
        }
        Ok(())
    }

    fn apply_descriptor_value(&mut self, key: &str, value_str: &str) -> Result<()> {
        let descriptor = self.descriptor.get_or_insert_with(Default::default);
        match key {
            "descriptor.calc" => descriptor.calc = Some(parse_value(key, value_str)?),
            "descriptor.trajectory" => descriptor.trajectory = Some(PathBuf::from(value_str)),
            "descriptor.has-reference-labels" => {
                descriptor.has_reference_labels = Some(parse_value(key, value_str)?)
            }
            "descriptor.save-dir" => descriptor.save_dir = Some(PathBuf::from(value_str)),
            "descriptor.step" => descriptor.step = Some(parse_value(key, value_str)?),
            "descriptor.inner-cutoff" => descriptor.inner_cutoff = Some(parse_value(key, value_str)?),
            "descriptor.outer-cutoff" => descriptor.outer_cutoff = Some(parse_value(key, value_str)?),
            "descriptor.max-neighbors" => {
                descriptor.max_neighbors = Some(parse_value(key, value_str)?)
            }
            _ => {
                return Err(CliError::Override {
                    entry: format!("{key}={value_str}"),
                    reason: "no such directive key".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value_str: &str) -> Result<T> {
    value_str.trim().parse().map_err(|_| CliError::Override {
        entry: format!("{key}={value_str}"),
        reason: format!("not a valid {}", std::any::type_name::<T>()),
    })
}

/// Reads the directive file and builds the run configuration.
pub fn load(path: &Path, set_values: &[String]) -> Result<RunConfig> {
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    PartialRunConfig::from_file(path)?.merge_with_cli(set_values, base_dir)
}
