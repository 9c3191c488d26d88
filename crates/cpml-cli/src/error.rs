use cpml::engine::error::EngineError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

/// Failures of the `cpml` binary. Everything that happens inside the process group
/// arrives as [`CliError::Run`].
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Run(#[from] EngineError),

    #[error("Cannot read directive file '{path}': {source}", path = path.display())]
    DirectiveRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed directive file '{path}': {source}", path = path.display())]
    DirectiveSyntax {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid directive: {0}")]
    Directive(String),

    #[error("Invalid override '{entry}': {reason}")]
    Override { entry: String, reason: String },

    #[error("Cannot open log file '{path}': {source}", path = path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install the log subscriber: {0}")]
    Logger(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
