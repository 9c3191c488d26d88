use clap::Parser;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "CPML Developers",
    version,
    about = "CPML CLI - Bond descriptors, Wannier-centre reference dipoles and machine-learned cell dipoles for molecular-dynamics trajectories.",
    help_template = HELP_TEMPLATE,
)]
pub struct Cli {
    /// Path to the directive file in TOML format.
    #[arg(value_name = "PATH")]
    pub input: PathBuf,

    /// Number of ranks in the process group.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'n', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set a specific directive value, overriding the directive file.
    /// Can be used multiple times. Example: -S descriptor.step=100
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE")]
    pub set_values: Vec<String>,
}
