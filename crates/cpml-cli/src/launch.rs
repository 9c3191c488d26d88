use crate::cli::Cli;
use crate::config;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use cpml::engine::comm::{CommError, Communicator, LocalCommunicator, ProcessGroup};
use cpml::engine::config::ConfigError;
use cpml::engine::error::EngineError;
use cpml::engine::progress::ProgressReporter;
use cpml::workflows::pipeline::{self, PipelineSummary};
use std::num::NonZeroUsize;
use tracing::{error, info, warn};

type RankOutcome = std::result::Result<std::result::Result<PipelineSummary, EngineError>, CommError>;

pub fn run(cli: &Cli) -> Result<PipelineSummary> {
    let workers = resolve_workers(cli.workers)?;
    let group = ProcessGroup::new(workers).map_err(EngineError::from)?;
    info!(workers, "Starting process group.");

    let progress = CliProgressHandler::new();
    let outcomes = group.launch(|comm: LocalCommunicator| {
        let reporter = if comm.is_root() {
            ProgressReporter::with_callback(progress.get_callback())
        } else {
            ProgressReporter::new()
        };
        pipeline::run(
            &comm,
            || {
                config::load(&cli.input, &cli.set_values)
                    .map_err(|e| ConfigError::Directive(e.to_string()))
            },
            &reporter,
        )
    });

    let summary = settle(outcomes)?;
    print_summary(&summary);
    Ok(summary)
}

fn resolve_workers(requested: Option<usize>) -> Result<usize> {
    match requested {
        Some(0) => Err(EngineError::Config(ConfigError::EmptyGroup).into()),
        Some(n) => Ok(n),
        None => Ok(std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or_else(|e| {
                warn!("Could not query available parallelism ({}); using one rank.", e);
                1
            })),
    }
}

/// Reduces per-rank outcomes to the run's result. The root's error wins; otherwise the
/// lowest failing rank is reported.
fn settle(outcomes: Vec<RankOutcome>) -> Result<PipelineSummary> {
    let mut outcomes = outcomes
        .into_iter()
        .map(|joined| joined.map_err(EngineError::from).and_then(|outcome| outcome));

    let root = outcomes
        .next()
        .ok_or_else(|| CliError::Other(anyhow::anyhow!("Process group returned no ranks")))?;
    let first_failure = outcomes
        .enumerate()
        .find_map(|(i, outcome)| outcome.err().map(|e| (i + 1, e)));

    match (root, first_failure) {
        (Err(e), _) => Err(e.into()),
        (Ok(_), Some((rank, e))) => {
            error!(rank, "Rank failed after the root completed: {}", e);
            Err(e.into())
        }
        (Ok(summary), None) => Ok(summary),
    }
}

fn print_summary(summary: &PipelineSummary) {
    println!(
        "Processed {} frames on {} ranks in {} rounds ({} mode).",
        summary.total_frames, summary.worker_count, summary.rounds, summary.mode
    );
    if let Some(collected) = &summary.collected {
        for path in &collected.written {
            println!("  wrote {}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpml::engine::config::Mode;

    fn summary(rank: usize) -> PipelineSummary {
        PipelineSummary {
            rank,
            mode: Mode::DescriptorOnly,
            total_frames: 4,
            worker_count: 2,
            rounds: 2,
            collected: None,
        }
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(matches!(
            resolve_workers(Some(0)),
            Err(CliError::Run(EngineError::Config(ConfigError::EmptyGroup)))
        ));
        assert_eq!(resolve_workers(Some(3)).unwrap(), 3);
        assert!(resolve_workers(None).unwrap() >= 1);
    }

    #[test]
    fn settle_returns_the_root_summary() {
        let settled = settle(vec![Ok(Ok(summary(0))), Ok(Ok(summary(1)))]).unwrap();
        assert_eq!(settled.rank, 0);
    }

    #[test]
    fn settle_prefers_the_root_error() {
        let outcomes = vec![
            Ok(Err(EngineError::Config(ConfigError::NoStageEnabled))),
            Ok(Err(EngineError::Aborted {
                reason: "no stage".to_string(),
            })),
        ];
        assert!(matches!(
            settle(outcomes),
            Err(CliError::Run(EngineError::Config(ConfigError::NoStageEnabled)))
        ));
    }

    #[test]
    fn settle_reports_a_failed_peer() {
        let outcomes = vec![Ok(Ok(summary(0))), Err(CommError::RankPanicked { rank: 1 })];
        assert!(matches!(
            settle(outcomes),
            Err(CliError::Run(EngineError::Communication(CommError::RankPanicked {
                rank: 1
            })))
        ));
    }
}
