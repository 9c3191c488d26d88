use crate::core::io::itp::read_topology;
use crate::core::io::xyz::{self, FrameSource};
use crate::core::ml::models::ModelSet;
use crate::core::models::element::Element;
use crate::core::models::frame::Frame;
use crate::engine::broadcast::{ControlSignal, RunManifest, announce, replicate};
use crate::engine::collector::{CollectedRun, ResultCollector};
use crate::engine::comm::Communicator;
use crate::engine::config::{ConfigError, Mode, RunConfig};
use crate::engine::context::RunContext;
use crate::engine::distributor::{Round, WorkAssignment};
use crate::engine::error::{EngineError, PersistError};
use crate::engine::progress::{Progress, ProgressReporter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing::{debug, error, info, instrument, warn};

/// Outcome of a pipeline run on one rank.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub rank: usize,
    pub mode: Mode,
    pub total_frames: usize,
    pub worker_count: usize,
    /// Rounds this rank took part in.
    pub rounds: usize,
    /// Root only.
    pub collected: Option<CollectedRun>,
}

/// State only rank 0 holds during the round loop.
struct RootState<R> {
    source: FrameSource<R>,
    collector: ResultCollector,
    failure: Option<EngineError>,
}

impl<R: BufRead> RootState<R> {
    fn read_round(&mut self, assignment: &WorkAssignment, round: &Round) -> Result<Vec<Frame>, EngineError> {
        let frames = self.source.read_batch(round.real_frames)?;
        Ok(assignment.pad_round(round, frames)?)
    }

    fn signal(&self) -> ControlSignal {
        match &self.failure {
            None => ControlSignal::Proceed,
            Some(e) => ControlSignal::abort(e.to_string()),
        }
    }
}

/// Runs the dipole pipeline on one rank. Every rank of the group must call this with
/// its own communicator; `load_config` is only invoked on rank 0.
///
/// Rank 0 returns the error that stopped the run; other ranks return
/// [`EngineError::Aborted`] carrying its message.
#[instrument(skip_all, name = "pipeline", fields(rank = comm.rank()))]
pub fn run<C, L>(
    comm: &C,
    load_config: L,
    reporter: &ProgressReporter,
) -> Result<PipelineSummary, EngineError>
where
    C: Communicator,
    L: FnOnce() -> Result<RunConfig, ConfigError>,
{
    let report = |event: Progress| {
        if comm.is_root() {
            reporter.report(event);
        }
    };

    // === Phase 1: Initialization (rank 0) ===
    let mut source = None;
    let prepared = if comm.is_root() {
        report(Progress::PhaseStart {
            name: "Initialization",
        });
        let prepared = initialize(load_config).map(|(manifest, frames)| {
            source = Some(frames);
            manifest
        });
        report(Progress::PhaseFinish);
        Some(prepared)
    } else {
        None
    };

    // === Phase 2: Replication ===
    let manifest = replicate(comm, prepared)?;
    let context = RunContext::new(comm, manifest)?;
    if context.is_root() {
        info!(
            mode = %context.mode,
            frames = context.assignment.total_frames(),
            markers = context.manifest.marker_count(),
            workers = context.assignment.worker_count(),
            full_rounds = context.assignment.full_rounds(),
            remainder = context.assignment.remainder(),
            "Run manifest replicated."
        );
    }

    // === Phase 3: Round loop ===
    let mut root = source
        .zip(context.collector())
        .map(|(source, collector)| RootState {
            source,
            collector,
            failure: None,
        });
    let rounds = round_loop(&context, root.as_mut(), &report)?;

    // === Phase 4: Collection and persistence (rank 0) ===
    let outcome = match root {
        Some(state) => match state.failure {
            Some(e) => Err(e),
            None => {
                report(Progress::PhaseStart { name: "Persisting" });
                let collected = state.collector.finish();
                report(Progress::PhaseFinish);
                collected.map(Some)
            }
        },
        None => Ok(None),
    };

    // === Phase 5: Completion ===
    let signal = context.is_root().then(|| match &outcome {
        Ok(_) => ControlSignal::Proceed,
        Err(e) => ControlSignal::abort(e.to_string()),
    });
    let signal = announce(comm, signal)?;
    let collected = if context.is_root() {
        outcome.inspect_err(|e| error!("Run failed: {}", e))?
    } else {
        signal.into_result()?;
        None
    };

    info!(rounds, "Rank finished.");
    Ok(PipelineSummary {
        rank: context.rank(),
        mode: context.mode,
        total_frames: context.assignment.total_frames(),
        worker_count: context.assignment.worker_count(),
        rounds,
        collected,
    })
}

fn round_loop<C, R, F>(
    context: &RunContext<'_, C>,
    mut root: Option<&mut RootState<R>>,
    report: &F,
) -> Result<usize, EngineError>
where
    C: Communicator,
    R: BufRead,
    F: Fn(Progress),
{
    let comm = context.comm;
    let assignment = &context.assignment;
    let processor = context.processor();

    report(Progress::RoundsStart {
        total_rounds: assignment.round_count() as u64,
        total_frames: assignment.total_frames() as u64,
    });

    let mut completed = 0;
    for round in assignment.rounds() {
        let mut work = None;
        let mut signal = None;
        if let Some(state) = root.as_deref_mut() {
            if state.failure.is_none() {
                match state.read_round(assignment, &round) {
                    Ok(frames) => work = Some(frames),
                    Err(e) => {
                        error!(round = round.index, "Failed to read round: {}", e);
                        state.failure = Some(e);
                    }
                }
            }
            signal = Some(state.signal());
        }

        if !announce(comm, signal)?.is_proceed() {
            debug!(round = round.index, "Round loop stopped by rank 0.");
            break;
        }

        let frame: Frame = comm.scatter(work)?;
        let output = processor.process(frame);
        let gathered = comm.gather(output)?;

        if let (Some(state), Some(outputs)) = (root.as_deref_mut(), gathered) {
            if let Err(e) = state.collector.accept_round(&round, outputs) {
                error!(round = round.index, "Round rejected: {}", e);
                state.failure = Some(e);
            }
            report(Progress::RoundFinished {
                round: round.index as u64,
                frames: round.real_frames as u64,
            });
        }
        completed += 1;
    }

    report(Progress::RoundsFinish);
    Ok(completed)
}

/// Loads and validates everything the run needs, before any collective call.
fn initialize<L>(load_config: L) -> Result<(RunManifest, FrameSource<BufReader<File>>), EngineError>
where
    L: FnOnce() -> Result<RunConfig, ConfigError>,
{
    let config = load_config()?;
    let mode = config.mode()?;
    info!(%mode, "Configuration loaded.");

    let topology = read_topology(&config.topology_path)?;
    debug!(
        atoms = topology.atoms_per_molecule(),
        bonds = topology.bonds().len(),
        "Topology loaded."
    );

    let (species, cell, counted) = match xyz::read_header(&config.trajectory_path)? {
        Some(header) => {
            let counted = xyz::count_frames(&config.trajectory_path, header.atoms_per_frame())?;
            (header.species, Some(header.cell), counted)
        }
        None => {
            warn!(path = %config.trajectory_path.display(), "Trajectory holds no frames.");
            (Vec::new(), None, 0)
        }
    };
    let total_frames = config.frame_limit.map_or(counted, |limit| limit.min(counted));
    if total_frames < counted {
        info!(counted, total_frames, "Frame count capped by configuration.");
    }

    let molecular: Vec<Element> = species
        .iter()
        .copied()
        .filter(|element| !element.is_marker())
        .collect();
    let molecule_count = topology.validate_species(&molecular)?;
    info!(
        molecules = molecule_count,
        markers = species.len() - molecular.len(),
        frames = total_frames,
        "Trajectory header read."
    );

    let models = if mode.stages().predict {
        let directory = config
            .model_dir
            .as_deref()
            .ok_or(ConfigError::MissingParameter("model_dir"))?;
        Some(ModelSet::load(directory, &topology, config.descriptor.width())?)
    } else {
        None
    };

    std::fs::create_dir_all(&config.save_dir).map_err(|e| PersistError::Directory {
        path: config.save_dir.to_string_lossy().to_string(),
        source: e,
    })?;

    let source = FrameSource::open(&config.trajectory_path, species.clone(), total_frames)?;
    let manifest = RunManifest {
        config,
        topology,
        models,
        cell,
        species,
        molecule_count,
        total_frames,
    };
    Ok((manifest, source))
}
