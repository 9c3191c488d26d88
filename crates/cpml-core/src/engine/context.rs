use super::broadcast::RunManifest;
use super::collector::ResultCollector;
use super::comm::Communicator;
use super::config::{Mode, Stages};
use super::distributor::WorkAssignment;
use super::error::EngineError;
use super::processor::FrameProcessor;

/// Per-rank state of a run, built once after the manifest broadcast and passed
/// explicitly to every stage.
pub struct RunContext<'a, C: Communicator> {
    pub comm: &'a C,
    pub manifest: RunManifest,
    pub mode: Mode,
    pub assignment: WorkAssignment,
}

impl<'a, C: Communicator> RunContext<'a, C> {
    /// Derives the mode and the work assignment from the rank's own manifest copy.
    pub fn new(comm: &'a C, manifest: RunManifest) -> Result<Self, EngineError> {
        let mode = manifest.mode()?;
        let assignment = WorkAssignment::new(manifest.total_frames, comm.size())?;
        Ok(Self {
            comm,
            manifest,
            mode,
            assignment,
        })
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn is_root(&self) -> bool {
        self.comm.is_root()
    }

    pub fn stages(&self) -> Stages {
        self.mode.stages()
    }

    pub fn processor(&self) -> FrameProcessor<'_> {
        FrameProcessor::new(&self.manifest, self.stages())
    }

    /// Collector for root; `None` on every other rank.
    pub fn collector(&self) -> Option<ResultCollector> {
        self.is_root().then(|| {
            ResultCollector::new(self.assignment, self.stages(), &self.manifest.config.save_dir)
        })
    }
}
