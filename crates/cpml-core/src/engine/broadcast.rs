//! Startup handshake and control signals.
//!
//! Root decides, every other rank follows: each decision that could make ranks take
//! different paths is broadcast as a [`ControlSignal`] before the collective it guards.

use super::comm::{Collective, CommError, Communicator};
use super::config::{ConfigError, Mode, RunConfig};
use super::error::EngineError;
use crate::core::ml::models::ModelSet;
use crate::core::models::cell::UnitCell;
use crate::core::models::element::Element;
use crate::core::models::topology::Topology;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    Proceed,
    Abort { reason: String },
}

impl ControlSignal {
    pub fn abort(reason: impl Into<String>) -> Self {
        ControlSignal::Abort {
            reason: reason.into(),
        }
    }

    pub fn is_proceed(&self) -> bool {
        matches!(self, ControlSignal::Proceed)
    }

    /// Converts an `Abort` into the error non-root ranks report.
    pub fn into_result(self) -> Result<(), EngineError> {
        match self {
            ControlSignal::Proceed => Ok(()),
            ControlSignal::Abort { reason } => Err(EngineError::Aborted { reason }),
        }
    }
}

/// Run-constant state replicated from root to every rank once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RunManifest {
    pub config: RunConfig,
    pub topology: Topology,
    /// Present only when the run predicts.
    pub models: Option<ModelSet>,
    /// `None` when the trajectory holds no frames.
    pub cell: Option<UnitCell>,
    /// Species of every record, markers included, in file order.
    pub species: Vec<Element>,
    pub molecule_count: usize,
    pub total_frames: usize,
}

impl RunManifest {
    pub fn atoms_per_frame(&self) -> usize {
        self.species.len()
    }

    pub fn marker_count(&self) -> usize {
        self.species.iter().filter(|e| e.is_marker()).count()
    }

    pub fn mode(&self) -> Result<Mode, ConfigError> {
        self.config.mode()
    }
}

/// Broadcasts a control decision. Root passes `Some(signal)`, other ranks `None`.
pub fn announce<C: Communicator>(
    comm: &C,
    signal: Option<ControlSignal>,
) -> Result<ControlSignal, CommError> {
    comm.broadcast(signal)
}

/// Two-phase startup: root broadcasts whether INIT succeeded, then (on success) the
/// manifest itself.
///
/// On root, `prepared` is the outcome of INIT; an error is announced as `Abort` and
/// returned unchanged. Other ranks pass `None` and return [`EngineError::Aborted`] when
/// root aborts.
pub fn replicate<C: Communicator>(
    comm: &C,
    prepared: Option<Result<RunManifest, EngineError>>,
) -> Result<RunManifest, EngineError> {
    if !comm.is_root() {
        announce(comm, None)?.into_result()?;
        let manifest: RunManifest = comm.broadcast(None)?;
        debug!(
            rank = comm.rank(),
            frames = manifest.total_frames,
            "Received run manifest."
        );
        return Ok(manifest);
    }

    let prepared = prepared
        .unwrap_or_else(|| Err(CommError::MissingRootPayload(Collective::Broadcast).into()));
    match prepared {
        Ok(manifest) => {
            announce(comm, Some(ControlSignal::Proceed))?;
            Ok(comm.broadcast(Some(manifest))?)
        }
        Err(e) => {
            error!("Initialization failed on root: {}", e);
            announce(comm, Some(ControlSignal::abort(e.to_string())))?;
            Err(e)
        }
    }
}
