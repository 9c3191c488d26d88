use super::{Collective, CommError, Communicator, ROOT};
use crossbeam::channel::{Receiver, Sender, unbounded};
use std::any::Any;
use std::thread;
use tracing::{debug, trace};

struct Envelope {
    collective: Collective,
    payload: Box<dyn Any + Send>,
}

/// A rank of an in-process group. Ranks are connected pairwise by channels; each rank
/// owns the sending end towards every peer and the receiving end from every peer.
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    outboxes: Vec<Sender<Envelope>>,
    inboxes: Vec<Receiver<Envelope>>,
}

impl LocalCommunicator {
    /// Wires a complete group and returns its ranks in rank order.
    pub fn group(size: usize) -> Result<Vec<Self>, CommError> {
        if size == 0 {
            return Err(CommError::EmptyGroup);
        }
        let mut outboxes: Vec<Vec<Sender<Envelope>>> = (0..size).map(|_| Vec::new()).collect();
        let mut inboxes: Vec<Vec<Receiver<Envelope>>> = (0..size).map(|_| Vec::new()).collect();
        for destination in inboxes.iter_mut() {
            for source_outboxes in outboxes.iter_mut() {
                let (sender, receiver) = unbounded();
                source_outboxes.push(sender);
                destination.push(receiver);
            }
        }
        Ok(outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| Self {
                rank,
                size,
                outboxes,
                inboxes,
            })
            .collect())
    }

    fn send<T: Send + 'static>(
        &self,
        peer: usize,
        collective: Collective,
        value: T,
    ) -> Result<(), CommError> {
        trace!(rank = self.rank, peer, ?collective, "send");
        self.outboxes[peer]
            .send(Envelope {
                collective,
                payload: Box::new(value),
            })
            .map_err(|_| CommError::Disconnected {
                rank: self.rank,
                peer,
            })
    }

    fn receive<T: Send + 'static>(&self, peer: usize, expected: Collective) -> Result<T, CommError> {
        let envelope = self.inboxes[peer]
            .recv()
            .map_err(|_| CommError::Disconnected {
                rank: self.rank,
                peer,
            })?;
        if envelope.collective != expected {
            return Err(CommError::OutOfStep {
                rank: self.rank,
                peer,
                expected,
                received: envelope.collective,
            });
        }
        envelope
            .payload
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| CommError::PayloadType {
                rank: self.rank,
                peer,
                collective: expected,
            })
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast<T>(&self, value: Option<T>) -> Result<T, CommError>
    where
        T: Clone + Send + 'static,
    {
        if self.rank != ROOT {
            return self.receive(ROOT, Collective::Broadcast);
        }
        let value = value.ok_or(CommError::MissingRootPayload(Collective::Broadcast))?;
        for peer in (0..self.size).filter(|&peer| peer != ROOT) {
            self.send(peer, Collective::Broadcast, value.clone())?;
        }
        Ok(value)
    }

    fn scatter<T>(&self, values: Option<Vec<T>>) -> Result<T, CommError>
    where
        T: Send + 'static,
    {
        if self.rank != ROOT {
            return self.receive(ROOT, Collective::Scatter);
        }
        let values = values.ok_or(CommError::MissingRootPayload(Collective::Scatter))?;
        if values.len() != self.size {
            return Err(CommError::ScatterLength {
                expected: self.size,
                actual: values.len(),
            });
        }
        let mut own = None;
        for (peer, value) in values.into_iter().enumerate() {
            if peer == ROOT {
                own = Some(value);
            } else {
                self.send(peer, Collective::Scatter, value)?;
            }
        }
        own.ok_or(CommError::MissingRootPayload(Collective::Scatter))
    }

    fn gather<T>(&self, value: T) -> Result<Option<Vec<T>>, CommError>
    where
        T: Send + 'static,
    {
        if self.rank != ROOT {
            self.send(ROOT, Collective::Gather, value)?;
            return Ok(None);
        }
        let mut gathered = Vec::with_capacity(self.size);
        gathered.push(value);
        for peer in 1..self.size {
            gathered.push(self.receive(peer, Collective::Gather)?);
        }
        Ok(Some(gathered))
    }
}

/// A statically sized group of ranks, each running on its own thread with its own state.
#[derive(Debug, Clone, Copy)]
pub struct ProcessGroup {
    size: usize,
}

impl ProcessGroup {
    pub fn new(size: usize) -> Result<Self, CommError> {
        if size == 0 {
            return Err(CommError::EmptyGroup);
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `body` once per rank and waits for all ranks. Results are ordered by rank.
    ///
    /// A rank that returns early drops its channels, so peers blocked on it fail with
    /// [`CommError::Disconnected`] instead of waiting forever.
    pub fn launch<F, R>(&self, body: F) -> Vec<Result<R, CommError>>
    where
        F: Fn(LocalCommunicator) -> R + Sync,
        R: Send,
    {
        let communicators = match LocalCommunicator::group(self.size) {
            Ok(communicators) => communicators,
            Err(e) => return vec![Err(e)],
        };
        debug!(size = self.size, "Launching process group.");

        thread::scope(|scope| {
            let body = &body;
            let handles: Vec<_> = communicators
                .into_iter()
                .map(|comm| {
                    let rank = comm.rank();
                    thread::Builder::new()
                        .name(format!("rank-{rank}"))
                        .spawn_scoped(scope, move || body(comm))
                        .map_err(|e| CommError::Spawn {
                            rank,
                            reason: e.to_string(),
                        })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle.and_then(|h| h.join().map_err(|_| CommError::RankPanicked { rank }))
                })
                .collect()
        })
    }
}
