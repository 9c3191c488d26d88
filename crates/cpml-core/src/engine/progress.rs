#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    RoundsStart { total_rounds: u64, total_frames: u64 },
    RoundFinished { round: u64, frames: u64 },
    RoundsFinish,
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Progress sink for a run. Only rank 0 reports; other ranks hold a silent reporter.
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reporter_without_callback_is_silent() {
        ProgressReporter::new().report(Progress::PhaseFinish);
    }

    #[test]
    fn reporter_forwards_events_in_order() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::RoundFinished { round, .. } = event {
                seen.lock().unwrap().push(round);
            }
        }));
        reporter.report(Progress::RoundFinished { round: 0, frames: 4 });
        reporter.report(Progress::RoundsFinish);
        reporter.report(Progress::RoundFinished { round: 1, frames: 2 });
        drop(reporter);
        assert_eq!(seen.into_inner().unwrap(), vec![0, 1]);
    }
}
