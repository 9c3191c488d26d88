use super::config::ConfigError;
use super::error::IntegrityError;
use crate::core::models::frame::{Frame, FrameData};

/// How `total_frames` frames are dealt to `worker_count` ranks: `full_rounds` rounds
/// with one real frame per rank, then at most one partial round with `remainder` real
/// frames and padding for the remaining ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkAssignment {
    total_frames: usize,
    worker_count: usize,
    full_rounds: usize,
    remainder: usize,
}

/// One round of the distribution loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round {
    pub index: usize,
    /// Ranks `0..real_frames` receive a real frame; the rest receive padding.
    pub real_frames: usize,
}

impl WorkAssignment {
    pub fn new(total_frames: usize, worker_count: usize) -> Result<Self, ConfigError> {
        if worker_count < 1 {
            return Err(ConfigError::EmptyGroup);
        }
        Ok(Self {
            total_frames,
            worker_count,
            full_rounds: total_frames / worker_count,
            remainder: total_frames % worker_count,
        })
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn full_rounds(&self) -> usize {
        self.full_rounds
    }

    pub fn remainder(&self) -> usize {
        self.remainder
    }

    pub fn round_count(&self) -> usize {
        self.full_rounds + usize::from(self.remainder > 0)
    }

    pub fn rounds(&self) -> impl Iterator<Item = Round> + '_ {
        (0..self.round_count()).map(|index| Round {
            index,
            real_frames: if index < self.full_rounds {
                self.worker_count
            } else {
                self.remainder
            },
        })
    }

    /// Global frame index processed by `rank` in `round`.
    #[inline]
    pub fn frame_index(&self, round: usize, rank: usize) -> usize {
        round * self.worker_count + rank
    }

    /// Turns the frames read for a round into one work item per rank, in rank order.
    pub fn pad_round(&self, round: &Round, frames: Vec<FrameData>) -> Result<Vec<Frame>, IntegrityError> {
        if frames.len() != round.real_frames {
            return Err(IntegrityError::RoundReadCount {
                round: round.index,
                expected: round.real_frames,
                actual: frames.len(),
            });
        }
        let mut work = Vec::with_capacity(self.worker_count);
        for (rank, frame) in frames.into_iter().enumerate() {
            let expected = self.frame_index(round.index, rank);
            if frame.index != expected {
                return Err(IntegrityError::FrameOrder {
                    round: round.index,
                    rank,
                    expected,
                    found: frame.index,
                });
            }
            work.push(Frame::Real(frame));
        }
        work.resize(self.worker_count, Frame::Padding);
        Ok(work)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(indices: std::ops::Range<usize>) -> Vec<FrameData> {
        indices.map(|i| FrameData::new(i, Vec::new())).collect()
    }

    #[test]
    fn partition_covers_every_frame_for_all_group_sizes() {
        for total in 0..60 {
            for workers in 1..9 {
                let a = WorkAssignment::new(total, workers).unwrap();
                assert_eq!(a.full_rounds() * workers + a.remainder(), total);
                assert!(a.remainder() < workers);

                let mut seen = Vec::new();
                for round in a.rounds() {
                    for rank in 0..round.real_frames {
                        seen.push(a.frame_index(round.index, rank));
                    }
                }
                assert_eq!(seen, (0..total).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn ten_frames_on_four_workers() {
        let a = WorkAssignment::new(10, 4).unwrap();
        assert_eq!((a.full_rounds(), a.remainder()), (2, 2));
        let rounds: Vec<_> = a.rounds().collect();
        assert_eq!(rounds.len(), 3);
        assert_eq!(rounds[2], Round { index: 2, real_frames: 2 });
    }

    #[test]
    fn zero_frames_yield_no_rounds() {
        let a = WorkAssignment::new(0, 3).unwrap();
        assert_eq!(a.round_count(), 0);
        assert_eq!(a.rounds().count(), 0);
    }

    #[test]
    fn single_worker_has_no_remainder() {
        let a = WorkAssignment::new(7, 1).unwrap();
        assert_eq!((a.full_rounds(), a.remainder()), (7, 0));
    }

    #[test]
    fn empty_group_is_a_configuration_error() {
        assert_eq!(WorkAssignment::new(5, 0), Err(ConfigError::EmptyGroup));
    }

    #[test]
    fn pad_round_fills_idle_ranks_with_padding() {
        let a = WorkAssignment::new(10, 4).unwrap();
        let last = a.rounds().last().unwrap();
        let work = a.pad_round(&last, frames(8..10)).unwrap();
        assert_eq!(work.len(), 4);
        assert!(matches!(&work[0], Frame::Real(data) if data.index == 8));
        assert!(matches!(&work[1], Frame::Real(data) if data.index == 9));
        assert_eq!(work[2..], [Frame::Padding, Frame::Padding]);
    }

    #[test]
    fn pad_round_rejects_short_reads_and_misordered_frames() {
        let a = WorkAssignment::new(8, 4).unwrap();
        let first = a.rounds().next().unwrap();
        assert_eq!(
            a.pad_round(&first, frames(0..3)),
            Err(IntegrityError::RoundReadCount {
                round: 0,
                expected: 4,
                actual: 3
            })
        );
        assert_eq!(
            a.pad_round(&first, frames(1..5)),
            Err(IntegrityError::FrameOrder {
                round: 0,
                rank: 0,
                expected: 0,
                found: 1
            })
        );
    }
}
