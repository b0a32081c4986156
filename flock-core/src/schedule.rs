use std::time::Duration;

use crate::profile::Stage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Piecewise-linear target over elapsed time.
#[derive(Debug, Clone)]
pub struct RampingU64Schedule {
    start: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

struct Position {
    index: usize,
    stage_start: Duration,
    stage_end: Duration,
    start_target: u64,
    end_target: u64,
}

impl RampingU64Schedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let cumulative_ends = stages
            .iter()
            .scan(Duration::ZERO, |acc, s| {
                *acc = acc.saturating_add(s.duration);
                Some(*acc)
            })
            .collect();

        Self {
            start,
            stages,
            cumulative_ends,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Highest target any point of the schedule reaches.
    pub fn peak(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .max()
            .unwrap_or(0)
            .max(self.start)
    }

    /// Stage containing `elapsed` (clamped to the last stage).
    fn locate(&self, elapsed: Duration) -> Option<Position> {
        if self.stages.is_empty() {
            return None;
        }

        let index = self
            .cumulative_ends
            .partition_point(|end| *end < elapsed)
            .min(self.stages.len() - 1);

        Some(Position {
            index,
            stage_start: match index {
                0 => Duration::ZERO,
                i => self.cumulative_ends[i - 1],
            },
            stage_end: self.cumulative_ends[index],
            start_target: match index {
                0 => self.start,
                i => self.stages[i - 1].target,
            },
            end_target: self.stages[index].target,
        })
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if elapsed.is_zero() {
            return self.start;
        }
        let Some(pos) = self.locate(elapsed) else {
            return self.start;
        };
        if elapsed >= self.total_duration() {
            return pos.end_target;
        }

        let stage_duration = pos.stage_end.saturating_sub(pos.stage_start);
        if stage_duration.is_zero() {
            return pos.end_target;
        }
        let stage_elapsed = elapsed.saturating_sub(pos.stage_start);

        // Linear interpolation, truncated toward the start target.
        let start = i128::from(pos.start_target);
        let delta = i128::from(pos.end_target) - start;
        let num = stage_elapsed.as_nanos() as i128;
        let den = (stage_duration.as_nanos() as i128).max(1);

        let cur = start + delta.saturating_mul(num) / den;
        cur.clamp(0, i128::from(u64::MAX)) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        let clamped = elapsed.min(self.total_duration());
        let pos = self.locate(clamped)?;

        let stage_duration = pos.stage_end.saturating_sub(pos.stage_start);
        let stage_elapsed = clamped.saturating_sub(pos.stage_start);

        Some(StageSnapshot {
            index: pos.index,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target: pos.start_target,
            end_target: pos.end_target,
            current_target: self.target_at(clamped),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> RampingU64Schedule {
        RampingU64Schedule::new(
            0,
            vec![
                Stage {
                    duration: Duration::from_secs(10),
                    target: 10,
                },
                Stage {
                    duration: Duration::from_secs(10),
                    target: 10,
                },
                Stage {
                    duration: Duration::from_secs(5),
                    target: 0,
                },
            ],
        )
    }

    #[test]
    fn interpolates_linearly() {
        let s = ramp();
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(Duration::from_secs(5)), 5);
        assert_eq!(s.target_at(Duration::from_millis(9_999)), 9);
        assert_eq!(s.target_at(Duration::from_secs(10)), 10);
        assert_eq!(s.target_at(Duration::from_secs(15)), 10);
        assert_eq!(s.target_at(Duration::from_millis(22_500)), 5);
        assert_eq!(s.target_at(Duration::from_secs(25)), 0);
        assert_eq!(s.target_at(Duration::from_secs(99)), 0);
        assert_eq!(s.peak(), 10);
    }

    #[test]
    fn stage_snapshot_reports_position() {
        let s = ramp();
        let Some(snap) = s.stage_snapshot_at(Duration::from_secs(12)) else {
            panic!("expected a stage");
        };
        assert_eq!(snap.index, 1);
        assert_eq!(snap.count, 3);
        assert_eq!(snap.stage_elapsed, Duration::from_secs(2));
        assert_eq!(snap.stage_remaining, Duration::from_secs(8));
        assert_eq!((snap.start_target, snap.end_target), (10, 10));

        let Some(last) = s.stage_snapshot_at(Duration::from_secs(60)) else {
            panic!("expected a stage");
        };
        assert_eq!(last.index, 2);
        assert_eq!(last.stage_remaining, Duration::ZERO);
        assert_eq!(last.current_target, 0);
        assert_eq!(s.total_duration(), Duration::from_secs(25));
    }

    #[test]
    fn zero_length_stage_jumps_to_target() {
        let s = RampingU64Schedule::new(
            2,
            vec![
                Stage {
                    duration: Duration::ZERO,
                    target: 8,
                },
                Stage {
                    duration: Duration::from_secs(1),
                    target: 8,
                },
            ],
        );
        assert_eq!(s.target_at(Duration::ZERO), 2);
        assert_eq!(s.target_at(Duration::from_millis(1)), 8);
    }

    #[test]
    fn empty_schedule_holds_start() {
        let s = RampingU64Schedule::new(3, Vec::new());
        assert_eq!(s.target_at(Duration::from_secs(1)), 3);
        assert!(s.stage_snapshot_at(Duration::from_secs(1)).is_none());
    }
}
