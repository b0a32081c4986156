use std::time::Duration;

use crate::error::{Error, Result};
use crate::schedule::RampingU64Schedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// Time-varying target VU count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProfile {
    Constant { vus: u64, duration: Duration },

    /// Linear ramps from `start_vus` through each stage's target.
    Staged { start_vus: u64, stages: Vec<Stage> },
}

impl LoadProfile {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Constant { vus, duration } => {
                if *vus == 0 {
                    return Err(Error::InvalidVus);
                }
                if duration.is_zero() {
                    return Err(Error::InvalidDuration);
                }
            }
            Self::Staged { stages, .. } => {
                if stages.is_empty() || self.total_duration().is_zero() {
                    return Err(Error::InvalidStages);
                }
                if self.peak_vus() == 0 {
                    return Err(Error::InvalidVus);
                }
            }
        }
        Ok(())
    }

    pub fn total_duration(&self) -> Duration {
        match self {
            Self::Constant { duration, .. } => *duration,
            Self::Staged { stages, .. } => stages
                .iter()
                .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration)),
        }
    }

    pub fn peak_vus(&self) -> u64 {
        match self {
            Self::Constant { vus, .. } => *vus,
            Self::Staged { start_vus, stages } => stages
                .iter()
                .map(|s| s.target)
                .max()
                .unwrap_or(0)
                .max(*start_vus),
        }
    }

    /// Command-line overrides. Setting either value turns a staged profile into a constant one.
    #[must_use]
    pub fn with_overrides(self, vus: Option<u64>, duration: Option<Duration>) -> Self {
        if vus.is_none() && duration.is_none() {
            return self;
        }
        Self::Constant {
            vus: vus.unwrap_or_else(|| self.peak_vus()),
            duration: duration.unwrap_or_else(|| self.total_duration()),
        }
    }

    /// A constant profile is one flat stage starting at its VU count.
    pub fn schedule(&self) -> RampingU64Schedule {
        match self {
            Self::Constant { vus, duration } => RampingU64Schedule::new(
                *vus,
                vec![Stage {
                    duration: *duration,
                    target: *vus,
                }],
            ),
            Self::Staged { start_vus, stages } => {
                RampingU64Schedule::new(*start_vus, stages.clone())
            }
        }
    }
}
