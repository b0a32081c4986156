pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while validating a run or joining its tasks.
///
/// Everything except [`Error::Join`] is a configuration problem detected before the first
/// request is sent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`stages` must be a non-empty array of {{ duration, target }} with a positive total duration")]
    InvalidStages,

    #[error("`max_vus` must be a positive integer")]
    InvalidMaxVus,

    #[error("scenario `{0}` has no request steps")]
    EmptyScenario(String),

    #[error("invalid step `{step}`: {reason}")]
    InvalidStep { step: String, reason: String },

    #[error("invalid template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("environment variable `{0}` is not set")]
    MissingEnv(String),

    #[error("invalid threshold `{expr}`: {reason}")]
    InvalidThreshold { expr: String, reason: String },

    #[error("invalid option `{name}`: {reason}")]
    InvalidOption { name: &'static str, reason: String },
}

/// Failure to obtain a VU slot from the scheduler's budget.
///
/// Never fatal: the scheduler degrades its ceiling and keeps running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("vu budget exhausted ({max_vus} slots in use)")]
    BudgetExhausted { max_vus: u64 },
}
