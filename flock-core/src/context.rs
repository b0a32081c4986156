use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Environment visible to templates, in lookup order (later entries win).
pub type EnvVars = Arc<[(Arc<str>, Arc<str>)]>;

pub fn process_env_snapshot() -> EnvVars {
    let vars: Vec<(Arc<str>, Arc<str>)> = std::env::vars()
        .map(|(k, v)| (Arc::<str>::from(k), Arc::<str>::from(v)))
        .collect();
    Arc::from(vars.into_boxed_slice())
}

pub fn env_from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> EnvVars
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let vars: Vec<(Arc<str>, Arc<str>)> = pairs
        .into_iter()
        .map(|(k, v)| (Arc::<str>::from(k.as_ref()), Arc::<str>::from(v.as_ref())))
        .collect();
    Arc::from(vars.into_boxed_slice())
}

pub fn env_lookup<'a>(env: &'a EnvVars, key: &str) -> Option<&'a str> {
    env.iter()
        .rev()
        .find(|(k, _)| k.as_ref() == key)
        .map(|(_, v)| v.as_ref())
}

/// Values generated once per iteration and shared by every step of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationContext {
    pub vu_id: u64,
    /// Per-VU iteration number, starting at 0.
    pub iteration: u64,
    pub uuid: Uuid,
    /// Unix epoch milliseconds at iteration start.
    pub timestamp_ms: u64,
    pub random: u32,
}

impl IterationContext {
    pub fn new(vu_id: u64, iteration: u64) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);

        Self {
            vu_id,
            iteration,
            uuid: Uuid::new_v4(),
            timestamp_ms,
            random: rand::random(),
        }
    }
}
