use std::collections::BTreeMap;

use flock_core::{EnvVars, env_from_pairs, process_env_snapshot};

/// Layers `process env < plan env < --env`.
pub(crate) fn merged_env(
    plan_env: &BTreeMap<String, String>,
    overrides: &[(String, String)],
) -> EnvVars {
    let mut map: BTreeMap<String, String> = process_env_snapshot()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    for (k, v) in plan_env.iter().chain(overrides.iter().map(|(k, v)| (k, v))) {
        map.insert(k.clone(), v.clone());
    }

    env_from_pairs(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flock_core::env_lookup;

    #[test]
    fn overrides_win_over_plan_env() {
        let plan: BTreeMap<String, String> = [
            ("FLOCK_TEST_ONLY_PLAN".to_string(), "plan".to_string()),
            ("FLOCK_TEST_BOTH".to_string(), "plan".to_string()),
        ]
        .into_iter()
        .collect();
        let overrides = vec![("FLOCK_TEST_BOTH".to_string(), "cli".to_string())];

        let env = merged_env(&plan, &overrides);
        assert_eq!(env_lookup(&env, "FLOCK_TEST_ONLY_PLAN"), Some("plan"));
        assert_eq!(env_lookup(&env, "FLOCK_TEST_BOTH"), Some("cli"));
    }

    #[test]
    fn process_env_is_visible() {
        let Some((key, value)) = std::env::vars().next() else {
            return;
        };
        let env = merged_env(&BTreeMap::new(), &[]);
        assert_eq!(env_lookup(&env, &key), Some(value.as_str()));
    }
}
