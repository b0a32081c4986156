use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use flock_core::{
    CheckRule, CheckSpec, Comparator, LoadProfile, RequestStepSpec, RunOptions, ScenarioSpec,
    Stage, StepSpec, Threshold, ThresholdMetric, parse_threshold_expr,
};
use serde::Deserialize;

/// A plan file as written on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct PlanYaml {
    /// Scenario name. Defaults to the file stem.
    pub name: Option<String>,

    pub vus: Option<u64>,
    #[serde(default)]
    pub duration: Option<YamlDuration>,

    #[serde(rename = "startVUs")]
    pub start_vus: Option<u64>,
    #[serde(default)]
    pub stages: Vec<StageYaml>,

    /// Default per-request timeout.
    #[serde(default)]
    pub timeout: Option<YamlDuration>,
    #[serde(default)]
    pub graceful_stop: Option<YamlDuration>,
    #[serde(rename = "maxVUs")]
    pub max_vus: Option<u64>,

    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub thresholds: Vec<ThresholdYaml>,

    pub steps: Vec<StepYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub target: u64,
    pub duration: YamlDuration,
}

/// Either `sleep: <duration>` or a request (`url` plus optional fields).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StepYaml {
    pub name: Option<String>,
    #[serde(default)]
    pub sleep: Option<YamlDuration>,

    pub method: Option<String>,
    pub url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub headers: BTreeMap<String, String>,
    pub body: Option<BodyYaml>,
    #[serde(default)]
    pub timeout: Option<YamlDuration>,
    #[serde(default)]
    pub checks: Vec<CheckYaml>,
}

/// A raw string is sent as-is; any other YAML value is sent as JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum BodyYaml {
    Raw(String),
    Json(serde_yaml::Value),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CheckYaml {
    pub name: Option<String>,
    pub status: Option<StatusYaml>,
    #[serde(default)]
    pub max_duration: Option<YamlDuration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum StatusYaml {
    One(u16),
    Many(Vec<u16>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdYaml {
    Expr(String),
    Structured {
        metric: String,
        comparator: String,
        bound: f64,
        #[serde(default)]
        step: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s, 250ms) or integer seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let secs = u64::try_from(v).map_err(|_| E::custom("duration must not be negative"))?;
                Ok(YamlDuration(Duration::from_secs(secs)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn deserialize_scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;

    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();

    for (k, v) in raw {
        let s = match v {
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => return Err(D::Error::custom(format!("`{k}` must be a scalar value"))),
        };
        out.insert(k, s);
    }

    Ok(out)
}

/// CLI values that take precedence over the plan.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PlanOverrides {
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
}

/// A plan translated into engine inputs, not yet validated by the engine.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedPlan {
    pub scenario: ScenarioSpec,
    pub profile: LoadProfile,
    pub thresholds: Vec<Threshold>,
    pub options: RunOptions,
    pub env: BTreeMap<String, String>,
}

pub(crate) async fn load_plan(path: &Path) -> anyhow::Result<PlanYaml> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read plan: {}", path.display()))?;
    parse_plan(&bytes).with_context(|| format!("failed to parse plan: {}", path.display()))
}

pub(crate) fn parse_plan(bytes: &[u8]) -> anyhow::Result<PlanYaml> {
    Ok(serde_yaml::from_slice(bytes)?)
}

impl PlanYaml {
    pub(crate) fn resolve(
        self,
        path: &Path,
        overrides: PlanOverrides,
    ) -> anyhow::Result<ResolvedPlan> {
        let PlanYaml {
            name,
            vus,
            duration,
            start_vus,
            stages,
            timeout,
            graceful_stop,
            max_vus,
            env,
            thresholds,
            steps,
        } = self;

        let name = name
            .or_else(|| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s.to_string())
            })
            .unwrap_or_else(|| "default".to_string());

        let profile = match resolve_profile(
            vus,
            duration.map(YamlDuration::into_inner),
            start_vus,
            stages,
        )? {
            Some(p) => p.with_overrides(overrides.vus, overrides.duration),
            None => fill_missing_profile(overrides.vus.or(vus), overrides.duration)?,
        };

        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(idx, step)| {
                resolve_step(step).with_context(|| format!("invalid step #{}", idx + 1))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let thresholds = thresholds
            .into_iter()
            .map(resolve_threshold)
            .collect::<anyhow::Result<Vec<_>>>()?;

        let defaults = RunOptions::default();
        let options = RunOptions {
            request_timeout: timeout.map_or(defaults.request_timeout, YamlDuration::into_inner),
            graceful_stop: graceful_stop.map_or(defaults.graceful_stop, YamlDuration::into_inner),
            max_vus,
            ..defaults
        };

        Ok(ResolvedPlan {
            scenario: ScenarioSpec { name, steps },
            profile,
            thresholds,
            options,
            env,
        })
    }
}

/// `Ok(None)` when the plan leaves the profile entirely to the CLI.
fn resolve_profile(
    vus: Option<u64>,
    duration: Option<Duration>,
    start_vus: Option<u64>,
    stages: Vec<StageYaml>,
) -> anyhow::Result<Option<LoadProfile>> {
    if !stages.is_empty() {
        if vus.is_some() || duration.is_some() {
            anyhow::bail!("use either `vus`/`duration` or `stages`, not both");
        }
        return Ok(Some(LoadProfile::Staged {
            start_vus: start_vus.unwrap_or(0),
            stages: stages
                .into_iter()
                .map(|s| Stage {
                    duration: s.duration.into_inner(),
                    target: s.target,
                })
                .collect(),
        }));
    }

    if start_vus.is_some() {
        anyhow::bail!("`startVUs` requires `stages`");
    }

    Ok(duration.map(|duration| LoadProfile::Constant {
        vus: vus.unwrap_or(1),
        duration,
    }))
}

fn fill_missing_profile(vus: Option<u64>, duration: Option<Duration>) -> anyhow::Result<LoadProfile> {
    let duration =
        duration.context("plan has no load profile: set `duration` or `stages` (or pass --duration)")?;
    Ok(LoadProfile::Constant {
        vus: vus.unwrap_or(1),
        duration,
    })
}

fn resolve_step(step: StepYaml) -> anyhow::Result<StepSpec> {
    let StepYaml {
        name,
        sleep,
        method,
        url,
        mut headers,
        body,
        timeout,
        checks,
    } = step;

    match (sleep, url) {
        (Some(_), Some(_)) => anyhow::bail!("a step has either `url` or `sleep`, not both"),
        (None, None) => anyhow::bail!("a step needs `url` (request) or `sleep`"),
        (Some(d), None) => {
            let request_only = name.is_some()
                || method.is_some()
                || !headers.is_empty()
                || body.is_some()
                || timeout.is_some()
                || !checks.is_empty();
            if request_only {
                anyhow::bail!("`sleep` steps take no request fields");
            }
            Ok(StepSpec::Sleep(d.into_inner()))
        }
        (None, Some(url)) => {
            let body = match body {
                None => None,
                Some(BodyYaml::Raw(s)) => Some(s),
                Some(BodyYaml::Json(v)) => {
                    if !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                        headers.insert("Content-Type".to_string(), "application/json".to_string());
                    }
                    Some(serde_json::to_string(&v).context("`body` is not representable as JSON")?)
                }
            };

            Ok(StepSpec::Request(RequestStepSpec {
                name,
                method: method.unwrap_or_else(|| "GET".to_string()),
                url,
                headers: headers.into_iter().collect(),
                body,
                timeout: timeout.map(YamlDuration::into_inner),
                checks: checks
                    .into_iter()
                    .map(resolve_check)
                    .collect::<anyhow::Result<Vec<_>>>()?,
            }))
        }
    }
}

fn resolve_check(check: CheckYaml) -> anyhow::Result<CheckSpec> {
    let rule = match (check.status, check.max_duration) {
        (Some(StatusYaml::One(code)), None) => CheckRule::Status(vec![code]),
        (Some(StatusYaml::Many(codes)), None) => CheckRule::Status(codes),
        (None, Some(d)) => CheckRule::MaxDuration(d.into_inner()),
        _ => anyhow::bail!("a check needs exactly one of `status` or `maxDuration`"),
    };
    Ok(CheckSpec {
        name: check.name,
        rule,
    })
}

fn resolve_threshold(t: ThresholdYaml) -> anyhow::Result<Threshold> {
    match t {
        ThresholdYaml::Expr(raw) => Ok(parse_threshold_expr(&raw)?),
        ThresholdYaml::Structured {
            metric,
            comparator,
            bound,
            step,
        } => {
            let metric: ThresholdMetric = metric
                .parse()
                .map_err(|_| anyhow::anyhow!("unknown threshold metric `{metric}`"))?;
            let comparator: Comparator = comparator
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid comparator `{comparator}`"))?;

            let mut threshold = Threshold::new(metric, comparator, bound);
            if let Some(step) = step {
                threshold = threshold.for_step(step);
            }
            threshold.validate()?;
            Ok(threshold)
        }
    }
}
