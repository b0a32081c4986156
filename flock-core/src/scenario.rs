use std::sync::Arc;
use std::time::Duration;

use crate::context::EnvVars;
use crate::error::{Error, Result};
use crate::template::Template;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioSpec {
    pub name: String,
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSpec {
    Request(RequestStepSpec),
    /// Think time between requests.
    Sleep(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestStepSpec {
    /// Defaults to `"{METHOD} {url}"`.
    pub name: Option<String>,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Overrides the run's default request timeout.
    pub timeout: Option<Duration>,
    pub checks: Vec<CheckSpec>,
}

impl RequestStepSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            name: None,
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            checks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSpec {
    pub name: Option<String>,
    pub rule: CheckRule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckRule {
    /// The response status is one of these.
    Status(Vec<u16>),
    /// The request finished within this duration.
    MaxDuration(Duration),
}

impl CheckRule {
    fn default_name(&self) -> String {
        match self {
            Self::Status(codes) => match codes.as_slice() {
                [one] => format!("status is {one}"),
                many => {
                    let list: Vec<String> = many.iter().map(u16::to_string).collect();
                    format!("status in [{}]", list.join(", "))
                }
            },
            Self::MaxDuration(max) => format!("duration < {max:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: Arc<str>,
    pub rule: CheckRule,
}

impl Check {
    /// `status` is `None` when the request failed before a response.
    pub fn passes(&self, status: Option<u16>, latency: Duration) -> bool {
        match &self.rule {
            CheckRule::Status(codes) => status.is_some_and(|s| codes.contains(&s)),
            CheckRule::MaxDuration(max) => status.is_some() && latency <= *max,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestStep {
    pub name: Arc<str>,
    pub method: http::Method,
    pub url: Template,
    pub headers: Vec<(String, Template)>,
    pub body: Option<Template>,
    pub timeout: Option<Duration>,
    pub checks: Vec<Check>,
}

#[derive(Debug, Clone)]
pub enum Step {
    Request(RequestStep),
    Sleep(Duration),
}

/// A validated scenario with compiled templates. Immutable and cheap to clone.
#[derive(Debug, Clone)]
pub struct Scenario {
    name: Arc<str>,
    steps: Arc<[Step]>,
}

impl Scenario {
    pub fn compile(spec: ScenarioSpec, env: &EnvVars) -> Result<Self> {
        let mut steps = Vec::with_capacity(spec.steps.len());
        for step in spec.steps {
            steps.push(match step {
                StepSpec::Request(req) => Step::Request(compile_request(req, env)?),
                StepSpec::Sleep(d) => Step::Sleep(d),
            });
        }

        if !steps.iter().any(|s| matches!(s, Step::Request(_))) {
            return Err(Error::EmptyScenario(spec.name));
        }

        Ok(Self {
            name: Arc::from(spec.name),
            steps: Arc::from(steps.into_boxed_slice()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn request_steps(&self) -> impl Iterator<Item = &RequestStep> {
        self.steps.iter().filter_map(|s| match s {
            Step::Request(r) => Some(r),
            Step::Sleep(_) => None,
        })
    }

    pub fn request_count(&self) -> usize {
        self.request_steps().count()
    }
}

fn compile_request(spec: RequestStepSpec, env: &EnvVars) -> Result<RequestStep> {
    let name = spec
        .name
        .unwrap_or_else(|| format!("{} {}", spec.method.to_ascii_uppercase(), spec.url));
    let invalid = |reason: String| Error::InvalidStep {
        step: name.clone(),
        reason,
    };

    let method = http::Method::from_bytes(spec.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| invalid(format!("invalid method `{}`", spec.method)))?;

    let url = Template::compile(&spec.url, env)?;
    if url.is_static() {
        validate_url(&url.render_static())
            .map_err(|reason| invalid(format!("{reason}: `{}`", spec.url)))?;
    }

    let mut headers = Vec::with_capacity(spec.headers.len());
    for (k, v) in spec.headers {
        http::header::HeaderName::from_bytes(k.as_bytes())
            .map_err(|_| invalid(format!("invalid header name `{k}`")))?;
        let value = Template::compile(&v, env)?;
        if value.is_static() && http::HeaderValue::from_str(&value.render_static()).is_err() {
            return Err(invalid(format!("invalid value for header `{k}`")));
        }
        headers.push((k, value));
    }

    let body = spec
        .body
        .map(|b| Template::compile(&b, env))
        .transpose()?;

    if spec.timeout.is_some_and(|t| t.is_zero()) {
        return Err(invalid("timeout must be positive".to_string()));
    }

    let mut checks = Vec::with_capacity(spec.checks.len());
    for check in spec.checks {
        match &check.rule {
            CheckRule::Status(codes) if codes.is_empty() => {
                return Err(invalid("status check needs at least one code".to_string()));
            }
            CheckRule::Status(codes) => {
                if let Some(bad) = codes.iter().find(|c| !(100..=599).contains(*c)) {
                    return Err(invalid(format!("status check code {bad} is out of range")));
                }
            }
            CheckRule::MaxDuration(_) => {}
        }
        let check_name = check.name.unwrap_or_else(|| check.rule.default_name());
        checks.push(Check {
            name: Arc::from(check_name),
            rule: check.rule,
        });
    }

    Ok(RequestStep {
        name: Arc::from(name.as_str()),
        method,
        url,
        headers,
        body,
        timeout: spec.timeout,
        checks,
    })
}

fn validate_url(raw: &str) -> std::result::Result<(), &'static str> {
    let parsed = url::Url::parse(raw).map_err(|_| "invalid url")?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err("only http:// and https:// URLs are supported"),
    }
}
