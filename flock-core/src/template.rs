//! `${...}` string templates rendered once per request.
//!
//! Supported placeholders: `${uuid}`, `${vu}`, `${iteration}`, `${timestamp}`, `${random}` and
//! `${env.NAME}`. Environment placeholders are resolved at compile time. `$$` is a literal `$`.

use std::fmt::Write as _;

use crate::context::{EnvVars, IterationContext, env_lookup};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Uuid,
    Vu,
    Iteration,
    Timestamp,
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn compile(raw: &str, env: &EnvVars) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidTemplate {
            template: raw.to_string(),
            reason,
        };

        let mut segments: Vec<Segment> = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;

        while let Some(pos) = rest.find('$') {
            literal.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(tail) = after.strip_prefix('$') {
                literal.push('$');
                rest = tail;
                continue;
            }

            let Some(body) = after.strip_prefix('{') else {
                literal.push('$');
                rest = after;
                continue;
            };

            let Some(end) = body.find('}') else {
                return Err(invalid("unterminated `${`".to_string()));
            };
            let name = body[..end].trim();
            rest = &body[end + 1..];

            let segment = match name {
                "uuid" => Segment::Uuid,
                "vu" => Segment::Vu,
                "iteration" => Segment::Iteration,
                "timestamp" => Segment::Timestamp,
                "random" => Segment::Random,
                _ => match name.strip_prefix("env.") {
                    Some(key) if !key.is_empty() => {
                        let value =
                            env_lookup(env, key).ok_or_else(|| Error::MissingEnv(key.to_string()))?;
                        literal.push_str(value);
                        continue;
                    }
                    _ => return Err(invalid(format!("unknown placeholder `{name}`"))),
                },
            };

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(segment);
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The template as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `true` when rendering never depends on the iteration.
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Literal segments only; used to validate static templates before the run.
    pub(crate) fn render_static(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Literal(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn render(&self, ctx: &IterationContext) -> String {
        let mut out = String::with_capacity(self.raw.len() + 32);
        for segment in &self.segments {
            // Writing into a String cannot fail.
            let _ = match segment {
                Segment::Literal(s) => {
                    out.push_str(s);
                    Ok(())
                }
                Segment::Uuid => write!(out, "{}", ctx.uuid),
                Segment::Vu => write!(out, "{}", ctx.vu_id),
                Segment::Iteration => write!(out, "{}", ctx.iteration),
                Segment::Timestamp => write!(out, "{}", ctx.timestamp_ms),
                Segment::Random => write!(out, "{}", ctx.random),
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::env_from_pairs;

    fn env() -> EnvVars {
        env_from_pairs([("BASE_URL", "http://localhost:8080"), ("TOKEN", "t0k")])
    }

    fn ctx() -> IterationContext {
        IterationContext {
            vu_id: 7,
            iteration: 3,
            uuid: uuid::Uuid::nil(),
            timestamp_ms: 1_700_000_000_000,
            random: 42,
        }
    }

    #[test]
    fn renders_placeholders_and_env() {
        let t = Template::compile("${env.BASE_URL}/v1/users/${vu}-${iteration}?r=${random}", &env())
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(!t.is_static());
        assert_eq!(t.render(&ctx()), "http://localhost:8080/v1/users/7-3?r=42");
    }

    #[test]
    fn env_only_templates_are_static() {
        let t = Template::compile("Bearer ${env.TOKEN}", &env()).unwrap_or_else(|e| panic!("{e}"));
        assert!(t.is_static());
        assert_eq!(t.render(&ctx()), "Bearer t0k");
        assert_eq!(t.as_str(), "Bearer ${env.TOKEN}");
    }

    #[test]
    fn uuid_and_timestamp_render() {
        let t = Template::compile("user_${uuid}@${timestamp}", &env()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            t.render(&ctx()),
            "user_00000000-0000-0000-0000-000000000000@1700000000000"
        );
    }

    #[test]
    fn dollar_escapes_and_bare_dollars() {
        let t = Template::compile("$$5 and $x and $", &env()).unwrap_or_else(|e| panic!("{e}"));
        assert!(t.is_static());
        assert_eq!(t.render(&ctx()), "$5 and $x and $");

        let t = Template::compile("$${vu}", &env()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(t.render(&ctx()), "${vu}");
    }

    #[test]
    fn rejects_bad_templates() {
        assert!(matches!(
            Template::compile("${nope}", &env()),
            Err(Error::InvalidTemplate { .. })
        ));
        assert!(matches!(
            Template::compile("abc ${uuid", &env()),
            Err(Error::InvalidTemplate { .. })
        ));
        assert!(matches!(
            Template::compile("${env.}", &env()),
            Err(Error::InvalidTemplate { .. })
        ));
        assert!(matches!(
            Template::compile("${env.MISSING}", &env()),
            Err(Error::MissingEnv(name)) if name == "MISSING"
        ));
    }
}
