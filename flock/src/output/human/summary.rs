use std::fmt::Write as _;

use flock_core::{HistogramSummary, RunReport, SeriesSnapshot};

use super::format::*;

pub(crate) fn render(report: &RunReport) -> String {
    let snap = &report.snapshot;
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(&mut out, "scenario: {}", report.scenario).ok();
    if report.aborted {
        out.push_str("  aborted: yes\n");
    }
    writeln!(&mut out, "  elapsed: {}", format_duration(report.elapsed)).ok();
    writeln!(&mut out, "  vus: peak {}", report.peak_vus).ok();
    writeln!(
        &mut out,
        "  iterations: {} (interrupted {})",
        snap.iterations.completed, snap.iterations.interrupted
    )
    .ok();
    if snap.invalid_total > 0 {
        writeln!(&mut out, "  invalid_outcomes: {}", snap.invalid_total).ok();
    }

    out.push_str("\nrequests\n");
    render_series(&mut out, "  ", &snap.requests);

    let secs = report.elapsed.as_secs_f64().max(1e-9);
    let throughput = snap
        .requests
        .bytes_received
        .saturating_add(snap.requests.bytes_sent);
    writeln!(
        &mut out,
        "  rates: rps={} tps={}/s",
        format_rate(snap.requests.count as f64 / secs),
        format_bytes((throughput as f64 / secs).round() as u64)
    )
    .ok();

    if snap.steps.len() > 1 {
        out.push_str("\nsteps\n");
        for step in &snap.steps {
            writeln!(&mut out, "  {}", step.name).ok();
            render_series(&mut out, "    ", &step.requests);
        }
    }

    if !snap.checks.is_empty() {
        out.push_str("\nchecks\n");
        for c in &snap.checks {
            let status = if c.failed() > 0 { "FAIL" } else { "OK" };
            writeln!(
                &mut out,
                "  {}: pass={} fail={} [{status}]",
                c.name,
                c.passed,
                c.failed()
            )
            .ok();
        }
    }

    if !report.warnings.is_empty() {
        out.push_str("\nwarnings\n");
        for w in &report.warnings {
            writeln!(&mut out, "  {w}").ok();
        }
    }

    out
}

fn render_series(out: &mut String, indent: &str, s: &SeriesSnapshot) {
    writeln!(
        out,
        "{indent}count: {} (failed {}, {})",
        s.count,
        s.failed,
        format_percent(s.failure_rate())
    )
    .ok();
    writeln!(
        out,
        "{indent}bytes: recv {} sent {}",
        format_bytes(s.bytes_received),
        format_bytes(s.bytes_sent)
    )
    .ok();

    render_latency(out, indent, &s.latency_us.micros_to_millis());

    if !s.statuses.is_empty() {
        let classes = s
            .status_classes()
            .iter()
            .map(|(class, n)| format!("{class}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        let codes = s
            .statuses
            .iter()
            .map(|(code, n)| format!("{code}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "{indent}status: {classes} ({codes})").ok();
    }

    if !s.errors.is_empty() {
        let errors = s
            .errors
            .iter()
            .map(|(kind, n)| format!("{kind}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "{indent}errors: {errors}").ok();
    }
}

fn render_latency(out: &mut String, indent: &str, ms: &HistogramSummary) {
    if ms.count == 0 {
        writeln!(out, "{indent}latency: n/a").ok();
        return;
    }
    writeln!(
        out,
        "{indent}latency: p50={} p90={} p95={} p99={} mean={} max={} (n={})",
        format_ms_opt(ms.p50),
        format_ms_opt(ms.p90),
        format_ms_opt(ms.p95),
        format_ms_opt(ms.p99),
        format_ms_opt(ms.mean),
        format_ms_opt(ms.max),
        ms.count
    )
    .ok();
}

pub(crate) fn render_thresholds(report: &RunReport) -> String {
    let mut out = String::new();
    if report.thresholds.is_empty() {
        return out;
    }

    out.push_str("\nthresholds\n");
    let violations = report.verdict.violations();
    for t in &report.thresholds {
        let name = t.to_string();
        match violations.iter().find(|v| v.name == name) {
            None => writeln!(&mut out, "  {name} [PASS]").ok(),
            Some(v) => {
                let observed = v.observed.map_or_else(|| "n/a".to_string(), format_value);
                writeln!(&mut out, "  {name} (observed {observed}) [FAIL]").ok()
            }
        };
    }
    out
}
