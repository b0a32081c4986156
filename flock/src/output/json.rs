use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use flock_core::{HistogramSummary, ProgressUpdate, RunReport, SeriesSnapshot};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _plan_path: &Path, _plan: &flock_core::RunPlan) {}

    fn progress(&self) -> Option<flock_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        let line = build_summary_line(report);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub total_secs: f64,

    pub target_vus: u64,
    pub active_vus: u64,
    pub max_vus: u64,

    pub requests_per_sec: f64,
    pub error_rate: f64,

    pub total_requests: u64,
    pub failed_requests: u64,
    pub total_bytes_received: u64,
    pub total_bytes_sent: u64,
    pub iterations_total: u64,
    pub checks_failed_total: u64,

    pub latency_mean_ms: Option<f64>,
    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub latency_p99_ms: Option<f64>,

    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<JsonStage>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStage {
    pub stage: usize,
    pub stages: usize,
    pub start_target: u64,
    pub end_target: u64,
    pub remaining_secs: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    let m = &u.metrics;
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        total_secs: u.total_duration.as_secs_f64(),

        target_vus: u.target_vus,
        active_vus: u.active_vus,
        max_vus: u.max_vus,

        requests_per_sec: m.rps_now,
        error_rate: m.error_rate_now,

        total_requests: m.requests_total,
        failed_requests: m.failed_requests_total,
        total_bytes_received: m.bytes_received_total,
        total_bytes_sent: m.bytes_sent_total,
        iterations_total: m.iterations_total,
        checks_failed_total: m.checks_failed_total,

        latency_mean_ms: m.latency_mean_ms,
        latency_p50_ms: m.latency_p50_ms,
        latency_p95_ms: m.latency_p95_ms,
        latency_p99_ms: m.latency_p99_ms,

        req_per_sec_avg: m.rps_avg,
        req_per_sec_stdev: m.rps_stdev,
        req_per_sec_max: m.rps_max,

        stage: u.stage.as_ref().map(|s| JsonStage {
            stage: s.stage,
            stages: s.stages,
            start_target: s.start_target,
            end_target: s.end_target,
            remaining_secs: s.stage_remaining.as_secs_f64(),
        }),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub scenario: String,
    pub aborted: bool,
    pub elapsed_secs: f64,
    pub vus_peak: u64,

    pub requests: JsonSeries,
    pub requests_per_sec: Option<f64>,
    pub steps: BTreeMap<String, JsonSeries>,
    pub checks: BTreeMap<String, JsonCheck>,

    pub iterations_total: u64,
    pub iterations_interrupted: u64,
    pub invalid_outcomes: u64,

    pub warnings: Vec<String>,
    pub thresholds: JsonThresholds,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSeries {
    pub count: u64,
    pub failed: u64,
    pub error_rate: Option<f64>,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub statuses: BTreeMap<String, u64>,
    pub errors: BTreeMap<String, u64>,
    pub latency_ms: JsonLatency,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonLatency {
    pub min: Option<f64>,
    pub mean: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub max: Option<f64>,
    pub stdev: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheck {
    pub passed: u64,
    pub failed: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThresholds {
    pub passed: bool,
    pub evaluated: Vec<String>,
    pub violations: Vec<JsonViolation>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonViolation {
    pub threshold: String,
    pub bound: f64,
    pub observed: Option<f64>,
}

fn build_series(s: &SeriesSnapshot) -> JsonSeries {
    JsonSeries {
        count: s.count,
        failed: s.failed,
        error_rate: s.failure_rate(),
        bytes_received: s.bytes_received,
        bytes_sent: s.bytes_sent,
        statuses: s
            .statuses
            .iter()
            .map(|(code, n)| (code.to_string(), *n))
            .collect(),
        errors: s
            .errors
            .iter()
            .map(|(kind, n)| ((*kind).to_string(), *n))
            .collect(),
        latency_ms: build_latency(&s.latency_us.micros_to_millis()),
    }
}

fn build_latency(ms: &HistogramSummary) -> JsonLatency {
    JsonLatency {
        min: ms.min,
        mean: ms.mean,
        p50: ms.p50,
        p90: ms.p90,
        p95: ms.p95,
        p99: ms.p99,
        max: ms.max,
        stdev: ms.stdev,
    }
}

fn build_summary_line(report: &RunReport) -> JsonSummaryLine {
    let snap = &report.snapshot;
    JsonSummaryLine {
        kind: "summary",
        scenario: report.scenario.clone(),
        aborted: report.aborted,
        elapsed_secs: report.elapsed.as_secs_f64(),
        vus_peak: report.peak_vus,

        requests: build_series(&snap.requests),
        requests_per_sec: snap.rps(),
        steps: snap
            .steps
            .iter()
            .map(|s| (s.name.to_string(), build_series(&s.requests)))
            .collect(),
        checks: snap
            .checks
            .iter()
            .map(|c| {
                (
                    c.name.to_string(),
                    JsonCheck {
                        passed: c.passed,
                        failed: c.failed(),
                    },
                )
            })
            .collect(),

        iterations_total: snap.iterations.completed,
        iterations_interrupted: snap.iterations.interrupted,
        invalid_outcomes: snap.invalid_total,

        warnings: report.warnings.iter().map(ToString::to_string).collect(),
        thresholds: JsonThresholds {
            passed: report.verdict.is_pass(),
            evaluated: report.thresholds.iter().map(ToString::to_string).collect(),
            violations: report
                .verdict
                .violations()
                .iter()
                .map(|v| JsonViolation {
                    threshold: v.name.clone(),
                    bound: v.bound,
                    observed: v.observed,
                })
                .collect(),
        },
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
