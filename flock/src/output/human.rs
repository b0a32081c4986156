use std::sync::{Arc, OnceLock};

mod format;
mod progress;
mod summary;

use flock_core::{LoadProfile, ProgressUpdate};
use format::{format_duration, format_ms_opt, format_percent, format_rate};
use progress::HumanProgress;
use summary::{render, render_thresholds};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
    /// Progress bar prefix, set by the header.
    scenario: Arc<OnceLock<String>>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
            scenario: Arc::new(OnceLock::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, plan_path: &std::path::Path, plan: &flock_core::RunPlan) {
        let _ = self.scenario.set(plan.scenario().name().to_string());
        println!("plan: {}", plan_path.display());
        println!(
            "scenario: {} steps={}",
            plan.scenario().name(),
            plan.scenario().request_count()
        );
        println!("profile: {}", describe_profile(plan.profile()));
        for t in plan.thresholds() {
            println!("threshold: {t}");
        }
        println!();
    }

    fn progress(&self) -> Option<flock_core::ProgressFn> {
        let progress = self.progress.clone();
        let scenario = self.scenario.clone();
        Some(Arc::new(move |u: ProgressUpdate| {
            let prefix = scenario.get().map_or("run", String::as_str);
            progress.update(prefix, u.total_duration, u.elapsed, progress_message(&u));
        }))
    }

    fn print_summary(&self, report: &flock_core::RunReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(report));
        print!("{}", render_thresholds(report));

        if !report.verdict.is_pass() {
            eprintln!("thresholds failed:");
            for v in report.verdict.violations() {
                match v.observed {
                    Some(obs) => eprintln!("  {} (observed {obs})", v.name),
                    None => eprintln!("  {} (no data)", v.name),
                }
            }
        }
        Ok(())
    }
}

fn describe_profile(profile: &LoadProfile) -> String {
    match profile {
        LoadProfile::Constant { vus, duration } => {
            format!("vus={vus} duration={}", format_duration(*duration))
        }
        LoadProfile::Staged { start_vus, stages } => {
            let stages = stages
                .iter()
                .map(|s| format!("{}->{}", format_duration(s.duration), s.target))
                .collect::<Vec<_>>()
                .join(" ");
            format!("start_vus={start_vus} stages=[{stages}]")
        }
    }
}

fn progress_message(u: &ProgressUpdate) -> String {
    let mut msg = format!(
        "vus={}/{} elapsed={} rps={} err={} p95={}",
        u.active_vus,
        u.target_vus,
        format_duration(u.elapsed),
        format_rate(u.metrics.rps_now),
        format_percent(Some(u.metrics.error_rate_now)),
        format_ms_opt(u.metrics.latency_p95_ms)
    );
    if let Some(stage) = &u.stage {
        msg.push_str(&format!(
            " stage={}/{} stage_remaining={}",
            stage.stage,
            stage.stages,
            format_duration(stage.stage_remaining)
        ));
    }
    if u.max_vus < u.target_vus {
        msg.push_str(&format!(" ceiling={}", u.max_vus));
    }
    msg
}
