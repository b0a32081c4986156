use std::path::Path;
use std::sync::Arc;

use flock_core::{AbortHandle, HttpTransport, RunPlan};
use tracing::warn;

use crate::cli::{PlanArgs, RunArgs, ValidateArgs};
use crate::env::merged_env;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::plan::{PlanOverrides, load_plan};
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);
    let overrides = PlanOverrides {
        vus: args.vus,
        duration: args.duration,
    };
    let plan = build_plan(&args.plan, overrides).await?;

    out.print_header(&args.plan.plan, &plan);

    let abort = AbortHandle::new();
    let on_ctrl_c = abort.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping virtual users");
            eprintln!("interrupted: stopping run");
            on_ctrl_c.abort();
        }
    });

    let transport = Arc::new(HttpTransport::default());
    let result = flock_core::run(plan, transport, out.progress(), abort).await;
    ctrl_c.abort();

    let report = result.map_err(|e| RunError::RuntimeError(e.into()))?;
    out.print_summary(&report).map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_verdict(&report.verdict))
}

pub async fn validate(args: ValidateArgs) -> Result<ExitCode, RunError> {
    let plan = build_plan(&args.plan, PlanOverrides::default()).await?;

    println!(
        "plan ok: {} (scenario {}, {} steps, {} thresholds, peak {} vus over {})",
        args.plan.plan.display(),
        plan.scenario().name(),
        plan.scenario().request_count(),
        plan.thresholds().len(),
        plan.profile().peak_vus(),
        humantime::format_duration(plan.profile().total_duration())
    );
    Ok(ExitCode::Success)
}

/// Everything up to here is user input; any failure maps to [`RunError::InvalidInput`].
async fn build_plan(args: &PlanArgs, overrides: PlanOverrides) -> Result<RunPlan, RunError> {
    let path: &Path = &args.plan;
    let yaml = load_plan(path).await.map_err(RunError::InvalidInput)?;
    let resolved = yaml
        .resolve(path, overrides)
        .map_err(RunError::InvalidInput)?;
    let env = merged_env(&resolved.env, &args.env);

    RunPlan::new(
        resolved.scenario,
        resolved.profile,
        resolved.thresholds,
        resolved.options,
        &env,
    )
    .map_err(|e| RunError::InvalidInput(anyhow::Error::new(e).context("invalid plan")))
}
