use std::sync::Arc;
use std::time::Duration;

use flock_core::{
    AbortHandle, CheckRule, CheckSpec, HttpTransport, LoadProfile, RequestStepSpec, RunOptions,
    RunPlan, ScenarioSpec, StepSpec, env_from_pairs, parse_threshold_expr, run,
};
use flock_testserver::TestServer;

fn named_get(name: &str, url: String, checks: Vec<CheckSpec>) -> StepSpec {
    StepSpec::Request(RequestStepSpec {
        name: Some(name.to_string()),
        checks,
        ..RequestStepSpec::get(url)
    })
}

fn status_200() -> CheckSpec {
    CheckSpec {
        name: Some("is status 200".to_string()),
        rule: CheckRule::Status(vec![200]),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn constant_load_against_slow_endpoint() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let env = env_from_pairs::<&str, &str>([]);

    let plan = RunPlan::new(
        ScenarioSpec {
            name: "slow".to_string(),
            steps: vec![named_get("slow", server.urls().slow.clone(), vec![status_200()])],
        },
        LoadProfile::Constant {
            vus: 10,
            duration: Duration::from_secs(5),
        },
        vec![
            parse_threshold_expr("p95_latency < 200")?,
            parse_threshold_expr("error_rate < 0.01")?,
            parse_threshold_expr("checks_rate >= 0.99")?,
        ],
        RunOptions::default(),
        &env,
    )?;

    let report = run(
        plan,
        Arc::new(HttpTransport::default()),
        None,
        AbortHandle::new(),
    )
    .await?;
    let served = server.stats().requests_total();
    server.shutdown().await;

    // 10 VUs * 5s / 50ms per request, minus ramp-up jitter.
    let count = report.requests_total;
    anyhow::ensure!((700..=1010).contains(&count), "count={count}");
    anyhow::ensure!(served >= count, "served={served} count={count}");
    anyhow::ensure!(report.snapshot.error_rate() == Some(0.0));
    anyhow::ensure!(report.verdict.is_pass(), "{:?}", report.verdict);
    anyhow::ensure!(report.peak_vus == 10, "peak={}", report.peak_vus);

    let step = report
        .snapshot
        .step("slow")
        .ok_or_else(|| anyhow::anyhow!("missing step"))?;
    anyhow::ensure!(step.requests.count == count);
    anyhow::ensure!(step.requests.bytes_received > 0);
    anyhow::ensure!(step.requests.statuses.get(&200) == Some(&count));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_errors_fail_error_rate_threshold() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let env = env_from_pairs::<&str, &str>([]);

    let plan = RunPlan::new(
        ScenarioSpec {
            name: "errors".to_string(),
            steps: vec![named_get("boom", server.urls().status(500), vec![status_200()])],
        },
        LoadProfile::Constant {
            vus: 2,
            duration: Duration::from_millis(500),
        },
        vec![parse_threshold_expr("error_rate < 0.01")?],
        RunOptions::default(),
        &env,
    )?;

    let report = run(
        plan,
        Arc::new(HttpTransport::default()),
        None,
        AbortHandle::new(),
    )
    .await?;
    server.shutdown().await;

    anyhow::ensure!(report.requests_total > 0);
    anyhow::ensure!(report.snapshot.error_rate() == Some(1.0));
    anyhow::ensure!(report.snapshot.checks_rate() == Some(0.0));

    let violations = report.verdict.violations();
    anyhow::ensure!(violations.len() == 1, "{violations:?}");
    anyhow::ensure!(violations[0].observed == Some(1.0));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_responses_are_recorded_as_timeouts() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let env = env_from_pairs::<&str, &str>([]);

    let plan = RunPlan::new(
        ScenarioSpec {
            name: "timeouts".to_string(),
            steps: vec![named_get("delayed", server.urls().delay(150), Vec::new())],
        },
        LoadProfile::Constant {
            vus: 1,
            duration: Duration::from_millis(600),
        },
        Vec::new(),
        RunOptions {
            request_timeout: Duration::from_millis(100),
            ..RunOptions::default()
        },
        &env,
    )?;

    let report = run(
        plan,
        Arc::new(HttpTransport::default()),
        None,
        AbortHandle::new(),
    )
    .await?;
    server.shutdown().await;

    let requests = &report.snapshot.requests;
    anyhow::ensure!(requests.count > 0);
    anyhow::ensure!(requests.failed == requests.count);
    anyhow::ensure!(requests.errors.get("timeout") == Some(&requests.count), "{requests:?}");
    anyhow::ensure!(requests.bytes_received == 0);

    let latency = requests.latency_us.micros_to_millis();
    let mean = latency.mean.unwrap_or_default();
    anyhow::ensure!((95.0..150.0).contains(&mean), "mean={mean}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn templates_and_env_reach_the_server() -> anyhow::Result<()> {
    let server = TestServer::start().await?;
    let env = env_from_pairs([("BASE_URL", server.base_url()), ("TOKEN", "secret")]);

    let create = StepSpec::Request(RequestStepSpec {
        name: Some("create_user".to_string()),
        method: "POST".to_string(),
        url: "${env.BASE_URL}/v1/users".to_string(),
        headers: vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("authorization".to_string(), "Bearer ${env.TOKEN}".to_string()),
        ],
        body: Some(
            r#"{"username":"user_${uuid}","email":"u${vu}_${iteration}@example.com","password":"password123"}"#
                .to_string(),
        ),
        timeout: None,
        checks: vec![CheckSpec {
            name: None,
            rule: CheckRule::Status(vec![200, 201]),
        }],
    });

    let plan = RunPlan::new(
        ScenarioSpec {
            name: "users".to_string(),
            steps: vec![create, StepSpec::Sleep(Duration::from_millis(20))],
        },
        LoadProfile::Constant {
            vus: 3,
            duration: Duration::from_millis(500),
        },
        vec![parse_threshold_expr("checks_rate >= 1")?],
        RunOptions::default(),
        &env,
    )?;

    let report = run(
        plan,
        Arc::new(HttpTransport::default()),
        None,
        AbortHandle::new(),
    )
    .await?;
    let created = server.stats().users_created();
    let duplicates = server.stats().duplicate_users();
    server.shutdown().await;

    anyhow::ensure!(report.requests_total > 0);
    anyhow::ensure!(duplicates == 0, "duplicates={duplicates}");
    anyhow::ensure!(created == report.requests_total, "created={created}");
    anyhow::ensure!(report.verdict.is_pass(), "{:?}", report.verdict);
    Ok(())
}
