use std::process::Command;

use anyhow::Context as _;
use flock_testserver::TestServer;

#[tokio::test]
async fn e2e_json_output_reports_progress_and_summary() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let base_url = server.base_url().to_string();

    let tmp = tempfile::tempdir().context("create tempdir")?;
    let plan = tmp.path().join("tweets.yaml");
    std::fs::write(
        &plan,
        r#"
name: tweets
vus: 3
duration: 2s
env:
  TOKEN: secret
thresholds:
  - "error_rate < 0.01"
  - metric: p95_latency
    comparator: "<"
    bound: 1000
    step: create_tweet
steps:
  - name: create_tweet
    method: POST
    url: ${env.BASE_URL}/v1/tweets
    headers:
      Authorization: ${env.TOKEN}
    body:
      content: tweet from vu ${vu} iteration ${iteration}
    checks:
      - name: is status 200
        status: 200
  - name: list_tweets
    url: ${env.BASE_URL}/v1/tweets
  - sleep: 100ms
"#,
    )
    .context("write plan")?;

    let exe = env!("CARGO_BIN_EXE_flock");
    let out = tokio::task::spawn_blocking(move || {
        Command::new(exe)
            .arg("run")
            .arg(&plan)
            .arg("--output")
            .arg("json")
            .env("BASE_URL", &base_url)
            .output()
    })
    .await
    .context("spawn_blocking join")?
    .context("run flock binary")?;

    let tweets_created = server.stats().tweets_created();
    server.shutdown().await;

    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(
        out.status.success(),
        "flock exited with {}\nstdout:\n{stdout}\nstderr:\n{}",
        out.status,
        String::from_utf8_lossy(&out.stderr)
    );

    let lines = stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(serde_json::from_str::<serde_json::Value>)
        .collect::<Result<Vec<_>, _>>()
        .context("stdout is not NDJSON")?;

    let progress = lines.iter().filter(|v| v["kind"] == "progress").count();
    anyhow::ensure!(progress >= 1, "expected progress lines, got {progress}");

    let summary = lines
        .iter()
        .find(|v| v["kind"] == "summary")
        .context("missing summary line")?;
    anyhow::ensure!(lines.last() == Some(summary), "summary must be the last line");

    let created = summary["steps"]["create_tweet"]["count"]
        .as_u64()
        .context("create_tweet count")?;
    let listed = summary["steps"]["list_tweets"]["count"]
        .as_u64()
        .context("list_tweets count")?;
    anyhow::ensure!(created > 0, "no tweets created");
    anyhow::ensure!(
        created.abs_diff(listed) <= 3,
        "steps run in order per iteration: created={created} listed={listed}"
    );
    anyhow::ensure!(
        created == tweets_created,
        "server saw {tweets_created} tweets, report says {created}"
    );

    anyhow::ensure!(summary["scenario"] == "tweets");
    anyhow::ensure!(summary["requests"]["failed"] == 0);
    anyhow::ensure!(summary["checks"]["is status 200"]["failed"] == 0);
    anyhow::ensure!(summary["thresholds"]["passed"] == true);
    anyhow::ensure!(summary["vus_peak"] == 3);
    anyhow::ensure!(summary["aborted"] == false);

    Ok(())
}
