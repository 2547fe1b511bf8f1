use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use apitest_core::{ApitestError, Evaluator, ExpectationSuite, HttpClient, Pipeline, RequestTask};
use tokio_util::sync::CancellationToken;

use crate::cli::{default_concurrency, Command, ExpectTestArgs, TestRouteArgs};

pub async fn run(command: Command, cancel: CancellationToken) -> Result<ExitCode, ApitestError> {
    match command {
        Command::TestRoute(args) => test_route(args, cancel).await,
        Command::ExpectTest(args) => expect_test(args, cancel).await,
    }
}

async fn test_route(args: TestRouteArgs, cancel: CancellationToken) -> Result<ExitCode, ApitestError> {
    let mut task = RequestTask::new(args.method, &args.url)?;
    for (name, value) in args.headers {
        task = task.with_header(name, value)?;
    }
    if let Some(body) = args.body {
        task = task.with_body(body);
    }

    let concurrency = args.concurrency as usize;
    let pipeline = Pipeline::http(concurrency, Duration::from_secs(args.timeout))?
        .with_cancellation(cancel);
    let result = pipeline.run(&task, args.number as usize, concurrency).await?;

    let mut out = std::io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &result)?;
        writeln!(out)?;
    } else {
        write!(out, "{result}")?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn expect_test(args: ExpectTestArgs, cancel: CancellationToken) -> Result<ExitCode, ApitestError> {
    let suite = ExpectationSuite::load(&args.filepath).await?;

    // Expectations run side by side, so size the pool for the widest load run.
    let widest = suite
        .expects
        .iter()
        .filter_map(|e| e.performance_test.as_ref())
        .map(|p| p.concurrency)
        .max()
        .unwrap_or(1);
    let client = HttpClient::builder()
        .timeout(Duration::from_secs(args.timeout))
        .pool_max_idle_per_host(widest.max(default_concurrency() as usize))
        .build()?;

    let evaluator = Evaluator::new(Arc::new(client)).with_cancellation(cancel);
    let reports = evaluator.evaluate_all(&suite).await?;
    let failed = reports.iter().filter(|r| !r.success()).count();
    tracing::info!(total = reports.len(), failed, "expectation suite finished");

    let mut out = std::io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &reports)?;
        writeln!(out)?;
    } else {
        for report in &reports {
            write!(out, "{report}")?;
        }
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
