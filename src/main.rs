//! Gateway API conformance runner

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gateway_conformance::catalog::builtin_registry;
use gateway_conformance::client::bootstrap;
use gateway_conformance::config::ConformanceArgs;
use gateway_conformance::suite::{ConformanceSuite, RunOptions};
use gateway_conformance::telemetry::{init_logging, LoggingConfig};

/// Exit status when a fatal error prevents the run from completing
const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = ConformanceArgs::parse();

    if let Err(e) = init_logging(LoggingConfig {
        debug: args.debug,
        json: args.json_logs,
    }) {
        eprintln!("{e}");
        return ExitCode::from(EXIT_FATAL);
    }

    match run(args).await {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "conformance run aborted");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Returns whether every resolved test passed or was skipped
async fn run(args: ConformanceArgs) -> anyhow::Result<bool> {
    let registry = builtin_registry().context("failed to build the test catalog")?;
    let settings = args.into_settings().context("invalid configuration")?;
    settings
        .validate(&registry)
        .context("invalid configuration")?;

    let client = bootstrap(settings.kubeconfig.as_deref())
        .await
        .context("failed to connect to the target cluster")?;

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling remaining tests");
            signal.cancel();
        }
    });

    let report_path = settings.report.clone();
    let options = RunOptions {
        client: Arc::new(client),
        gateway_class_name: settings.gateway_class,
        capabilities: settings.capabilities,
        exclusions: settings.exclusions,
        timeouts: settings.timeouts,
        debug: settings.debug,
        cleanup_base_resources: settings.cleanup_base_resources,
        run_test: settings.run_test,
    };

    let mut suite = ConformanceSuite::new(options, &registry)?.with_cancellation(cancel);
    let tests = suite.resolved_tests()?;
    info!(
        registered = registry.len(),
        resolved = tests.len(),
        "resolved conformance tests"
    );

    suite
        .setup()
        .await
        .context("failed to prepare base resources")?;
    let report = suite.run(&tests).await?;

    report.log_summary();
    if let Some(path) = report_path {
        report
            .write_json(&path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "wrote conformance report");
    }

    Ok(report.is_success())
}
