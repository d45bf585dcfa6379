//! claw-logwatch - Clawbernetes pod log watcher
//!
//! `watch` polls pod logs in the configured namespaces and raises alerts;
//! `scan` checks one pod's recent log and exits.
//!
//! Exits with status 2 when the configuration or pattern document is
//! invalid, and 1 on any other failure.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use claw_logwatch::config::{Cli, Commands, LogFormat, ScanArgs, WatchArgs};
use claw_logwatch::{
    Monitor, MonitorTarget, ScanReport, SharedClock, SystemClock, WatchError, scan_pod,
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let result = match cli.command {
        Commands::Watch(args) => run_watch(args).await,
        Commands::Scan(args) => run_scan(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let fatal = e.downcast_ref::<WatchError>().is_some_and(WatchError::is_fatal);
            error!(fatal, "claw-logwatch failed: {e:#}");
            if fatal {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("claw_logwatch=info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn run_watch(args: WatchArgs) -> anyhow::Result<()> {
    let config = args.monitor_config()?;
    let patterns = args
        .load_patterns()
        .with_context(|| format!("failed to load patterns from {}", args.patterns_file.display()))?;
    let cluster = args
        .cluster
        .client()
        .context("failed to configure cluster client")?;

    let clock: SharedClock = Arc::new(SystemClock);
    let advisor = args.advisor(Arc::clone(&clock))?;

    info!(
        namespaces = ?config.namespaces,
        patterns = patterns.len(),
        poll_interval_secs = args.poll_interval_secs,
        since_seconds = args.since_seconds,
        alert_dedupe_secs = args.alert_dedupe_secs,
        llm_cooldown_secs = args.llm_cooldown_secs,
        advisories = advisor.is_some(),
        "starting claw-logwatch"
    );

    let mut monitor = Monitor::new(config, Arc::new(cluster), Arc::new(patterns), clock);
    if let Some(advisor) = advisor {
        monitor = monitor.with_advisor(advisor);
    }
    let monitor = Arc::new(monitor);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    monitor.run(shutdown_rx).await;
    Ok(())
}

async fn run_scan(args: ScanArgs) -> anyhow::Result<()> {
    let patterns = args
        .load_patterns()
        .with_context(|| format!("failed to load patterns from {}", args.patterns_file.display()))?;
    let cluster = args
        .cluster
        .client()
        .context("failed to configure cluster client")?;
    let advisor = args.advisor(Arc::new(SystemClock))?;

    let target = MonitorTarget::new(args.namespace.as_str(), args.pod.as_str());
    let report = scan_pod(&cluster, &patterns, &target, args.tail, advisor.as_ref())
        .await
        .with_context(|| format!("failed to scan {target}"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, advisor.is_some());
    }
    Ok(())
}

fn print_report(report: &ScanReport, advisories: bool) {
    println!(
        "Found {} error(s) matching known patterns in {} ({} lines scanned)",
        report.matches.len(),
        report.target,
        report.lines_scanned
    );
    for m in &report.matches {
        println!("[{}] {}", m.severity.label(), m.pattern_name);
        println!("  {}", m.line);
    }

    if report.is_clean() {
        return;
    }
    match &report.advisory {
        Some(advisory) => {
            println!();
            println!("Recommendations:");
            println!("{}", advisory.text);
            println!();
            println!(
                "Tokens: prompt {}, completion {}, total {} (estimated ${:.6})",
                advisory.usage.prompt_tokens,
                advisory.usage.completion_tokens,
                advisory.usage.total_tokens,
                advisory.cost_usd
            );
        }
        None if !advisories => {
            println!();
            println!("Set OPENAI_API_KEY to get recommendations");
        }
        None => {}
    }
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, initiating shutdown"),
        () = terminate => info!("received SIGTERM, initiating shutdown"),
    }
}
