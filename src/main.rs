//! tool-meister-start - bring up the telemetry-collection fleet
//!
//! Starts the coordination bus, data sink, and per-host tool meisters for
//! one tool group, waits until every agent has registered, and exits leaving
//! the fleet running for the downstream benchmark steps.

use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::time::Duration;

use tool_meister_start::config::{CliArgs, CoordinatorConfig, BUS_PORT, LOOPBACK_HOST};
use tool_meister_start::coordinator::{StartCoordinator, StartPhase, StartProgress};
use tool_meister_start::toolgroup::ToolGroup;

/// Environment escape raising the coordinator's log level to debug
const LOG_LEVEL_VAR: &str = "_PBENCH_TOOL_MEISTER_START_LOG_LEVEL";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging
    let debug = args.verbose || env::var(LOG_LEVEL_VAR).as_deref() == Ok("debug");
    let directive = if debug {
        "tool_meister_start=debug"
    } else {
        "tool_meister_start=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Resolve configuration and the tool group; both are fatal before the
    // bus exists, so plain nonzero exit with no rollback.
    let config = CoordinatorConfig::from_env(&args.group)?;
    let toolgroup = ToolGroup::load(&args.group, &config.pbench_run)?;

    if !args.quiet {
        println!(
            "{} Tool group {} on {} host(s), {} tool(s)",
            style("[Start]").cyan().bold(),
            style(&config.group).green(),
            style(toolgroup.host_count()).yellow(),
            style(toolgroup.tool_count()).yellow(),
        );
        println!(
            "  Run directory: {}",
            style(config.benchmark_run_dir.display()).yellow()
        );
        println!(
            "  Bus: {}",
            style(format!("{}:{}", LOOPBACK_HOST, BUS_PORT)).dim()
        );
        if let Some(trigger) = &toolgroup.trigger {
            println!("  Trigger: {}", style(trigger.trim_end()).dim());
        }
        println!();
    }

    // Create progress spinner
    let pb = if !args.quiet {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    // Run the start sequence
    let coordinator = StartCoordinator::new(config, toolgroup);
    let pb_clone = pb.clone();
    let result = coordinator
        .run(move |progress: StartProgress| {
            if let Some(ref pb) = pb_clone {
                if progress.phase == StartPhase::Rendezvous {
                    pb.set_message(format!(
                        "{} ({}/{} registered)",
                        progress.phase, progress.registered, progress.expected
                    ));
                } else {
                    pb.set_message(progress.phase.to_string());
                }
            }
        })
        .await;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    match result {
        Ok(report) => {
            if !args.quiet {
                println!("{}", style("Start Complete").green().bold());
                println!(
                    "  Sink: {} (pid {})",
                    style(report.registry.sink.hostname()).cyan(),
                    report.registry.sink.pid()
                );
                for meister in &report.registry.meister {
                    println!(
                        "  Meister: {} (pid {})",
                        style(meister.hostname()).cyan(),
                        meister.pid()
                    );
                }
                println!(
                    "  Parameter records seeded: {}",
                    style(report.seeded_keys.len()).dim()
                );
            }
            Ok(())
        }
        Err(aborted) => {
            eprintln!(
                "{} {} (rollback: {:?})",
                style("Error:").red().bold(),
                aborted.cause,
                aborted.teardown
            );
            std::process::exit(aborted.exit_code());
        }
    }
}
