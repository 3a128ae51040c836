use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use skillhub_core::bootstrap::{Jobs, Stores, build_scheduler, build_service};
use skillhub_core::{BackfillService, Config, Identity, RunRequest, ScheduleRequest};
use skillhub_gateway::GatewayServer;
use skillhub_scheduler::JobQueue;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "skillhub", version, about = "Skill registry maintenance: summary and fingerprint backfills")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(
        long,
        global = true,
        env = "SKILLHUB_CONFIG",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler and the HTTP gateway until interrupted
    Serve,
    /// Run a backfill now and print its stats as JSON
    Run {
        #[arg(value_enum)]
        job: JobName,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        batch_size: Option<u32>,
        #[arg(long)]
        max_batches: Option<u32>,
    },
    /// Queue a backfill for the scheduler and print the job id
    Schedule {
        #[arg(value_enum)]
        job: JobName,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum JobName {
    Summaries,
    Fingerprints,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    init_subscriber(&config.log.filter);
    config.validate()?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Run {
            job,
            dry_run,
            batch_size,
            max_batches,
        } => {
            let service = local_service(&config).await?;
            let request = RunRequest {
                dry_run: Some(dry_run),
                batch_size: batch_size.map(f64::from),
                max_batches: max_batches.map(f64::from),
            };
            let caller = Identity::system();
            let output = match job {
                JobName::Summaries => serde_json::to_string_pretty(
                    &service.run_summary_backfill(Some(&caller), request).await?,
                )?,
                JobName::Fingerprints => serde_json::to_string_pretty(
                    &service.run_fingerprint_backfill(Some(&caller), request).await?,
                )?,
            };
            println!("{output}");
            Ok(())
        }
        Command::Schedule { job, dry_run } => {
            let service = local_service(&config).await?;
            let request = ScheduleRequest {
                dry_run: Some(dry_run),
            };
            let caller = Identity::system();
            let response = match job {
                JobName::Summaries => {
                    service
                        .schedule_summary_backfill(Some(&caller), request)
                        .await?
                }
                JobName::Fingerprints => {
                    service
                        .schedule_fingerprint_backfill(Some(&caller), request)
                        .await?
                }
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}

/// Service for one-shot CLI commands; queued jobs are picked up by a running `serve`.
async fn local_service(config: &Config) -> anyhow::Result<BackfillService> {
    let stores = Stores::open(&config.store).await?;
    let jobs = Jobs::new(&stores);
    let queue = JobQueue::new(stores.jobs.clone());
    Ok(build_service(config, &jobs, queue))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let stores = Stores::open(&config.store).await?;
    let jobs = Jobs::new(&stores);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let mut handles = Vec::new();

    let queue = if config.scheduler.enabled {
        let mut scheduler =
            build_scheduler(&config.scheduler, &stores, &jobs, shutdown_rx.clone())?;
        scheduler
            .init()
            .await
            .context("failed to initialize scheduler")?;
        let queue = scheduler.queue();
        tracing::info!(
            tasks = config.scheduler.tasks.len(),
            poll_interval_secs = config.scheduler.poll_interval_secs,
            "scheduler started"
        );
        handles.push(tokio::spawn(async move { scheduler.run().await }));
        queue
    } else {
        tracing::info!("scheduler disabled, scheduled jobs stay queued");
        JobQueue::new(stores.jobs.clone())
    };

    let service = Arc::new(build_service(&config, &jobs, queue));

    if config.gateway.enabled {
        let gateway = GatewayServer::new(
            &config.gateway.bind,
            config.gateway.port,
            service,
            shutdown_rx.clone(),
        )
        .with_tokens(config.gateway.tokens.clone())
        .with_max_body_size(config.gateway.max_body_size);
        handles.push(tokio::spawn(async move {
            if let Err(e) = gateway.serve().await {
                tracing::error!("gateway error: {e}");
            }
        }));
    } else {
        tracing::info!("gateway disabled");
    }

    if handles.is_empty() {
        tracing::warn!("neither scheduler nor gateway is enabled, nothing to serve");
        return Ok(());
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("service task panicked: {e}");
        }
    }
    tracing::info!("skillhub stopped");
    Ok(())
}

fn init_subscriber(default_filter: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // Stdout carries command output.
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_flags() {
        let cli = Cli::try_parse_from([
            "skillhub",
            "run",
            "fingerprints",
            "--dry-run",
            "--batch-size",
            "10",
            "--max-batches",
            "3",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                job,
                dry_run,
                batch_size,
                max_batches,
            } => {
                assert_eq!(job, JobName::Fingerprints);
                assert!(dry_run);
                assert_eq!(batch_size, Some(10));
                assert_eq!(max_batches, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_schedule_with_global_config() {
        let cli = Cli::try_parse_from([
            "skillhub",
            "schedule",
            "summaries",
            "--config",
            "/etc/skillhub.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/skillhub.toml"));
        assert!(matches!(
            cli.command,
            Command::Schedule {
                job: JobName::Summaries,
                dry_run: false
            }
        ));
    }

    #[test]
    fn rejects_unknown_job() {
        assert!(Cli::try_parse_from(["skillhub", "run", "everything"]).is_err());
    }

    #[test]
    fn serve_takes_no_arguments() {
        let cli = Cli::try_parse_from(["skillhub", "serve"]).unwrap();
        assert!(matches!(cli.command, Command::Serve));
    }
}
