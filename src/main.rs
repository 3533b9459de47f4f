use achgate::application::Environment;
use achgate::application::coordinator::{Coordinator, CoordinatorOptions};
use achgate::application::merge::DEFAULT_LINE_LIMIT;
use achgate::application::metrics::Metrics;
use achgate::application::upload::DEFAULT_CUTOFF_DELTA_MINUTES;
use achgate::infrastructure::in_memory::{
    InMemoryDepositoryRepo, InMemoryLedger, InMemoryMicroDepositRepo, InMemoryTransferRepo,
};
use achgate::infrastructure::local_agent::LocalAgentFactory;
use achgate::infrastructure::static_store::StaticConfigStore;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file holding transfer configs, cutoff times, and credentials.
    #[arg(long)]
    config: PathBuf,

    /// Directory holding merged/ and scratch state.
    #[arg(long, default_value = "./storage")]
    root: PathBuf,

    /// Directory standing in for remote institution trees (local agent).
    #[arg(long, default_value = "./remote")]
    remote_root: PathBuf,

    /// Seconds between scheduled cycles.
    #[arg(long, default_value_t = 600)]
    interval_secs: u64,

    /// Minutes before a cutoff during which its files upload.
    #[arg(long, default_value_t = DEFAULT_CUTOFF_DELTA_MINUTES)]
    cutoff_delta_mins: i64,

    /// Hard ceiling on lines per merged file.
    #[arg(long, default_value_t = DEFAULT_LINE_LIMIT)]
    line_limit: usize,

    /// Apply NOC field updates instead of rejecting depositories outright.
    #[arg(long)]
    update_policy: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let config = StaticConfigStore::from_file(&cli.config).into_diagnostic()?;
    let metrics = Arc::new(Metrics::new());
    let env = Arc::new(Environment {
        config: Box::new(config),
        depositories: Box::new(InMemoryDepositoryRepo::new()),
        transfers: Box::new(InMemoryTransferRepo::new()),
        micro_deposits: Box::new(InMemoryMicroDepositRepo::new()),
        ledger: Box::new(InMemoryLedger::new()),
        agents: Box::new(LocalAgentFactory::new(cli.remote_root)),
        metrics: metrics.clone(),
    });

    let (coordinator, controller) = Coordinator::new(
        env,
        CoordinatorOptions {
            root: cli.root,
            interval: Duration::from_secs(cli.interval_secs),
            cutoff_delta: chrono::Duration::minutes(cli.cutoff_delta_mins),
            line_limit: cli.line_limit,
            update_policy: cli.update_policy,
        },
    )
    .into_diagnostic()?;

    let handle = tokio::spawn(coordinator.run());
    tokio::signal::ctrl_c().await.into_diagnostic()?;
    controller.shutdown();
    handle.await.into_diagnostic()?;

    for ((counter, routing), value) in metrics.snapshot() {
        info!(?counter, routing, value, "final counter");
    }
    Ok(())
}
