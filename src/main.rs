//! loadslave - prepares and funds load-test accounts
//!
//! Loads the configuration, restores or generates the account group, funds
//! every valid account from the rich account and prints a summary with the
//! collected metrics. Any fatal error exits with a non-zero status.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

use load_tester::account::Account;
use load_tester::config::LoadConfig;
use load_tester::funding::{prepare_accounts, FundingPlan, FundingSummary};
use load_tester::group::{
    AccountGroup, AccountPurpose, NoopUnlocker, PopulateRequest, ScenarioSet, SnapshotStore,
};
use load_tester::metrics::metrics;
use load_tester::observability::{init_tracing, RunId};
use load_tester::transport::{ClientPool, JsonRpcTransport, Transport};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Override the snapshot directory from the configuration
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Print Prometheus metrics after setup
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.json_logs)?;

    let run_id = RunId::new();
    run(args).instrument(info_span!("run", %run_id)).await
}

async fn run(args: Args) -> Result<()> {
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(path = %args.config.display(), "Loading configuration");

    let mut config = LoadConfig::from_file_with_env(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(dir) = args.snapshot_dir {
        config.accounts.snapshot_dir = dir;
    }
    config.validate().context("Invalid configuration")?;

    let chain = Arc::new(config.chain_config());
    let scenarios = ScenarioSet::new(config.scenarios.iter().copied());

    let endpoint = config.rpc.endpoint.clone();
    let timeout = std::time::Duration::from_millis(config.rpc.request_timeout_ms);
    let pool_endpoint = endpoint.clone();
    let pool = ClientPool::<JsonRpcTransport>::new(config.rpc.pool_capacity, move || {
        JsonRpcTransport::new(pool_endpoint.clone(), timeout)
    });
    let transport: Arc<dyn Transport> = Arc::new(pool.clone());
    info!(%endpoint, capacity = pool.capacity(), "RPC client pool ready");

    let request = PopulateRequest {
        counts: scenarios.purpose_counts(
            config.accounts.signed,
            config.accounts.unsigned,
            config.accounts.newly_created,
        ),
        scenarios: scenarios.clone(),
        endpoint,
        seed: config.accounts.seed,
    };
    let store = SnapshotStore::new(&config.accounts.snapshot_dir);
    let (mut group, outcome) =
        AccountGroup::populate_or_restore(Arc::clone(&chain), &request, &store, &NoopUnlocker)
            .await
            .context("Failed to prepare account group")?;
    info!(?outcome, accounts = group.total_count(), "Account group ready");

    let plan = FundingPlan::from_config(&config, &scenarios)?;
    let summary = if plan.charge_value.is_zero() {
        info!("Charge value is zero, skipping funding");
        FundingSummary::default()
    } else {
        let rich_key = config.rich_private_key()?;
        let rich = Arc::new(
            Account::import(0, rich_key, Arc::clone(&chain)).context("Invalid rich private key")?,
        );
        info!(address = %rich.address(), "Rich account loaded");

        prepare_accounts(&mut group, rich, Arc::clone(&transport), &plan)
            .await
            .context("Funding failed")?
    };

    for purpose in AccountPurpose::ALL {
        info!(list = purpose.name(), active = group.list(purpose).len(), "Active accounts");
    }
    let transfers: u64 = summary.reports.iter().map(|r| r.total_transfers()).sum();
    info!(
        funded = summary.funded_accounts,
        transfers,
        idle_clients = pool.idle_count(),
        "Setup complete"
    );

    if args.print_metrics {
        println!("{}", metrics().render()?);
    }
    pool.close();
    Ok(())
}
