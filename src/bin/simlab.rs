//! Simlab CLI Binary
//!
//! Command-line interface for tenant simulation lifecycle operations.

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use simlab::cluster::mock::MockClusterBackend;
use simlab::cluster::rest::RestClusterBackend;
use simlab::cluster::ClusterBackend;
use simlab::config::{BackendKind, Settings};
use simlab::dispatch::MetricMethod;
use simlab::logging::init_logging;
use simlab::orchestrator::SimulationOrchestrator;
use simlab::topology::Topology;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Simlab - simulation orchestration and communication-graph engine
#[derive(Parser)]
#[command(name = "simlab")]
#[command(about = "Provision, inspect, and kick simulated agent topologies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a topology from a JSON file
    Up {
        /// Path to the topology document
        #[arg(long)]
        topology: PathBuf,
    },
    /// Tear down a tenant's simulation
    Down {
        #[arg(long)]
        tenant: String,
    },
    /// Show a tenant's stored topology with refreshed instance handles
    Show {
        #[arg(long)]
        tenant: String,
    },
    /// Run a randomized traversal from an agent
    Kick {
        #[arg(long)]
        tenant: String,
        /// Agent to start the walk from
        #[arg(long)]
        agent: String,
        /// Maximum number of hops
        #[arg(long, default_value = "10")]
        steps: u32,
        /// RNG seed for a reproducible walk
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Create or modify a metric on one agent
    SetMetric {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        agent: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        value: i64,
        /// Create the metric instead of modifying an existing one
        #[arg(long)]
        create: bool,
    },
    /// Read a metric's current value from one agent
    GetMetric {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        agent: String,
        #[arg(long)]
        name: String,
    },
    /// Drop a tenant's communication graph
    ResetGraph {
        #[arg(long)]
        tenant: String,
    },
}

fn build_backend(settings: &Settings) -> anyhow::Result<Arc<dyn ClusterBackend>> {
    Ok(match settings.backend {
        BackendKind::Mock => Arc::new(MockClusterBackend::new()),
        BackendKind::Cluster => Arc::new(RestClusterBackend::new(&settings.cluster)?),
    })
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    init_logging(Some(&settings.logging)).context("initializing logging")?;

    let backend = build_backend(&settings)?;
    let orchestrator = SimulationOrchestrator::new(backend, &settings)?;

    match cli.command {
        Commands::Up { topology } => {
            let raw = std::fs::read_to_string(&topology)
                .with_context(|| format!("reading {}", topology.display()))?;
            let topology: Topology =
                serde_json::from_str(&raw).context("parsing topology document")?;
            let results = orchestrator.create_simulation(topology).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Down { tenant } => {
            orchestrator.delete_simulation(&tenant).await?;
            println!("simulation '{}' removed", tenant);
        }
        Commands::Show { tenant } => {
            let topology = orchestrator.get_simulation(&tenant).await?;
            println!("{}", serde_json::to_string_pretty(&topology)?);
        }
        Commands::Kick {
            tenant,
            agent,
            steps,
            seed,
        } => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let report = orchestrator.kick(&tenant, &agent, steps, &mut rng).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::SetMetric {
            tenant,
            agent,
            name,
            value,
            create,
        } => {
            let method = if create {
                MetricMethod::Post
            } else {
                MetricMethod::Put
            };
            orchestrator
                .set_metric(&tenant, &agent, method, &name, value)
                .await?;
            println!("metric '{}' set to {} on '{}'", name, value, agent);
        }
        Commands::GetMetric {
            tenant,
            agent,
            name,
        } => {
            let value = orchestrator.get_metric(&tenant, &agent, &name).await?;
            println!("{}", value);
        }
        Commands::ResetGraph { tenant } => {
            orchestrator.reset_graph(&tenant)?;
            println!("communication graph for '{}' cleared", tenant);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
