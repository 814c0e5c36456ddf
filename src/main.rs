use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stateweave::engine::PlanExecutor;
use stateweave::providers::{InferenceStepRetriever, OpenAIProvider};
use stateweave::storage::{PostgresStore, Stores};
use stateweave::{Config, Plan};

#[derive(Parser)]
#[command(name = "stateweave")]
#[command(about = "Resumable multi-worker plan orchestration", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        #[arg(help = "Path to the plan document (JSON)")]
        plan: PathBuf,
        #[arg(long, help = "Optional TOML configuration file")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { plan, config } => run_plan(&plan, config.as_deref()).await?,
    }

    Ok(())
}

async fn run_plan(plan_path: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;
    let plan = Plan::from_file(plan_path)?;

    let stores = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::new(url).await?;
            store.run_migrations().await?;
            log::info!("Using PostgreSQL event store and task ledger");
            Stores::shared(Arc::new(store))
        }
        None => {
            log::warn!("No database configured; state is kept in memory and lost on exit");
            Stores::in_memory()
        }
    };

    let provider = Arc::new(OpenAIProvider::new(&config.inference)?);
    let steps = Arc::new(InferenceStepRetriever::new(provider.clone()));
    let executor = PlanExecutor::new(&config, stores, provider, steps);

    let deliverable = executor.execute(&plan).await?;
    println!("{}", deliverable);

    Ok(())
}
