//! Filament: on-policy training runs for tool-using agents.
//!
//! Subcommands:
//!
//! - `scenarios` -- List the registered scenarios
//! - `train`     -- Run episodes of a scenario against the preference learner
//! - `inspect`   -- Summarize a stored training result

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use filament::config::FilamentConfig;
use filament::learner::{FrozenLearner, PolicyLearner, PreferenceLearner};
use filament::scenario::builtin_registry;
use filament::store::ResultStore;
use filament::training::{RunManager, TrainingResult};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Filament: on-policy training orchestration for tool-using agents.
#[derive(Parser)]
#[command(name = "filament", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed for scenario episode sequencing.
    #[arg(long, global = true, default_value_t = 7)]
    seed: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered scenarios.
    Scenarios,

    /// Run a training run and store its result.
    Train {
        /// Scenario to train on.
        #[arg(long, default_value = "support-sim")]
        scenario: String,

        /// Number of episodes.
        #[arg(long, default_value_t = 32)]
        episodes: usize,

        /// Use the frozen baseline learner instead of the preference learner.
        #[arg(long, default_value_t = false)]
        frozen: bool,
    },

    /// Summarize a stored training result.
    Inspect {
        /// Run id of a stored result.
        run_id: String,
    },
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config from {}", path.display()))?;
            serde_json::from_str::<FilamentConfig>(&text)
                .with_context(|| format!("failed to parse config from {}", path.display()))?
        }
        None => FilamentConfig::default(),
    };

    match cli.command {
        Commands::Scenarios => cmd_scenarios(cli.seed),
        Commands::Train {
            scenario,
            episodes,
            frozen,
        } => cmd_train(&config, cli.seed, &scenario, episodes, frozen).await,
        Commands::Inspect { run_id } => cmd_inspect(&config, &run_id),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_scenarios(seed: u64) -> Result<()> {
    let registry = builtin_registry(seed)?;
    println!("Registered scenarios:");
    for name in registry.list() {
        let scenario = registry.get(&name)?;
        println!("  {name} (v{})", scenario.version());
        for (component, trainable) in scenario.trainable_components().iter() {
            let status = if trainable { "trainable" } else { "frozen" };
            println!("    {component}: {status}");
        }
    }
    Ok(())
}

async fn cmd_train(
    config: &FilamentConfig,
    seed: u64,
    scenario: &str,
    episodes: usize,
    frozen: bool,
) -> Result<()> {
    let registry = Arc::new(builtin_registry(seed)?);
    let manager = RunManager::new(registry, config.orchestrator.clone());

    let learner: Box<dyn PolicyLearner> = if frozen {
        Box::new(FrozenLearner::new())
    } else {
        Box::new(PreferenceLearner::new(&config.learner))
    };

    let handle = manager.start_run(scenario, episodes, learner)?;
    tracing::info!(run = %handle, scenario, episodes, "run started, ctrl-c cancels");

    // Let ctrl-c cancel the run cleanly instead of killing the process. The
    // join future is pinned so it can be resumed after the cancellation.
    let join_fut = manager.join(&handle);
    tokio::pin!(join_fut);
    let result = tokio::select! {
        result = &mut join_fut => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(run = %handle, "interrupt received, cancelling run");
            manager.cancel(&handle)?;
            join_fut.await?
        }
    };

    let store = ResultStore::new(&config.store.results_dir);
    let path = store.save(&result)?;

    print_summary(&result);
    println!("Result stored at {}", path.display());
    Ok(())
}

fn cmd_inspect(config: &FilamentConfig, run_id: &str) -> Result<()> {
    let store = ResultStore::new(&config.store.results_dir);
    let result = store.load(run_id)?;
    print_summary(&result);

    println!();
    println!("Episodes:");
    for record in &result.episodes {
        let outcome = record
            .outcome
            .score()
            .map(|s| format!("{s:.2}"))
            .unwrap_or_else(|| "undefined".to_string());
        let fault = record
            .fault
            .as_ref()
            .map(|f| format!(" [{f}]"))
            .unwrap_or_default();
        println!(
            "  #{:<4} outcome={outcome} steps={} duration={}ms{fault}",
            record.index, record.steps, record.duration_ms
        );
    }
    Ok(())
}

fn print_summary(result: &TrainingResult) {
    println!("Run {}", result.run_id);
    println!("  Scenario:    {} (v{})", result.scenario, result.scenario_version);
    println!("  State:       {}", result.state);
    println!(
        "  Episodes:    {} of {} planned",
        result.episodes.len(),
        result.planned_episodes
    );
    if let Some(mean) = result.metrics.mean_outcome {
        println!("  Mean outcome: {mean:.3}");
    }
    if let Some(rate) = result.metrics.success_rate {
        println!("  Success rate: {:.1}%", rate * 100.0);
    }
    if let Some(trend) = result.metrics.trend {
        println!("  Trend:        {trend:+.4} per episode");
    }
    if result.metrics.episodes_excluded > 0 {
        println!(
            "  Excluded:     {} episodes without a defined outcome",
            result.metrics.episodes_excluded
        );
    }
    if let Some(artifact) = &result.artifact {
        println!("  Artifact:    {}", artifact.display());
    }
    if let Some(fault) = &result.fault {
        println!("  Fault:       {fault}");
    }
}
