//! HGTM experiment CLI.
//!
//! Commands:
//! - run: Run the migration pipeline on one generated or loaded scenario
//! - trials: Repeat runs over seeds and leader scorings, then summarize
//! - generate: Generate a scenario and print its statistics

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use hgtm_experiment::experiment::{ExperimentRunner, ExperimentRunnerConfig};
use hgtm_experiment::generator::ScenarioSize;
use hgtm_experiment::results::{format_duration, timestamped_path, RunReport};
use hgtm_kernel::{Evaluator, Initializer, LeaderScoring, Scenario};

#[derive(Parser)]
#[command(name = "hgtm")]
#[command(version)]
#[command(about = "Hierarchical group task migration experiments")]
struct Cli {
    /// Runner configuration file (JSON with `migration` and `generator` sections)
    #[arg(long, env = "HGTM_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Values that override the configuration file.
#[derive(Args, Clone, Debug)]
struct Overrides {
    /// Scenario size preset: small, medium, large
    #[arg(long)]
    size: Option<String>,

    /// Cost weight `a`
    #[arg(long)]
    cost_weight: Option<f64>,

    /// Survivability weight `b`
    #[arg(long)]
    survival_weight: Option<f64>,

    /// Fraction of agents marked faulty
    #[arg(long)]
    fault_fraction: Option<f64>,

    /// Leader scoring: additive, multiplicative
    #[arg(long)]
    scoring: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single experiment
    Run {
        /// Load the scenario from a JSON file instead of generating it
        #[arg(long)]
        scenario: Option<PathBuf>,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output file for the run report
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Run repeated trials for each leader scoring
    Trials {
        /// Number of trials per scoring
        #[arg(long, default_value = "10")]
        trials: usize,

        /// Seed of the first trial; later trials count up from it
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Output file for results
        #[arg(long, default_value = "trials.json")]
        output: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Generate and display a scenario
    Generate {
        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Write the scenario JSON here
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let base = match &cli.config {
        Some(path) => ExperimentRunnerConfig::load(path)?,
        None => ExperimentRunnerConfig::default(),
    };

    match cli.command {
        Commands::Run {
            scenario,
            seed,
            output,
            overrides,
        } => {
            let runner = ExperimentRunner::new(apply_overrides(base, &overrides)?)?;
            let report = match scenario {
                Some(path) => {
                    let json = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading scenario {}", path.display()))?;
                    runner.run_scenario(0, seed, Scenario::from_json(&json)?)?
                }
                None => runner.run(0, seed)?,
            };

            print_report(&report);

            if let Some(output) = output {
                let output_path = timestamped_path(&output);
                report.save(&output_path)?;
                println!("\nReport saved to: {}", output_path.display());
            }
        }

        Commands::Trials {
            trials,
            seed,
            output,
            overrides,
        } => {
            let scorings = match &overrides.scoring {
                Some(name) => vec![parse_scoring(name)?],
                None => vec![LeaderScoring::Additive, LeaderScoring::Multiplicative],
            };
            let runner = ExperimentRunner::new(apply_overrides(base, &overrides)?)?;
            info!(trials, seed, scorings = scorings.len(), "Starting trials");

            let results = runner.run_trials(trials, seed, &scorings)?;
            let output_path = timestamped_path(&output);
            results.save(&output_path)?;

            println!("\n=== Trials Complete ===");
            println!("Results saved to: {}", output_path.display());
            println!("\nSummary:");
            for (key, summary) in &results.summary {
                println!(
                    "  {}: execution={:.3}±{:.3}, migration={:.3}±{:.3}, survival={:.3}±{:.3}, \
                     migrations={:.1}, leaderless_runs={}",
                    key,
                    summary.mean_execution_cost,
                    summary.execution_cost_se,
                    summary.mean_migration_cost,
                    summary.migration_cost_se,
                    summary.mean_survival_rate,
                    summary.survival_rate_se,
                    summary.mean_migrations,
                    summary.leaderless_runs
                );
            }
        }

        Commands::Generate {
            seed,
            output,
            overrides,
        } => {
            let runner = ExperimentRunner::new(apply_overrides(base, &overrides)?)?;
            let scenario = runner.generate(seed);

            let ctx = Initializer::new(runner.config().migration.clone()).run(scenario.clone())?;
            let stats = Evaluator::scenario_stats(&ctx);

            println!("Generated scenario (seed={}):", seed);
            println!("  Agents: {} in {} groups", stats.agents, stats.groups);
            println!("  Edges: {}", scenario.edges.len());
            println!("  Tasks: {}", stats.tasks);
            println!(
                "  Capacity: mean={:.2}, std={:.2}",
                stats.mean_capacity, stats.std_capacity
            );
            println!(
                "  Task size: mean={:.2}, std={:.2}",
                stats.mean_task_size, stats.std_task_size
            );
            println!("  Faulty agents: {}", ctx.faulty_agents().len());

            if let Some(output) = output {
                std::fs::write(&output, scenario.to_json())?;
                println!("\nScenario saved to: {}", output.display());
            }
        }
    }

    Ok(())
}

fn apply_overrides(
    mut config: ExperimentRunnerConfig,
    overrides: &Overrides,
) -> Result<ExperimentRunnerConfig> {
    if let Some(size) = &overrides.size {
        config.generator = parse_size(size)?.config();
    }
    if let Some(a) = overrides.cost_weight {
        config.migration.weights.a = a;
    }
    if let Some(b) = overrides.survival_weight {
        config.migration.weights.b = b;
    }
    if let Some(fraction) = overrides.fault_fraction {
        config.migration.fault_fraction = fraction;
    }
    if let Some(scoring) = &overrides.scoring {
        config.migration.leader_scoring = parse_scoring(scoring)?;
    }
    Ok(config)
}

fn print_report(report: &RunReport) {
    println!("\n=== Run Result ===");
    println!("Run: {}", report.run_id);
    println!(
        "Scenario: {} agents, {} groups, {} tasks",
        report.stats.agents, report.stats.groups, report.stats.tasks
    );
    println!("Seed: {}", report.config.seed);
    println!("Duration: {}", format_duration(report.duration_ms));

    println!("\nMetrics:");
    println!("  Execution cost: {:.4}", report.metrics.execution_cost);
    println!("  Migration cost: {:.4}", report.metrics.migration_cost);
    println!("  Survival rate: {:.4}", report.metrics.survival_rate);

    println!("\nMigrations: {}", report.records.len());
    for record in report.records.iter().take(20) {
        println!("  task {:>4}: {:>4} -> {:>4}", record.task, record.from, record.to);
    }
    if report.records.len() > 20 {
        println!("  ... {} more", report.records.len() - 20);
    }

    if !report.failovers.is_empty() {
        println!("\nFailovers:");
        for event in &report.failovers {
            match event.promoted {
                Some(promoted) => println!(
                    "  Group {}: {} -> {}",
                    event.group, event.previous, promoted
                ),
                None => println!("  Group {}: {} -> (none)", event.group, event.previous),
            }
        }
    }
    if !report.leaderless_groups.is_empty() {
        println!("\nLeaderless groups: {:?}", report.leaderless_groups);
    }
    if !report.stalled_agents.is_empty() {
        println!("Stalled agents: {:?}", report.stalled_agents);
    }
}

fn parse_size(s: &str) -> Result<ScenarioSize> {
    match s.to_lowercase().as_str() {
        "small" => Ok(ScenarioSize::Small),
        "medium" => Ok(ScenarioSize::Medium),
        "large" => Ok(ScenarioSize::Large),
        _ => bail!("Unknown size: {}. Valid: small, medium, large", s),
    }
}

fn parse_scoring(s: &str) -> Result<LeaderScoring> {
    match s.to_lowercase().as_str() {
        "additive" => Ok(LeaderScoring::Additive),
        "multiplicative" => Ok(LeaderScoring::Multiplicative),
        _ => bail!("Unknown scoring: {}. Valid: additive, multiplicative", s),
    }
}
