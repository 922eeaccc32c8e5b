#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use std::process;

use pacer::config::{PacerConfig, load_config};
use pacer::data::load_dataset;
use pacer::linear::SelfPacedLinearRegressor;
use pacer::logistic::SelfPacedLogisticRegressor;
use pacer::spld::spld_select;

/// Options shared by both curriculum regressors.
#[derive(Args)]
pub struct RunArgs {
    /// Path to a CSV, TSV or ARFF dataset; the last column is the target
    #[arg(value_name = "DATA")]
    pub data: PathBuf,

    /// TOML file with [split], [linear], [logistic] and [spld] sections
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Fraction of rows used for training
    #[arg(long)]
    pub training_fraction: Option<f64>,

    /// Seed for the train/test permutation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Residual threshold used in the first round
    #[arg(long)]
    pub initial_threshold: Option<f64>,
}

#[derive(Args)]
pub struct LinearArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Amount added to the threshold after each round
    #[arg(long)]
    pub threshold_increment: Option<f64>,
}

#[derive(Args)]
pub struct LogisticArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Amount subtracted from the threshold after each round
    #[arg(long)]
    pub threshold_decrement: Option<f64>,
}

#[derive(Args)]
pub struct SpldArgs {
    /// Per-example losses, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
    pub losses: Vec<f64>,

    /// Per-example group labels, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
    pub groups: Vec<i64>,

    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long, allow_negative_numbers = true)]
    pub lambda: Option<f64>,

    #[arg(long)]
    pub gamma: Option<f64>,
}

#[derive(Parser)]
#[command(
    name = "pacer",
    about = "Self-paced curriculum training for regression models",
    long_about = "Trains linear and logistic regressors on a curriculum of training rows chosen \
                 by residual, and runs the group-diverse SPLD selection rule."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Self-paced linear regression with a growing residual threshold
    #[command(about = "Train a self-paced linear regressor and report testing MAE/RMSE")]
    Linear(LinearArgs),

    /// Self-paced logistic regression with a shrinking threshold and row removal
    #[command(about = "Train a self-paced logistic regressor and report 0/1 errors")]
    Logistic(LogisticArgs),

    /// Group-aware selection over precomputed losses
    #[command(about = "Run SPLD selection and print the admitted indices")]
    Spld(SpldArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Linear(args)) => run_linear(args),
        Some(Commands::Logistic(args)) => run_logistic(args),
        Some(Commands::Spld(args)) => run_spld(args),
        None => Cli::command().print_help().map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn read_config(path: Option<&Path>) -> Result<PacerConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            log::info!("Reading configuration from {}", path.display());
            Ok(load_config(path)?)
        }
        None => Ok(PacerConfig::default()),
    }
}

/// Applies the shared command-line overrides and seeds the rng used for the split.
fn prepare_run(run: &RunArgs) -> Result<(PacerConfig, StdRng), Box<dyn std::error::Error>> {
    let mut config = read_config(run.config.as_deref())?;
    if let Some(fraction) = run.training_fraction {
        config.split.training_fraction = fraction;
    }
    if let Some(seed) = run.seed {
        config.split.seed = Some(seed);
    }
    if let Some(initial) = run.initial_threshold {
        config.linear.initial_threshold = initial;
        config.logistic.initial_threshold = initial;
    }

    let seed = config.split.seed.unwrap_or_else(rand::random);
    log::info!("Splitting with seed {}", seed);
    Ok((config, StdRng::seed_from_u64(seed)))
}

fn run_linear(args: LinearArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (mut config, mut rng) = prepare_run(&args.run)?;
    if let Some(increment) = args.threshold_increment {
        config.linear.threshold_increment = increment;
    }
    config.validate()?;
    let fraction = config.split.training_fraction;

    let dataset = load_dataset(&args.run.data)?;
    let mut regressor = SelfPacedLinearRegressor::new(dataset, config.linear);
    regressor.randomize_training_testing(fraction, &mut rng)?;
    let weights = regressor.train()?;

    println!("weights: {weights}");
    println!("testing MAE: {:.6}", regressor.testing_mae()?);
    println!("testing RMSE: {:.6}", regressor.testing_rmse()?);
    if let Some(report) = regressor.report() {
        println!(
            "baseline testing MAE: {:.6}, RMSE: {:.6}",
            report.baseline_mae, report.baseline_rmse
        );
        for (i, round) in report.rounds.iter().enumerate() {
            println!(
                "round {}: threshold {:.4}, admitted {}, refits {}{}",
                i + 1,
                round.threshold,
                round.admitted,
                round.refits,
                if round.converged { "" } else { " (not converged)" }
            );
        }
    }
    Ok(())
}

fn run_logistic(args: LogisticArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (mut config, mut rng) = prepare_run(&args.run)?;
    if let Some(decrement) = args.threshold_decrement {
        config.logistic.threshold_decrement = decrement;
    }
    config.validate()?;
    let fraction = config.split.training_fraction;

    let dataset = load_dataset(&args.run.data)?;
    let mut regressor = SelfPacedLogisticRegressor::new(dataset, config.logistic);
    regressor.randomize_training_testing(fraction, &mut rng)?;
    let weights = regressor.train()?;

    println!("weights: {weights}");
    println!("training error: {:.6}", regressor.training_error()?);
    println!("testing error: {:.6}", regressor.testing_error()?);
    if let Some(report) = regressor.report() {
        println!(
            "baseline training error: {:.6}, testing error: {:.6}",
            report.baseline_training_error, report.baseline_testing_error
        );
        for (i, round) in report.rounds.iter().enumerate() {
            println!(
                "round {}: threshold {:.4}, admitted {}, removed {} (total {})",
                i + 1,
                round.threshold,
                round.admitted,
                round.newly_removed,
                round.removed_total
            );
        }
    }
    Ok(())
}

fn run_spld(args: SpldArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = read_config(args.config.as_deref())?;
    if let Some(lambda) = args.lambda {
        config.spld.lambda = lambda;
    }
    if let Some(gamma) = args.gamma {
        config.spld.gamma = gamma;
    }
    config.spld.validate()?;

    let selection = spld_select(
        &args.losses,
        &args.groups,
        config.spld.lambda,
        config.spld.gamma,
    )?;
    let admitted: Vec<String> = selection.admitted.iter().map(|i| i.to_string()).collect();
    println!("admitted: [{}]", admitted.join(", "));
    for (i, score) in selection.scores.iter().enumerate() {
        println!("{i}\t{:.6}", score);
    }
    Ok(())
}
