//! retrain CLI — drive a full training run over the built-in demo pipeline.

mod demo;

use anyhow::Context;
use clap::Parser;
use retrain_core::{
    DeviceId, LossKind, OptimKind, RunConfig, RunWorkspace, SeedManager, TrainingRun,
    init_run_logging,
};
use std::path::PathBuf;

/// Retrain: retrieval-augmented training with early stopping and
/// best-checkpoint retention.
#[derive(Parser, Debug)]
#[command(name = "retrain", version, about, long_about = None)]
struct Cli {
    /// Random seed for the run
    #[arg(long, default_value_t = 2024)]
    seed: u64,

    /// Device identifier handed to collaborators (e.g. cpu, cuda:0)
    #[arg(long, default_value = "cpu")]
    device: String,

    /// Metric label recorded in the run id (informational)
    #[arg(long, default_value = "mse")]
    metric: String,

    /// Folder receiving run directories
    #[arg(long, default_value = "./saved_models")]
    save: PathBuf,

    /// Maximum number of training epochs
    #[arg(long, default_value_t = 1000)]
    epochs: usize,

    /// Training batch size
    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    /// Non-improving epochs tolerated after the best before stopping
    #[arg(long, default_value_t = 10)]
    early_stop_turns: usize,

    /// Loss function: mse or bce
    #[arg(long, default_value = "mse")]
    loss: String,

    /// Optimizer: adam or sgd
    #[arg(long, default_value = "adam")]
    optim: String,

    /// Learning rate
    #[arg(long, default_value_t = 1e-4)]
    lr: f64,

    /// Learning-rate decay rate (recorded, not applied)
    #[arg(long, default_value_t = 1.0)]
    decay_rate: f64,

    /// Dataset identifier
    #[arg(long, default_value = "synthetic")]
    dataset_id: String,

    /// Dataset root path
    #[arg(long, default_value = "./datasets")]
    dataset_path: PathBuf,

    /// Number of retrieved neighbours per item
    #[arg(long, default_value_t = 500)]
    retrieval_num: usize,

    /// Model identifier
    #[arg(long, default_value = "linear")]
    model_id: String,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Build and validate the run configuration. Unknown loss or optimizer
    /// names fail here, before any run artifact exists.
    fn into_config(self) -> anyhow::Result<(RunConfig, u8)> {
        let loss: LossKind = self.loss.parse()?;
        let optim: OptimKind = self.optim.parse()?;
        let config = RunConfig {
            seed: self.seed,
            device: DeviceId::new(self.device),
            metric: self.metric,
            save_root: self.save,
            epochs: self.epochs,
            batch_size: self.batch_size,
            patience: self.early_stop_turns,
            loss,
            optim,
            lr: self.lr,
            decay_rate: self.decay_rate,
            dataset_id: self.dataset_id,
            dataset_path: self.dataset_path,
            retrieval_num: self.retrieval_num,
            model_id: self.model_id,
        };
        config.validate()?;
        Ok((config, self.verbose))
    }
}

fn main() -> anyhow::Result<()> {
    let (config, verbose) = Cli::parse().into_config()?;

    let workspace = RunWorkspace::create(&config).context("creating run workspace")?;
    let filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let _log_guard = init_run_logging(&workspace.log_path(), filter)?;

    // Seed everything before any collaborator is constructed.
    let mut seeds = SeedManager::new(config.seed);
    let dims = demo::FeatureDims::for_depth(config.retrieval_num);
    let mut data_rng = seeds.component_rng("dataset");
    let mut train_data = demo::generate(512, config.batch_size, &dims, &mut data_rng);
    let mut valid_data = demo::generate(128, config.batch_size, &dims, &mut data_rng);
    let (mut model, params) = demo::LinearModel::new(dims, &mut seeds.component_rng("model"));
    let mut criterion = demo::build_criterion(config.loss, &params);
    let mut optimizer = demo::build_optimizer(config.optim, config.lr, &params);

    let report = TrainingRun::new(
        &config,
        &workspace,
        &mut model,
        criterion.as_mut(),
        optimizer.as_mut(),
        &mut train_data,
        &mut valid_data,
    )
    .execute()?;

    println!(
        "best epoch {} (total valid loss {:.6}); artifacts in {}",
        report.best_epoch,
        report.best_valid_loss.unwrap_or(f64::NAN),
        workspace.run_dir().display()
    );
    Ok(())
}
