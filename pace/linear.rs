//! Self-paced linear regression.
//!
//! The curriculum starts from a closed-form fit on every training row, then repeatedly
//! keeps only the rows that lie close to the current hyperplane and refits on them. Within a
//! round the keep-and-refit step is iterated until the weights stop moving; between rounds
//! the admission distance grows, so harder rows are let in gradually. Training ends once a
//! large enough share of the training set is in use.

use crate::config::LinearConfig;
use crate::data::{DataError, Dataset, load_dataset};
use crate::estimate::{EstimationError, fit_least_squares};
use crate::numeric::{
    approx_equal, inner_product, max_abs_difference, mean_absolute_error, root_mean_squared_error,
};
use crate::split::{SplitError, Subset, TrainTestSplit};
use ndarray::{Array1, ArrayView1};
use rand::Rng;
use std::path::Path;

/// Positions (within `rows`) whose absolute residual `|W·x − y|` is strictly below
/// `threshold`, in row order.
pub fn select_close(rows: &Subset<'_>, weights: ArrayView1<f64>, threshold: f64) -> Vec<usize> {
    let selected: Vec<usize> = rows
        .rows()
        .enumerate()
        .filter(|(_, (x, y))| (inner_product(*x, weights) - y).abs() < threshold)
        .map(|(i, _)| i)
        .collect();
    log::debug!(
        "{} instances are within {:.4} of the hyperplane.",
        selected.len(),
        threshold
    );
    selected
}

/// One outer round of the linear curriculum.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRound {
    pub threshold: f64,
    /// Rows admitted by the last selection of the round.
    pub admitted: usize,
    /// Number of refits performed. Zero means the round was skipped.
    pub refits: usize,
    /// Whether two consecutive refits agreed within the convergence tolerance.
    pub converged: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearTrainingReport {
    pub training_rows: usize,
    pub baseline_mae: f64,
    pub baseline_rmse: f64,
    pub rounds: Vec<LinearRound>,
}

impl LinearTrainingReport {
    /// Threshold of the last round that ran, if any.
    pub fn final_threshold(&self) -> Option<f64> {
        self.rounds.last().map(|r| r.threshold)
    }

    pub fn final_admitted(&self) -> Option<usize> {
        self.rounds.last().map(|r| r.admitted)
    }
}

/// Select-and-refit at a fixed threshold until the weights reach a fixed point, the
/// iteration bound is hit, or too few rows are admitted to determine the weights.
fn refit_until_stable(
    training: &Subset<'_>,
    weights: &mut Array1<f64>,
    threshold: f64,
    config: &LinearConfig,
) -> Result<LinearRound, EstimationError> {
    let mut round = LinearRound {
        threshold,
        admitted: 0,
        refits: 0,
        converged: false,
    };

    while round.refits < config.max_inner_iterations {
        let admitted = select_close(training, weights.view(), threshold);
        round.admitted = admitted.len();
        if admitted.len() < training.num_columns() {
            log::warn!(
                "Only {} rows lie within {:.4} of the hyperplane; {} are needed to refit. Keeping the current weights.",
                admitted.len(),
                threshold,
                training.num_columns()
            );
            return Ok(round);
        }

        let (x, y) = training.select(&admitted).to_matrices();
        let refit = fit_least_squares(x.view(), y.view())?;
        round.refits += 1;
        round.converged = approx_equal(refit.view(), weights.view(), config.convergence_tolerance);
        log::trace!(
            "Refit {} at threshold {:.4}: largest weight shift {:.3e}",
            round.refits,
            threshold,
            max_abs_difference(refit.view(), weights.view())
        );
        *weights = refit;
        if round.converged {
            return Ok(round);
        }
    }

    if config.max_inner_iterations > 1 {
        log::warn!(
            "Weights did not settle within {} refits at threshold {:.4}; continuing with the last fit.",
            config.max_inner_iterations,
            threshold
        );
    }
    Ok(round)
}

/// Linear regressor trained with a growing-threshold curriculum.
#[derive(Debug, Clone)]
pub struct SelfPacedLinearRegressor {
    dataset: Dataset,
    config: LinearConfig,
    split: Option<TrainTestSplit>,
    weights: Option<Array1<f64>>,
    report: Option<LinearTrainingReport>,
}

impl SelfPacedLinearRegressor {
    pub fn new(dataset: Dataset, config: LinearConfig) -> Self {
        Self {
            dataset,
            config,
            split: None,
            weights: None,
            report: None,
        }
    }

    /// Loads the dataset at `path` with the default schedule.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DataError> {
        Ok(Self::new(load_dataset(path)?, LinearConfig::default()))
    }

    pub fn set_distance_thresholds(&mut self, initial: f64, increment: f64) {
        self.config.initial_threshold = initial;
        self.config.threshold_increment = increment;
    }

    pub fn config(&self) -> &LinearConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn split(&self) -> Option<&TrainTestSplit> {
        self.split.as_ref()
    }

    /// Draws a fresh random train/test split.
    pub fn randomize_training_testing<R: Rng + ?Sized>(
        &mut self,
        training_fraction: f64,
        rng: &mut R,
    ) -> Result<(), SplitError> {
        self.split = Some(TrainTestSplit::random(
            self.dataset.num_rows(),
            training_fraction,
            rng,
        )?);
        Ok(())
    }

    /// Splits by a caller-supplied permutation of the row indices.
    pub fn split_with_permutation(
        &mut self,
        training_fraction: f64,
        permutation: &[usize],
    ) -> Result<(), SplitError> {
        self.split = Some(TrainTestSplit::from_permutation(
            self.dataset.num_rows(),
            training_fraction,
            permutation,
        )?);
        Ok(())
    }

    /// Runs the curriculum and returns the final weights.
    pub fn train(&mut self) -> Result<Array1<f64>, EstimationError> {
        let split = self.split.as_ref().ok_or(EstimationError::MissingSplit)?;
        let config = &self.config;
        let training = split.training_subset(&self.dataset);
        let testing = split.testing_subset(&self.dataset);

        // Step 1. Hyperplane through every training row.
        log::info!(
            "Training ... the training set has {} instances.",
            training.len()
        );
        let (x, y) = training.to_matrices();
        let mut weights = fit_least_squares(x.view(), y.view())?;
        let predictions = testing.predictions(weights.view());
        let baseline_mae = mean_absolute_error(predictions.view(), testing.targets().view());
        let baseline_rmse = root_mean_squared_error(predictions.view(), testing.targets().view());
        log::info!(
            "With all training data the testing MAE is {:.6} and RMSE is {:.6}.",
            baseline_mae,
            baseline_rmse
        );

        // Step 2. Widen the admission distance round by round.
        let enough = training.len() as f64 * config.admitted_fraction;
        let mut threshold = config.initial_threshold;
        let mut rounds = Vec::with_capacity(config.max_rounds);
        for _ in 0..config.max_rounds {
            let round = refit_until_stable(&training, &mut weights, threshold, config)?;
            let admitted = round.admitted;
            rounds.push(round);
            if admitted as f64 > enough {
                break;
            }
            threshold += config.threshold_increment;
        }

        let report = LinearTrainingReport {
            training_rows: training.len(),
            baseline_mae,
            baseline_rmse,
            rounds,
        };
        log::info!(
            "Finally, the threshold is {:.4} with {} neighbors after {} rounds.",
            report.final_threshold().unwrap_or(config.initial_threshold),
            report.final_admitted().unwrap_or(0),
            report.rounds.len()
        );

        self.weights = Some(weights.clone());
        self.report = Some(report);
        Ok(weights)
    }

    pub fn weights(&self) -> Option<ArrayView1<'_, f64>> {
        self.weights.as_ref().map(|w| w.view())
    }

    pub fn report(&self) -> Option<&LinearTrainingReport> {
        self.report.as_ref()
    }

    /// Prediction for one design row (bias term first).
    pub fn regress(&self, row: ArrayView1<f64>) -> Result<f64, EstimationError> {
        let weights = self.weights.as_ref().ok_or(EstimationError::NotTrained)?;
        if row.len() != weights.len() {
            return Err(EstimationError::DimensionMismatch(format!(
                "row has {} entries but the model has {} weights",
                row.len(),
                weights.len()
            )));
        }
        Ok(inner_product(row, weights.view()))
    }

    fn scored(&self, testing: bool) -> Result<(Array1<f64>, Array1<f64>), EstimationError> {
        let weights = self.weights.as_ref().ok_or(EstimationError::NotTrained)?;
        let split = self.split.as_ref().ok_or(EstimationError::MissingSplit)?;
        let rows = if testing {
            split.testing_subset(&self.dataset)
        } else {
            split.training_subset(&self.dataset)
        };
        Ok((rows.predictions(weights.view()), rows.targets()))
    }

    pub fn testing_mae(&self) -> Result<f64, EstimationError> {
        let (predicted, actual) = self.scored(true)?;
        Ok(mean_absolute_error(predicted.view(), actual.view()))
    }

    pub fn testing_rmse(&self) -> Result<f64, EstimationError> {
        let (predicted, actual) = self.scored(true)?;
        Ok(root_mean_squared_error(predicted.view(), actual.view()))
    }

    pub fn training_mae(&self) -> Result<f64, EstimationError> {
        let (predicted, actual) = self.scored(false)?;
        Ok(mean_absolute_error(predicted.view(), actual.view()))
    }
}
