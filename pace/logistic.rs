//! Self-paced logistic regression.
//!
//! The admission rule here runs opposite to the linear curriculum: rows *far* from the
//! current hyperplane (raw score residual above the threshold) are refit on, and the
//! threshold shrinks every round. Any admitted row that the refit still misclassifies is
//! removed for the rest of the run. Removals are tracked by a [`RemovalMask`] that each call
//! to `train` creates afresh, so runs never share state.

use crate::config::LogisticConfig;
use crate::data::{DataError, Dataset, load_dataset};
use crate::estimate::{EstimationError, fit_gradient_ascent};
use crate::numeric::{hard_threshold, inner_product, which, zero_one_error};
use crate::split::{SplitError, Subset, TrainTestSplit};
use ndarray::{Array1, ArrayView1};
use rand::Rng;
use std::path::Path;

/// Per-run record of training rows that have been permanently excluded.
///
/// Flags only ever go from kept to removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalMask {
    removed: Vec<bool>,
}

impl RemovalMask {
    pub fn new(len: usize) -> Self {
        Self {
            removed: vec![false; len],
        }
    }

    pub fn len(&self) -> usize {
        self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }

    pub fn is_removed(&self, index: usize) -> bool {
        self.removed[index]
    }

    /// Marks `index` as removed. Returns `true` if it was not removed before.
    pub fn remove(&mut self, index: usize) -> bool {
        !std::mem::replace(&mut self.removed[index], true)
    }

    pub fn removed_count(&self) -> usize {
        self.removed.iter().filter(|&&r| r).count()
    }

    pub fn removed_indices(&self) -> Vec<usize> {
        which(&self.removed)
    }
}

/// Positions (within `rows`) that are not removed and whose residual `|W·x − y|` is
/// strictly above `threshold`, in row order.
pub fn select_far(
    rows: &Subset<'_>,
    weights: ArrayView1<f64>,
    threshold: f64,
    removal: &RemovalMask,
) -> Vec<usize> {
    assert_eq!(rows.len(), removal.len(), "removal mask does not match the rows");
    let selected: Vec<usize> = rows
        .rows()
        .enumerate()
        .filter(|(i, _)| !removal.is_removed(*i))
        .filter(|(_, (x, y))| (inner_product(*x, weights) - y).abs() > threshold)
        .map(|(i, _)| i)
        .collect();
    log::debug!(
        "{} instances are farther than {:.4} from the hyperplane.",
        selected.len(),
        threshold
    );
    selected
}

/// One round of the logistic curriculum.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRound {
    pub threshold: f64,
    pub admitted: usize,
    /// Rows removed during this round.
    pub newly_removed: usize,
    /// Rows removed so far in the run, this round included.
    pub removed_total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogisticTrainingReport {
    pub training_rows: usize,
    pub baseline_training_error: f64,
    pub baseline_testing_error: f64,
    pub final_training_error: f64,
    pub final_testing_error: f64,
    pub rounds: Vec<LogisticRound>,
    /// Removal state at the end of the run, indexed by training position.
    pub removal: RemovalMask,
}

fn classification_error(rows: &Subset<'_>, weights: ArrayView1<f64>) -> f64 {
    zero_one_error(rows.predictions(weights).view(), rows.targets().view())
}

/// Logistic regressor trained with a shrinking-threshold curriculum and permanent removal.
#[derive(Debug, Clone)]
pub struct SelfPacedLogisticRegressor {
    dataset: Dataset,
    config: LogisticConfig,
    split: Option<TrainTestSplit>,
    weights: Option<Array1<f64>>,
    report: Option<LogisticTrainingReport>,
}

impl SelfPacedLogisticRegressor {
    pub fn new(dataset: Dataset, config: LogisticConfig) -> Self {
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
        Ok(Self::new(load_dataset(path)?, LogisticConfig::default()))
    }

    pub fn set_distance_thresholds(&mut self, initial: f64, decrement: f64) {
        self.config.initial_threshold = initial;
        self.config.threshold_decrement = decrement;
    }

    pub fn config(&self) -> &LogisticConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn split(&self) -> Option<&TrainTestSplit> {
        self.split.as_ref()
    }

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
        let mut weights =
            fit_gradient_ascent(x.view(), y.view(), config.learning_rate, config.cycles)?;
        let baseline_training_error = classification_error(&training, weights.view());
        let baseline_testing_error = classification_error(&testing, weights.view());
        log::info!(
            "With all training data the training error is {:.4} and the testing error is {:.4}.",
            baseline_training_error,
            baseline_testing_error
        );

        // Step 2. Shrink the admission distance round by round.
        let mut removal = RemovalMask::new(training.len());
        let enough = training.len() as f64 * config.admitted_fraction;
        let mut threshold = config.initial_threshold;
        let mut rounds = Vec::new();
        for _ in 0..config.max_rounds {
            let admitted = select_far(&training, weights.view(), threshold, &removal);
            let mut newly_removed = 0;

            if admitted.is_empty() {
                log::warn!(
                    "No instances are farther than {:.4} from the hyperplane; keeping the current weights.",
                    threshold
                );
            } else {
                let chosen = training.select(&admitted);
                let (x, y) = chosen.to_matrices();
                weights =
                    fit_gradient_ascent(x.view(), y.view(), config.learning_rate, config.cycles)?;

                for (position, (row, label)) in admitted.iter().zip(chosen.rows()) {
                    let predicted = hard_threshold(inner_product(row, weights.view()));
                    if predicted != label && removal.remove(*position) {
                        log::debug!("Removing training instance {}", position);
                        newly_removed += 1;
                    }
                }
            }

            rounds.push(LogisticRound {
                threshold,
                admitted: admitted.len(),
                newly_removed,
                removed_total: removal.removed_count(),
            });

            if admitted.len() as f64 > enough {
                break;
            }
            threshold -= config.threshold_decrement;
            if threshold < config.min_threshold {
                break;
            }
        }

        let final_training_error = classification_error(&training, weights.view());
        let final_testing_error = classification_error(&testing, weights.view());
        log::info!(
            "Finally, the threshold is {:.4} with {} neighbors; {} instances were removed.",
            rounds.last().map_or(config.initial_threshold, |r| r.threshold),
            rounds.last().map_or(0, |r| r.admitted),
            removal.removed_count()
        );
        log::info!(
            "With selected data the training error is {:.4} and the testing error is {:.4}.",
            final_training_error,
            final_testing_error
        );

        self.report = Some(LogisticTrainingReport {
            training_rows: training.len(),
            baseline_training_error,
            baseline_testing_error,
            final_training_error,
            final_testing_error,
            rounds,
            removal,
        });
        self.weights = Some(weights.clone());
        Ok(weights)
    }

    pub fn weights(&self) -> Option<ArrayView1<'_, f64>> {
        self.weights.as_ref().map(|w| w.view())
    }

    pub fn report(&self) -> Option<&LogisticTrainingReport> {
        self.report.as_ref()
    }

    /// Raw score `W·x` for one design row (bias term first).
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

    /// Hard 0/1 class for one design row.
    pub fn classify(&self, row: ArrayView1<f64>) -> Result<f64, EstimationError> {
        self.regress(row).map(hard_threshold)
    }

    fn error_on(&self, testing: bool) -> Result<f64, EstimationError> {
        let weights = self.weights.as_ref().ok_or(EstimationError::NotTrained)?;
        let split = self.split.as_ref().ok_or(EstimationError::MissingSplit)?;
        let rows = if testing {
            split.testing_subset(&self.dataset)
        } else {
            split.training_subset(&self.dataset)
        };
        Ok(classification_error(&rows, weights.view()))
    }

    pub fn testing_error(&self) -> Result<f64, EstimationError> {
        self.error_on(true)
    }

    pub fn training_error(&self) -> Result<f64, EstimationError> {
        self.error_on(false)
    }
}
