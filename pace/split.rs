//! Train/test partitioning and borrowed row subsets.
//!
//! A split is two ordered lists of row indices. Subsets never copy the dataset; they hold
//! a reference to it plus the indices they expose, so the dataset must outlive them.

use crate::data::Dataset;
use crate::numeric::inner_product;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SplitError {
    #[error("Training fraction must lie in [0, 1], got {0}.")]
    InvalidFraction(f64),
    #[error("Permutation has {found} entries, but the dataset has {expected} rows.")]
    PermutationLength { expected: usize, found: usize },
    #[error("Permutation is not a rearrangement of 0..{len}: index {index} is out of range or repeated.")]
    InvalidPermutation { index: usize, len: usize },
}

/// Returns a uniformly random permutation of `0..n`.
pub fn random_permutation<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    order
}

/// Disjoint training and testing row indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    training: Vec<usize>,
    testing: Vec<usize>,
}

impl TrainTestSplit {
    /// Positions `[0, floor(n·fraction))` of the permutation become the training rows and
    /// the remaining positions the testing rows, both in permutation order.
    pub fn from_permutation(
        n: usize,
        fraction: f64,
        permutation: &[usize],
    ) -> Result<Self, SplitError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(SplitError::InvalidFraction(fraction));
        }
        if permutation.len() != n {
            return Err(SplitError::PermutationLength {
                expected: n,
                found: permutation.len(),
            });
        }
        let mut seen = vec![false; n];
        for &index in permutation {
            if index >= n || seen[index] {
                return Err(SplitError::InvalidPermutation { index, len: n });
            }
            seen[index] = true;
        }

        let training_size = ((n as f64 * fraction).floor() as usize).min(n);
        let (training, testing) = permutation.split_at(training_size);
        Ok(Self {
            training: training.to_vec(),
            testing: testing.to_vec(),
        })
    }

    /// Splits `0..n` by `fraction` over a fresh random permutation.
    pub fn random<R: Rng + ?Sized>(
        n: usize,
        fraction: f64,
        rng: &mut R,
    ) -> Result<Self, SplitError> {
        let permutation = random_permutation(n, rng);
        Self::from_permutation(n, fraction, &permutation)
    }

    pub fn training(&self) -> &[usize] {
        &self.training
    }

    pub fn testing(&self) -> &[usize] {
        &self.testing
    }

    pub fn training_subset<'a>(&self, dataset: &'a Dataset) -> Subset<'a> {
        dataset.subset(&self.training)
    }

    pub fn testing_subset<'a>(&self, dataset: &'a Dataset) -> Subset<'a> {
        dataset.subset(&self.testing)
    }
}

/// An ordered selection of dataset rows, held by reference.
#[derive(Debug, Clone)]
pub struct Subset<'a> {
    dataset: &'a Dataset,
    indices: Vec<usize>,
}

impl<'a> Subset<'a> {
    pub(crate) fn new(dataset: &'a Dataset, indices: Vec<usize>) -> Self {
        assert!(
            indices.iter().all(|&i| i < dataset.num_rows()),
            "subset index out of range for a dataset of {} rows",
            dataset.num_rows()
        );
        Self { dataset, indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dataset row indices backing this subset, in subset order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn num_columns(&self) -> usize {
        self.dataset.num_columns()
    }

    /// The `i`-th design row of the subset (bias term first).
    pub fn row(&self, i: usize) -> ArrayView1<'a, f64> {
        self.dataset.x().index_axis_move(Axis(0), self.indices[i])
    }

    pub fn target(&self, i: usize) -> f64 {
        self.dataset.y()[self.indices[i]]
    }

    pub fn rows(&self) -> impl Iterator<Item = (ArrayView1<'a, f64>, f64)> + '_ {
        (0..self.len()).map(move |i| (self.row(i), self.target(i)))
    }

    /// A narrower subset. `local` indexes into this subset, not into the dataset.
    pub fn select(&self, local: &[usize]) -> Subset<'a> {
        Subset::new(
            self.dataset,
            local.iter().map(|&i| self.indices[i]).collect(),
        )
    }

    /// Copies the selected rows into owned matrices for fitting.
    pub fn to_matrices(&self) -> (Array2<f64>, Array1<f64>) {
        (
            self.dataset.x().select(Axis(0), &self.indices),
            self.targets(),
        )
    }

    pub fn targets(&self) -> Array1<f64> {
        self.dataset.y().select(Axis(0), &self.indices)
    }

    /// Raw scores `W·x` for every row.
    pub fn predictions(&self, weights: ArrayView1<f64>) -> Array1<f64> {
        self.rows().map(|(row, _)| inner_product(row, weights)).collect()
    }
}
