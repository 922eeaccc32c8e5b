//! Self-paced learning with diversity (SPLD).
//!
//! Examples are ranked by loss inside their group, and the admission cutoff loosens with the
//! rank: rank `k` admits a loss below `lambda + gamma / (sqrt(k) + sqrt(k - 1))`. Easy
//! examples are therefore preferred, but every group contributes its easiest members before
//! any group contributes many.

use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SpldError {
    #[error("Got {losses} losses but {groups} group labels.")]
    LengthMismatch { losses: usize, groups: usize },
    #[error("Loss at index {index} is not finite ({value}).")]
    NonFiniteLoss { index: usize, value: f64 },
}

/// Result of one SPLD selection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SpldSelection {
    /// Admitted example indices in ascending order.
    pub admitted: Vec<usize>,
    /// `loss − cutoff(rank)` for every example; negative means admitted.
    pub scores: Vec<f64>,
}

/// Indices of `values` ordered by ascending value. Equal values keep their original order;
/// `-0.0` and `0.0` count as equal.
pub fn rank_ascending(values: &[f64]) -> Vec<usize> {
    (0..values.len())
        .sorted_by(|&a, &b| {
            values[a]
                .partial_cmp(&values[b])
                .unwrap_or(Ordering::Equal)
        })
        .collect()
}

/// Admission cutoff for the member at 1-based `rank` within its group.
pub fn spld_cutoff(lambda: f64, gamma: f64, rank: usize) -> f64 {
    assert!(rank >= 1, "ranks start at 1");
    let k = rank as f64;
    lambda + gamma / (k.sqrt() + (k - 1.0).sqrt())
}

/// Groups example indices by label, in ascending label order. Members keep index order.
fn group_members(groups: &[i64]) -> BTreeMap<i64, Vec<usize>> {
    let mut members: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (index, &label) in groups.iter().enumerate() {
        members.entry(label).or_default().push(index);
    }
    members
}

/// Ranks every example within its group and admits those under their rank's cutoff.
pub fn spld_select(
    losses: &[f64],
    groups: &[i64],
    lambda: f64,
    gamma: f64,
) -> Result<SpldSelection, SpldError> {
    if losses.len() != groups.len() {
        return Err(SpldError::LengthMismatch {
            losses: losses.len(),
            groups: groups.len(),
        });
    }
    if let Some((index, &value)) = losses.iter().find_position(|v| !v.is_finite()) {
        return Err(SpldError::NonFiniteLoss { index, value });
    }

    let mut scores = vec![0.0; losses.len()];
    let mut admitted = Vec::new();
    for (label, members) in group_members(groups) {
        let member_losses: Vec<f64> = members.iter().map(|&i| losses[i]).collect();
        for (position, local) in rank_ascending(&member_losses).into_iter().enumerate() {
            let index = members[local];
            let cutoff = spld_cutoff(lambda, gamma, position + 1);
            scores[index] = losses[index] - cutoff;
            if losses[index] < cutoff {
                admitted.push(index);
            }
        }
        log::trace!("Group {} has {} members.", label, members.len());
    }
    admitted.sort_unstable();

    log::debug!(
        "SPLD admitted {} of {} examples (lambda = {}, gamma = {}).",
        admitted.len(),
        losses.len(),
        lambda,
        gamma
    );
    Ok(SpldSelection { admitted, scores })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const TOY_GROUPS: [i64; 14] = [1, 1, 1, 1, 1, 1, 2, 2, 2, 3, 3, 3, 3, 4];
    const TOY_LOSSES: [f64; 14] = [
        0.05, 0.12, 0.12, 0.12, 0.15, 0.40, 0.17, 0.18, 0.35, 0.15, 0.16, 0.20, 0.50, 0.28,
    ];

    #[test]
    fn cutoff_shrinks_with_rank() {
        assert_abs_diff_eq!(spld_cutoff(0.05, 0.2, 1), 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(spld_cutoff(0.05, 0.2, 2), 0.132_842_712, epsilon = 1e-9);
        assert_abs_diff_eq!(spld_cutoff(0.0, 0.285, 2), 0.118_050_865, epsilon = 1e-9);
        for k in 1..20 {
            assert!(spld_cutoff(0.05, 0.2, k + 1) < spld_cutoff(0.05, 0.2, k));
        }
    }

    #[test]
    fn ranking_is_stable_for_ties() {
        assert_eq!(rank_ascending(&[0.3, 0.1, 0.3, 0.1]), vec![1, 3, 0, 2]);
        assert!(rank_ascending(&[]).is_empty());
    }

    #[test]
    fn signed_zeros_tie_by_index() {
        assert_eq!(rank_ascending(&[0.0, -0.0]), vec![0, 1]);
        assert_eq!(rank_ascending(&[-0.0, 0.0]), vec![0, 1]);

        let selection = spld_select(&[0.0, -0.0], &[3, 3], 0.05, 0.2).unwrap();
        assert_abs_diff_eq!(selection.scores[0], -spld_cutoff(0.05, 0.2, 1), epsilon = 1e-12);
        assert_abs_diff_eq!(selection.scores[1], -spld_cutoff(0.05, 0.2, 2), epsilon = 1e-12);
        assert_eq!(selection.admitted, vec![0, 1]);
    }

    #[test]
    fn toy_example_with_default_leniency() {
        let selection = spld_select(&TOY_LOSSES, &TOY_GROUPS, 0.05, 0.2).unwrap();
        assert_eq!(selection.admitted, vec![0, 1, 6, 9]);
        assert_eq!(selection.scores.len(), 14);
        for (i, score) in selection.scores.iter().enumerate() {
            assert_eq!(*score < 0.0, selection.admitted.contains(&i), "index {}", i);
        }
        assert_abs_diff_eq!(selection.scores[0], 0.05 - 0.25, epsilon = 1e-12);
    }

    #[test]
    fn toy_example_with_diversity_only() {
        let selection = spld_select(&TOY_LOSSES, &TOY_GROUPS, 0.0, 0.285).unwrap();
        assert_eq!(selection.admitted, vec![0, 6, 9, 13]);
    }

    #[test]
    fn single_group_admits_leading_ranks() {
        let selection = spld_select(&[0.05, 0.12, 0.40], &[1, 1, 1], 0.05, 0.2).unwrap();
        assert_eq!(selection.admitted, vec![0, 1]);
    }

    #[test]
    fn equal_losses_favour_earlier_members() {
        let selection = spld_select(&[0.12, 0.12], &[7, 7], 0.0, 0.2).unwrap();
        assert_eq!(selection.admitted, vec![0]);
        assert_abs_diff_eq!(selection.scores[0], 0.12 - 0.2, epsilon = 1e-12);
    }

    #[test]
    fn sparse_and_negative_labels_form_their_own_groups() {
        // Each label has one member, so every loss is compared against the rank 1 cutoff.
        let selection = spld_select(&[0.1, 0.3, 0.2], &[-5, 100, 0], 0.0, 0.25).unwrap();
        assert_eq!(selection.admitted, vec![0, 2]);
    }

    #[test]
    fn invalid_inputs_are_reported() {
        assert_eq!(
            spld_select(&[0.1, 0.2], &[1], 0.0, 0.1),
            Err(SpldError::LengthMismatch {
                losses: 2,
                groups: 1
            })
        );
        assert!(matches!(
            spld_select(&[0.1, f64::NAN], &[1, 1], 0.0, 0.1),
            Err(SpldError::NonFiniteLoss { index: 1, .. })
        ));
        let empty = spld_select(&[], &[], 0.0, 0.1).unwrap();
        assert!(empty.admitted.is_empty());
    }
}
