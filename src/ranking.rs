//! Turns raw, unnormalized class scores into a ranked list of labelled
//! percentages.
//!
//! Everything here is a pure function of its arguments, so a single label
//! slice can be shared between any number of threads ranking their own score
//! vectors.

use std::cmp::Ordering;

use tracing::debug;

use crate::error::{Error, Result};

/// One entry of a ranked prediction list.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPrediction {
    /// Position of the class in the score vector and label catalog.
    pub index: usize,
    pub label: String,
    /// Softmax probability scaled to `[0, 100]`.
    pub probability: f32,
}

/// Softmax over `scores`, scaled to percentages.
///
/// The maximum score is subtracted before exponentiating so large logits do
/// not overflow. Accumulation happens in `f64`.
pub fn softmax_percent(scores: &[f32]) -> Result<Vec<f32>> {
    if scores.is_empty() {
        return Err(Error::invalid("score vector is empty"));
    }
    if let Some(i) = scores.iter().position(|s| !s.is_finite()) {
        return Err(Error::invalid(format!(
            "score at index {i} is not finite ({})",
            scores[i]
        )));
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = scores.iter().map(|&s| (s as f64 - max).exp()).collect();
    // at least one term is exp(0) = 1, so the sum is never zero
    let sum: f64 = exps.iter().sum();

    Ok(exps.iter().map(|e| (e / sum * 100.0) as f32).collect())
}

/// Ranks `scores` against `labels` and returns the `top_k` best classes,
/// most probable first.
///
/// Softmax is monotone, so classes are ordered on the raw scores; percentages
/// that underflow to the same `f32` still rank by their logits. Classes with
/// exactly equal scores keep their original index order.
pub fn rank<S: AsRef<str>>(
    scores: &[f32],
    labels: &[S],
    top_k: usize,
) -> Result<Vec<RankedPrediction>> {
    if scores.len() != labels.len() {
        return Err(Error::invalid(format!(
            "got {} scores for {} labels",
            scores.len(),
            labels.len()
        )));
    }
    if top_k == 0 || top_k > scores.len() {
        return Err(Error::invalid(format!(
            "top_k must be within 1..={}, got {top_k}",
            scores.len()
        )));
    }

    let probabilities = softmax_percent(scores)?;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    // sort_by is stable, which gives the index-order tie-break; scores are
    // finite here, and partial_cmp keeps -0.0 and 0.0 tied
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

    let ranked: Vec<RankedPrediction> = order
        .into_iter()
        .take(top_k)
        .map(|index| RankedPrediction {
            index,
            label: labels[index].as_ref().to_owned(),
            probability: probabilities[index],
        })
        .collect();

    debug!(classes = scores.len(), top_k, best = %ranked[0].label, "ranked scores");
    Ok(ranked)
}

/// The single most probable class.
pub fn top1<S: AsRef<str>>(scores: &[f32], labels: &[S]) -> Result<RankedPrediction> {
    let mut best = rank(scores, labels, 1)?;
    Ok(best.remove(0))
}
