//! Pick the best trial.

use std::cmp::Ordering;

use crate::{errors::PipelineError, prelude::*, recognition::TrialResult};

/// Choose the trial with the highest mean line confidence.
///
/// Trials without lines never win. Exact ties go to the trial whose config
/// comes first in [`RecognitionConfig::ALL`], then to the one whose variant
/// comes first in [`VariantKind::ALL`]. We don't try to merge lines across
/// trials: one trial wins outright, which keeps the result reproducible.
///
/// [`RecognitionConfig::ALL`]: crate::recognition::RecognitionConfig::ALL
/// [`VariantKind::ALL`]: crate::preprocess::VariantKind::ALL
#[instrument(level = "debug", skip_all, fields(trials = trials.len()))]
pub fn select(trials: &[TrialResult]) -> Result<&TrialResult, PipelineError> {
    let winner = trials
        .iter()
        .filter(|trial| !trial.lines.is_empty())
        .min_by(|a, b| compare_trials(a, b))
        .ok_or(PipelineError::NoViableTrial {
            trial_count: trials.len(),
        })?;
    info!(
        trial = %winner.id,
        confidence = winner.mean_confidence(),
        lines = winner.lines.len(),
        "Selected best trial"
    );
    Ok(winner)
}

/// Order trials from best to worst.
fn compare_trials(a: &TrialResult, b: &TrialResult) -> Ordering {
    b.mean_confidence()
        .total_cmp(&a.mean_confidence())
        .then_with(|| a.id.priority().cmp(&b.id.priority()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        preprocess::VariantKind,
        recognition::{RecognitionConfig, RecognizedLine, TrialId},
    };

    fn trial(
        variant: VariantKind,
        config: RecognitionConfig,
        confidences: &[f32],
    ) -> TrialResult {
        TrialResult::new(
            TrialId { variant, config },
            confidences
                .iter()
                .enumerate()
                .map(|(i, &c)| RecognizedLine::new(format!("line {i}"), c))
                .collect(),
        )
    }

    #[test]
    fn highest_mean_confidence_wins() {
        let trials = [
            trial(VariantKind::Otsu, RecognitionConfig::UniformBlock, &[60.0, 70.0]),
            trial(VariantKind::Adaptive, RecognitionConfig::SparseOsd, &[90.0, 80.0]),
        ];
        let winner = select(&trials).unwrap();
        assert_eq!(winner.id.config, RecognitionConfig::SparseOsd);
    }

    #[test]
    fn ties_go_to_the_earlier_config() {
        let trials = [
            trial(VariantKind::Grayscale, RecognitionConfig::Sparse, &[80.0]),
            trial(VariantKind::Adaptive, RecognitionConfig::SingleColumn, &[80.0]),
            trial(VariantKind::Otsu, RecognitionConfig::Auto, &[80.0]),
        ];
        let winner = select(&trials).unwrap();
        assert_eq!(
            winner.id,
            TrialId {
                variant: VariantKind::Adaptive,
                config: RecognitionConfig::SingleColumn,
            }
        );
    }

    #[test]
    fn config_ties_go_to_the_earlier_variant() {
        let trials = [
            trial(VariantKind::Adaptive, RecognitionConfig::UniformBlock, &[75.0]),
            trial(VariantKind::Otsu, RecognitionConfig::UniformBlock, &[75.0]),
        ];
        assert_eq!(select(&trials).unwrap().id.variant, VariantKind::Otsu);
    }

    #[test]
    fn input_order_does_not_matter() {
        let mut trials = vec![
            trial(VariantKind::Adaptive, RecognitionConfig::UniformBlock, &[75.0]),
            trial(VariantKind::Otsu, RecognitionConfig::SingleColumn, &[75.0]),
            trial(VariantKind::Grayscale, RecognitionConfig::Auto, &[74.0]),
        ];
        let first = select(&trials).unwrap().id;
        trials.reverse();
        assert_eq!(select(&trials).unwrap().id, first);
    }

    #[test]
    fn empty_trials_always_lose() {
        let trials = [
            trial(VariantKind::Grayscale, RecognitionConfig::UniformBlock, &[]),
            trial(VariantKind::Adaptive, RecognitionConfig::SparseOsd, &[1.0]),
        ];
        assert_eq!(
            select(&trials).unwrap().id.config,
            RecognitionConfig::SparseOsd
        );
    }

    #[test]
    fn all_empty_trials_is_no_viable_trial() {
        let trials = [
            trial(VariantKind::Otsu, RecognitionConfig::UniformBlock, &[]),
            trial(VariantKind::Adaptive, RecognitionConfig::UniformBlock, &[]),
        ];
        let err = select(&trials).unwrap_err();
        assert!(matches!(err, PipelineError::NoViableTrial { trial_count: 2 }));
        assert!(matches!(
            select(&[]).unwrap_err(),
            PipelineError::NoViableTrial { trial_count: 0 }
        ));
    }
}
