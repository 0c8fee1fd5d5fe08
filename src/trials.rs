//! Run the grid of recognition trials.
//!
//! A trial pairs one [`ImageVariant`] with one [`RecognitionConfig`]. Trials
//! share nothing, so we run several at once. Results are put back into grid
//! order afterwards, so the amount of concurrency never changes the outcome.

use std::{collections::HashMap, sync::Arc};

use futures::{StreamExt as _, stream};
use indicatif::ProgressBar;

use crate::{
    async_utils::spawn_blocking_propagating_panics,
    diagnostics::DiagnosticSink,
    preprocess::{ImageVariant, VariantKind},
    prelude::*,
    recognition::{RecognitionConfig, RecognitionEngine, TrialId, TrialResult},
};

/// Should `config` be tried on `variant`?
///
/// Configs that analyse layout on a continuous-tone photograph are skipped
/// for binarized variants, because thresholding destroys the shading they
/// measure text density from. Conversely, the block and column configs are
/// only run on binarized variants, which is where they perform best.
pub fn is_compatible(variant: VariantKind, config: RecognitionConfig) -> bool {
    variant.is_binarized() != config.assumes_photograph()
}

/// Every trial to run, in priority order (config first, then variant).
///
/// If `exhaustive` is set, every variant is paired with every config.
pub fn trial_grid(exhaustive: bool) -> Vec<TrialId> {
    RecognitionConfig::ALL
        .into_iter()
        .flat_map(|config| {
            VariantKind::ALL
                .into_iter()
                .map(move |variant| TrialId { variant, config })
        })
        .filter(|id| exhaustive || is_compatible(id.variant, id.config))
        .collect()
}

/// Options controlling how trials run.
#[derive(Clone, Copy, Debug)]
pub struct TrialOpts {
    /// Maximum number of trials in flight.
    pub jobs: usize,
    /// Ignore [`is_compatible`] and run the full grid.
    pub exhaustive: bool,
}

/// Run every applicable trial over `variants`.
///
/// A trial whose engine call fails is recorded as a failed, empty result.
/// It is never retried. The returned results are in [`trial_grid`] order.
#[instrument(level = "debug", skip_all, fields(jobs = opts.jobs))]
pub async fn run_trials(
    engine: &dyn RecognitionEngine,
    variants: &[ImageVariant],
    opts: TrialOpts,
    sink: Option<&Arc<dyn DiagnosticSink>>,
    progress: &ProgressBar,
) -> Vec<TrialResult> {
    let by_kind = variants
        .iter()
        .map(|variant| (variant.kind, variant))
        .collect::<HashMap<_, _>>();
    let trials = trial_grid(opts.exhaustive)
        .into_iter()
        .filter_map(|id| by_kind.get(&id.variant).map(|&variant| (id, variant)))
        .collect::<Vec<_>>();
    progress.set_length(trials.len() as u64);
    debug!(count = trials.len(), "Running trials");

    let mut results = stream::iter(trials)
        .map(|(id, variant)| run_trial(engine, variant, id, sink))
        .buffer_unordered(opts.jobs.max(1))
        .inspect(|_| progress.inc(1))
        .collect::<Vec<_>>()
        .await;
    results.sort_by_key(|result| result.id.priority());
    results
}

/// Run a single trial, capturing any failure in the result.
#[instrument(level = "debug", skip_all, fields(trial = %id))]
async fn run_trial(
    engine: &dyn RecognitionEngine,
    variant: &ImageVariant,
    id: TrialId,
    sink: Option<&Arc<dyn DiagnosticSink>>,
) -> TrialResult {
    let result = match engine.recognize(variant, id.config).await {
        Ok(lines) => TrialResult::new(id, lines),
        Err(err) => {
            warn!(trial = %id, "Trial failed: {:#}", err);
            TrialResult::failed(id, &err)
        }
    };
    debug!(
        lines = result.lines.len(),
        confidence = result.mean_confidence(),
        "Finished trial"
    );
    if let Some(sink) = sink {
        let sink = sink.clone();
        let trial = result.clone();
        if let Err(err) =
            spawn_blocking_propagating_panics(move || sink.record_trial(&trial)).await
        {
            warn!("Could not record trial diagnostics: {:#}", err);
        }
    }
    result
}
