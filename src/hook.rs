//! Evaluation hooks and the hook that forwards experiment evaluations to a [`Sink`].
use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::{Context, EvaluationDetail, ExperimentEvent, Sink};

/// Data a hook passes from one evaluation stage to the next.
pub type EvaluationSeriesData = HashMap<String, Value>;

/// Describes the evaluation a hook is invoked for.
#[derive(Debug, Clone)]
pub struct EvaluationSeriesContext {
    /// Key of the flag being evaluated.
    pub flag_key: String,
    /// The context the flag is evaluated for.
    pub context: Context,
    /// Value served if evaluation fails.
    pub default_value: Value,
    /// Name of the SDK method that triggered the evaluation.
    pub method: &'static str,
}

impl EvaluationSeriesContext {
    /// Create a series context for a `variation_detail` call.
    pub fn new(
        flag_key: impl Into<String>,
        context: Context,
        default_value: impl Into<Value>,
    ) -> EvaluationSeriesContext {
        EvaluationSeriesContext {
            flag_key: flag_key.into(),
            context,
            default_value: default_value.into(),
            method: "variation_detail",
        }
    }
}

/// Identifies a hook in logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    name: String,
}

impl Metadata {
    /// Create metadata with the given hook name.
    pub fn new(name: impl Into<String>) -> Metadata {
        Metadata { name: name.into() }
    }

    /// Name of the hook.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A callback the host SDK invokes around every flag evaluation.
pub trait Hook: Send + Sync {
    /// Describes the hook.
    fn metadata(&self) -> Metadata;

    /// Called before the flag is evaluated. The returned data is passed to
    /// [`Hook::after_evaluation`] of the same hook.
    fn before_evaluation(
        &self,
        _series: &EvaluationSeriesContext,
        data: EvaluationSeriesData,
    ) -> EvaluationSeriesData {
        data
    }

    /// Called after the flag is evaluated.
    ///
    /// # Notes
    ///
    /// This method is called before returning the value to the caller, so it must not panic and
    /// should not block for long.
    fn after_evaluation(
        &self,
        _series: &EvaluationSeriesContext,
        data: EvaluationSeriesData,
        _detail: &EvaluationDetail,
    ) -> EvaluationSeriesData {
        data
    }
}

/// Run `evaluate` wrapped in the evaluation stages of `hooks`.
///
/// `before_evaluation` runs in registration order and `after_evaluation` in reverse order. The
/// evaluation result is returned unchanged.
///
/// ```
/// # use experiment_firehose::{run_series, ContextBuilder, EvaluationDetail, EvaluationSeriesContext, Hook};
/// let context = ContextBuilder::new("user-123").build().unwrap();
/// let series = EvaluationSeriesContext::new("my-flag", context, false);
/// let hooks: Vec<Box<dyn Hook>> = Vec::new();
/// let detail = run_series(&hooks, &series, || EvaluationDetail::new(true, Some(0), None));
/// assert_eq!(detail.value, true);
/// ```
pub fn run_series<H: AsRef<dyn Hook>>(
    hooks: &[H],
    series: &EvaluationSeriesContext,
    evaluate: impl FnOnce() -> EvaluationDetail,
) -> EvaluationDetail {
    let data: Vec<EvaluationSeriesData> = hooks
        .iter()
        .map(|hook| {
            hook.as_ref()
                .before_evaluation(series, EvaluationSeriesData::new())
        })
        .collect();

    let detail = evaluate();

    for (hook, data) in hooks.iter().zip(data).rev() {
        hook.as_ref().after_evaluation(series, data, &detail);
    }

    detail
}

/// A [`Hook`] that forwards experiment evaluations to a [`Sink`].
///
/// Evaluations outside of experiments are skipped. Delivery is best-effort: failures are logged
/// and never affect the evaluation.
///
/// # Examples
/// ```
/// # use std::sync::Arc;
/// # use experiment_firehose::{ExperimentHook, Sink};
/// // Degraded mode: events are dropped, evaluation is unaffected.
/// let hook = ExperimentHook::new(Arc::new(Sink::unavailable()));
/// ```
pub struct ExperimentHook {
    sink: Arc<Sink>,
}

impl ExperimentHook {
    /// Name reported in [`Hook::metadata`].
    pub const NAME: &'static str = "flag-evaluation-hook";

    /// Create a hook delivering to `sink`.
    pub fn new(sink: Arc<Sink>) -> ExperimentHook {
        ExperimentHook { sink }
    }

    /// The sink events are delivered to.
    pub fn sink(&self) -> &Arc<Sink> {
        &self.sink
    }
}

impl Hook for ExperimentHook {
    fn metadata(&self) -> Metadata {
        Metadata::new(ExperimentHook::NAME)
    }

    fn after_evaluation(
        &self,
        series: &EvaluationSeriesContext,
        data: EvaluationSeriesData,
        detail: &EvaluationDetail,
    ) -> EvaluationSeriesData {
        let flag_key = series.flag_key.as_str();

        let Some(event) = ExperimentEvent::extract(series, detail) else {
            log::trace!(target: "experiment_firehose", "flag {flag_key} is not part of an experiment");
            return data;
        };

        log::debug!(target: "experiment_firehose",
                    event:serde;
                    "experiment detected for flag {flag_key}");

        // Failures are logged by the sink.
        if self.sink.send(&event) {
            log::debug!(target: "experiment_firehose", "sent experiment event for flag {flag_key}");
        }

        data
    }
}
