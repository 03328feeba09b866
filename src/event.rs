//! Experiment events extracted from flag evaluations.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{Context, EvaluationDetail, EvaluationSeriesContext, Result};

/// Value of [`EventMetadata::source`].
pub const EVENT_SOURCE: &str = "launchdarkly-rust-hook";
/// Value of [`EventMetadata::version`].
pub const EVENT_VERSION: &str = "1.0";

/// Fields of the context representation that are never copied into
/// [`ExperimentEvent::evaluation_context`].
pub const RESERVED_ATTRIBUTES: &[&str] = &["key", "kind", "_meta"];

/// An evaluation that counts toward a running experiment, flattened for analytics storage.
///
/// Serializes to a single JSON object. Absent optional fields are omitted rather than written as
/// `null`, so downstream schema inference sees a stable set of columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentEvent {
    /// Capture time, UTC with microsecond precision.
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Key of the evaluated flag.
    pub flag_key: String,
    /// Caller-defined attributes of the context. For multi-contexts, attributes are grouped by
    /// context kind.
    pub evaluation_context: Map<String, Value>,
    /// The served value.
    pub flag_value: Value,
    /// Index of the served variation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_index: Option<usize>,
    /// Kind of the evaluation reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_kind: Option<String>,
    /// Provenance stamp.
    pub metadata: EventMetadata,
}

/// Provenance stamp attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventMetadata {
    /// Name of the producer.
    pub source: &'static str,
    /// Version of the event format.
    pub version: &'static str,
}

impl Default for EventMetadata {
    fn default() -> EventMetadata {
        EventMetadata {
            source: EVENT_SOURCE,
            version: EVENT_VERSION,
        }
    }
}

impl ExperimentEvent {
    /// Build an event for `detail` if the evaluation is part of a running experiment.
    ///
    /// Returns `None` for every other evaluation. This is the common case and not an error.
    ///
    /// Note that `flag_key` is taken from the evaluation call, not from the context key.
    pub fn extract(
        series: &EvaluationSeriesContext,
        detail: &EvaluationDetail,
    ) -> Option<ExperimentEvent> {
        ExperimentEvent::extract_at(series, detail, Utc::now())
    }

    /// Same as [`ExperimentEvent::extract`] with an explicit capture time.
    pub fn extract_at(
        series: &EvaluationSeriesContext,
        detail: &EvaluationDetail,
        timestamp: DateTime<Utc>,
    ) -> Option<ExperimentEvent> {
        if !detail.is_in_experiment() {
            return None;
        }

        Some(ExperimentEvent {
            timestamp,
            flag_key: series.flag_key.clone(),
            evaluation_context: caller_attributes(&series.context),
            flag_value: detail.value.clone(),
            variation_index: detail.variation_index,
            reason_kind: detail.reason.as_ref().map(|it| it.kind().to_owned()),
            metadata: EventMetadata::default(),
        })
    }

    /// Serialize to a newline-terminated single-line JSON record.
    pub fn to_record(&self) -> Result<Vec<u8>> {
        let mut data = serde_json::to_vec(self)?;
        data.push(b'\n');
        Ok(data)
    }
}

/// Copy every caller-defined attribute of `context`, skipping [`RESERVED_ATTRIBUTES`].
pub fn caller_attributes(context: &Context) -> Map<String, Value> {
    if !context.is_multi() {
        return filter_reserved(match context.to_json() {
            Value::Object(map) => map,
            _ => Map::new(),
        });
    }

    context
        .contexts()
        .iter()
        .map(|single| {
            (
                single.kind().to_string(),
                Value::Object(filter_reserved(single.to_json_map(false))),
            )
        })
        .collect()
}

fn filter_reserved(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(attribute, _)| !RESERVED_ATTRIBUTES.contains(&attribute.as_str()))
        .collect()
}

fn serialize_timestamp<S: Serializer>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Micros, false))
}
