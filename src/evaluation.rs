//! Results of a flag evaluation as reported by the host SDK.
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Explains why a flag evaluated to its value.
///
/// Serialized the way LaunchDarkly SDKs report reasons:
/// ```json
/// {"kind": "RULE_MATCH", "ruleIndex": 0, "ruleId": "rule-1", "inExperiment": true}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// The flag is off and served its off variation.
    Off,
    /// No targets or rules matched and the fallthrough was served.
    #[serde(rename_all = "camelCase")]
    Fallthrough {
        /// Whether the evaluation is part of a running experiment.
        #[serde(default, skip_serializing_if = "is_false")]
        in_experiment: bool,
    },
    /// The context was individually targeted.
    TargetMatch,
    /// A targeting rule matched.
    #[serde(rename_all = "camelCase")]
    RuleMatch {
        /// Zero-based index of the matching rule.
        rule_index: usize,
        /// Stable identifier of the matching rule.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rule_id: Option<String>,
        /// Whether the evaluation is part of a running experiment.
        #[serde(default, skip_serializing_if = "is_false")]
        in_experiment: bool,
    },
    /// A prerequisite flag did not evaluate to the required variation.
    #[serde(rename_all = "camelCase")]
    PrerequisiteFailed {
        /// Key of the failed prerequisite flag.
        prerequisite_key: String,
    },
    /// The flag could not be evaluated and the default value was served.
    #[serde(rename_all = "camelCase")]
    Error {
        /// What went wrong.
        error_kind: ErrorKind,
    },
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Reason {
    /// The `kind` discriminator string.
    pub fn kind(&self) -> &'static str {
        match self {
            Reason::Off => "OFF",
            Reason::Fallthrough { .. } => "FALLTHROUGH",
            Reason::TargetMatch => "TARGET_MATCH",
            Reason::RuleMatch { .. } => "RULE_MATCH",
            Reason::PrerequisiteFailed { .. } => "PREREQUISITE_FAILED",
            Reason::Error { .. } => "ERROR",
        }
    }

    /// Whether the evaluation counts toward a running experiment.
    pub fn is_in_experiment(&self) -> bool {
        match self {
            Reason::Fallthrough { in_experiment } | Reason::RuleMatch { in_experiment, .. } => {
                *in_experiment
            }
            _ => false,
        }
    }
}

/// Evaluation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The SDK was not initialized yet.
    ClientNotReady,
    /// Unknown flag key.
    FlagNotFound,
    /// The flag configuration is invalid.
    MalformedFlag,
    /// No context was given.
    UserNotSpecified,
    /// The served value has an unexpected type.
    WrongType,
    /// Unexpected failure inside the SDK.
    Exception,
}

/// The result of one flag evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDetail {
    /// The served value. Any JSON value.
    pub value: Value,
    /// Zero-based index of the served variation. `None` when the default value was served.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation_index: Option<usize>,
    /// Why the value was served. `None` if the host did not request reasons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
}

impl EvaluationDetail {
    /// Create a new evaluation detail.
    pub fn new(
        value: impl Into<Value>,
        variation_index: Option<usize>,
        reason: Option<Reason>,
    ) -> EvaluationDetail {
        EvaluationDetail {
            value: value.into(),
            variation_index,
            reason,
        }
    }

    /// Whether the reason reports membership in a running experiment. `false` without a reason.
    pub fn is_in_experiment(&self) -> bool {
        self.reason.as_ref().is_some_and(Reason::is_in_experiment)
    }
}
