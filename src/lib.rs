//! A feature flag evaluation hook that forwards experiment evaluations to Amazon Kinesis Data
//! Firehose for downstream analytics.
//!
//! # Overview
//!
//! The host SDK invokes a [`Hook`] around every flag evaluation. [`ExperimentHook`] looks at the
//! evaluation [`Reason`]: if the evaluation is part of a running experiment, it extracts an
//! [`ExperimentEvent`] (flag key, caller-defined context attributes, served value, variation index
//! and reason kind) and hands it to a [`Sink`]. All other evaluations are skipped.
//!
//! The [`Sink`] owns one long-lived client handle bound to one delivery stream and puts one
//! newline-terminated JSON record per event. Firehose takes care of buffering, compression and
//! partitioning; the records land in time-partitioned, newline-delimited objects.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use experiment_firehose::{
//! #     run_series, ContextBuilder, EvaluationDetail, EvaluationSeriesContext, ExperimentHook,
//! #     Hook, Reason, SinkConfig,
//! # };
//! let sink = SinkConfig::from_stream_name("experiment-events").to_sink();
//! let hooks: Vec<Box<dyn Hook>> = vec![Box::new(ExperimentHook::new(Arc::new(sink)))];
//!
//! let context = ContextBuilder::new("user-123")
//!     .set("tier", "premium")
//!     .build()
//!     .unwrap();
//! let series = EvaluationSeriesContext::new("checkout-experiment", context, "control");
//! let detail = run_series(&hooks, &series, || {
//!     EvaluationDetail::new(
//!         "treatment",
//!         Some(1),
//!         Some(Reason::Fallthrough { in_experiment: true }),
//!     )
//! });
//! ```
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum and are only returned while building contexts,
//! configuration and sinks.
//!
//! Delivery is best-effort and at-most-once. Flag evaluation is never blocked or aborted by a
//! delivery failure: a sink that failed to initialize turns into an unavailable sink, and failed
//! sends are logged and dropped.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `experiment_firehose` target. Consider integrating a `log`-compatible logger implementation
//! for better visibility into delivery.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod config;
mod context;
mod error;
mod evaluation;
mod event;
mod firehose;
mod hook;
mod sink;

pub use config::{Credentials, SinkConfig};
pub use context::{Context, ContextBuilder, Kind, SingleContext};
pub use error::{Error, Result};
pub use evaluation::{ErrorKind, EvaluationDetail, Reason};
pub use event::{
    caller_attributes, EventMetadata, ExperimentEvent, EVENT_SOURCE, EVENT_VERSION,
    RESERVED_ATTRIBUTES,
};
pub use firehose::FirehoseClient;
pub use hook::{
    run_series, EvaluationSeriesContext, EvaluationSeriesData, ExperimentHook, Hook, Metadata,
};
pub use sink::{BatchOutcome, BatchResponse, DeliveryClient, Sink, MAX_BATCH_RECORDS};
