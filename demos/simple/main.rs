use std::sync::Arc;

use experiment_firehose::{
    run_series, ContextBuilder, EvaluationDetail, EvaluationSeriesContext, ExperimentHook, Hook,
    Reason, Sink, SinkConfig,
};

pub fn main() -> experiment_firehose::Result<()> {
    // Configure env_logger to see delivery logs.
    env_logger::Builder::from_env(
        env_logger::Env::new().default_filter_or("experiment_firehose=debug"),
    )
    .init();

    let flag_key =
        std::env::var("LAUNCHDARKLY_FLAG_KEY").unwrap_or_else(|_| "default-flag-key".to_owned());

    // Reads FIREHOSE_STREAM_NAME and AWS_REGION (from `.env` too). Without a stream name, events
    // are dropped but evaluation still works.
    let sink = match SinkConfig::from_env() {
        Ok(config) => config.to_sink(),
        Err(err) => {
            println!("*** Firehose is not configured: {err}");
            Sink::unavailable()
        }
    };
    let hooks: Vec<Box<dyn Hook>> = vec![Box::new(ExperimentHook::new(Arc::new(sink)))];

    let context = ContextBuilder::new("testing-user-v3")
        .kind("user")
        .set("tier", "silver")
        .build()?;
    let series = EvaluationSeriesContext::new(flag_key.as_str(), context, "Control");

    // Stand-in for the SDK evaluation: serve variation 1 as part of an experiment.
    let detail = run_series(&hooks, &series, || {
        EvaluationDetail::new(
            "treatment",
            Some(1),
            Some(Reason::Fallthrough {
                in_experiment: true,
            }),
        )
    });

    println!("*** The {flag_key} feature flag evaluates to {}", detail.value);

    Ok(())
}
