//! Amazon Kinesis Data Firehose implementation of [`DeliveryClient`].
use std::future::Future;

use aws_config::BehaviorVersion;
use aws_sdk_firehose::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::Blob,
    types::Record,
    Client,
};
use tokio::runtime::Runtime;

use crate::{
    sink::{BatchResponse, DeliveryClient},
    Error, Result, SinkConfig,
};

/// A Firehose client bound to one region.
///
/// The AWS SDK is async, while delivery happens synchronously on the evaluating thread, so the
/// client owns a small tokio runtime and blocks on it for every call. `put_record` may be called
/// concurrently from any number of threads.
pub struct FirehoseClient {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: Client,
    // `None` only while dropping.
    runtime: Option<Runtime>,
}

impl FirehoseClient {
    /// Build a client for `config.region` and, if `config.verify_stream` is set, check that
    /// `config.stream_name` can be described.
    ///
    /// # Errors
    ///
    /// - [`Error::Runtime`] if the runtime failed to start.
    /// - [`Error::StreamUnavailable`] if stream verification failed.
    pub fn connect(config: &SinkConfig) -> Result<FirehoseClient> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("experiment-firehose")
            .enable_all()
            .build()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(credentials) = &config.credentials {
            loader = loader.credentials_provider(Credentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.clone(),
                credentials.session_token.clone(),
                None,
                "experiment_firehose",
            ));
        }
        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url.as_str());
        }

        let shared_config = block_on(&runtime, loader.load())?;
        let client = FirehoseClient {
            client: Client::new(&shared_config),
            runtime: Some(runtime),
        };

        if config.verify_stream {
            client.verify_stream(&config.stream_name)?;
        }

        log::info!(target: "experiment_firehose",
                   "firehose client initialized for stream {} in {}", config.stream_name, config.region);
        Ok(client)
    }

    fn verify_stream(&self, stream_name: &str) -> Result<()> {
        let request = self
            .client
            .describe_delivery_stream()
            .delivery_stream_name(stream_name)
            .send();

        self.run(request)?.map_err(|err| {
            log::warn!(target: "experiment_firehose",
                       "cannot describe delivery stream {stream_name}: {}", DisplayErrorContext(&err));
            Error::StreamUnavailable {
                stream_name: stream_name.to_owned(),
                message: DisplayErrorContext(&err).to_string(),
            }
        })?;

        Ok(())
    }

    fn run<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match &self.runtime {
            Some(runtime) => block_on(runtime, future),
            None => Err(Error::SinkUnavailable),
        }
    }
}

/// Drive `future` to completion on `runtime`.
///
/// `Runtime::block_on` panics when called from inside another async runtime, so in that case the
/// future is spawned onto `runtime` and awaited through a channel instead.
fn block_on<F>(runtime: &Runtime, future: F) -> Result<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    if tokio::runtime::Handle::try_current().is_err() {
        return Ok(runtime.block_on(future));
    }

    let (sender, receiver) = std::sync::mpsc::sync_channel(1);
    runtime.spawn(async move {
        // Receiver is only gone if the caller stopped waiting.
        let _ = sender.send(future.await);
    });
    receiver
        .recv()
        .map_err(|_| Error::Delivery("delivery task did not complete".to_owned()))
}

impl DeliveryClient for FirehoseClient {
    fn put_record(&self, stream_name: &str, data: Vec<u8>) -> Result<String> {
        let record = Record::builder()
            .data(Blob::new(data))
            .build()
            .map_err(|err| Error::Delivery(err.to_string()))?;

        let request = self
            .client
            .put_record()
            .delivery_stream_name(stream_name)
            .record(record)
            .send();

        let output = self
            .run(request)?
            .map_err(|err| Error::Delivery(DisplayErrorContext(&err).to_string()))?;

        Ok(output.record_id().to_owned())
    }

    fn put_record_batch(
        &self,
        stream_name: &str,
        records: Vec<Vec<u8>>,
    ) -> Result<BatchResponse> {
        let records = records
            .into_iter()
            .map(|data| Record::builder().data(Blob::new(data)).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| Error::Delivery(err.to_string()))?;

        let request = self
            .client
            .put_record_batch()
            .delivery_stream_name(stream_name)
            .set_records(Some(records))
            .send();

        let output = self
            .run(request)?
            .map_err(|err| Error::Delivery(DisplayErrorContext(&err).to_string()))?;

        if let Some(entry) = output
            .request_responses()
            .iter()
            .find(|entry| entry.error_code().is_some())
        {
            log::debug!(target: "experiment_firehose",
                        "first rejected record: {} {}",
                        entry.error_code().unwrap_or_default(),
                        entry.error_message().unwrap_or_default());
        }

        Ok(BatchResponse {
            failed_put_count: usize::try_from(output.failed_put_count()).unwrap_or_default(),
        })
    }
}

impl Drop for FirehoseClient {
    fn drop(&mut self) {
        // Dropping a runtime from async context panics; shutting down in the background does not.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::{json, Map};
    use url::Url;

    use crate::{Credentials, EventMetadata, ExperimentEvent, SinkConfig};

    // Nothing listens on the discard port, so every call fails with a connection error.
    fn unreachable_config() -> SinkConfig {
        SinkConfig::from_stream_name("experiment-events")
            .credentials(Credentials::new("AKIAEXAMPLE", "secret"))
            .endpoint_url(Url::parse("http://127.0.0.1:9").unwrap())
    }

    fn event() -> ExperimentEvent {
        ExperimentEvent {
            timestamp: Utc::now(),
            flag_key: "checkout-experiment".to_owned(),
            evaluation_context: Map::new(),
            flag_value: json!("treatment"),
            variation_index: Some(1),
            reason_kind: Some("FALLTHROUGH".to_owned()),
            metadata: EventMetadata::default(),
        }
    }

    #[test]
    fn failed_stream_verification_degrades_sink() {
        let sink = unreachable_config().verify_stream(true).to_sink();

        assert!(!sink.is_ready());
        assert!(!sink.send(&event()));
    }

    #[test]
    fn unreachable_service_returns_false() {
        let sink = unreachable_config().verify_stream(false).to_sink();

        assert!(sink.is_ready());
        assert!(!sink.send(&event()));
    }

    #[tokio::test]
    async fn send_from_async_context_does_not_panic() {
        let sink = unreachable_config().verify_stream(false).to_sink();

        assert!(sink.is_ready());
        assert!(!sink.send(&event()));
    }
}
