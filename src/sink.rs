//! Best-effort delivery of experiment events to a streaming-ingestion service.
use std::sync::Arc;

use crate::{firehose::FirehoseClient, Error, ExperimentEvent, Result, SinkConfig};

/// Maximum number of records accepted by a single `PutRecordBatch` call.
pub const MAX_BATCH_RECORDS: usize = 500;

/// A client for a streaming-ingestion service.
///
/// [`FirehoseClient`] is the production implementation. Implementations must be safe to call
/// concurrently from multiple threads.
pub trait DeliveryClient: Send + Sync {
    /// Put a single record into the stream. Returns the service-assigned record id.
    fn put_record(&self, stream_name: &str, data: Vec<u8>) -> Result<String>;

    /// Put up to [`MAX_BATCH_RECORDS`] records into the stream with one call.
    fn put_record_batch(&self, stream_name: &str, records: Vec<Vec<u8>>)
        -> Result<BatchResponse>;
}

impl<T: DeliveryClient + ?Sized> DeliveryClient for Arc<T> {
    fn put_record(&self, stream_name: &str, data: Vec<u8>) -> Result<String> {
        (**self).put_record(stream_name, data)
    }

    fn put_record_batch(
        &self,
        stream_name: &str,
        records: Vec<Vec<u8>>,
    ) -> Result<BatchResponse> {
        (**self).put_record_batch(stream_name, records)
    }
}

/// Service response to a batch put.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResponse {
    /// Number of records the service rejected.
    pub failed_put_count: usize,
}

/// Result of [`Sink::send_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Events accepted by the service.
    pub accepted: usize,
    /// Events that were dropped.
    pub failed: usize,
}

enum SinkState {
    Ready {
        stream_name: String,
        client: Box<dyn DeliveryClient>,
    },
    Unavailable,
}

/// Delivers [`ExperimentEvent`]s to one named stream, reusing one client handle for every call.
///
/// A sink is either *ready* or *unavailable*. An unavailable sink (initialization failed or was
/// never attempted) turns every send into a logged no-op, so flag evaluation keeps working when
/// delivery does not.
///
/// Delivery is at-most-once: nothing is retried or buffered here. Buffering, compression and
/// durability belong to the streaming service.
pub struct Sink {
    state: SinkState,
}

impl Sink {
    /// Initialize a sink backed by Amazon Kinesis Data Firehose.
    ///
    /// # Errors
    ///
    /// - [`Error::Runtime`] if the client runtime failed to start.
    /// - [`Error::StreamUnavailable`] if stream verification is enabled and the stream cannot be
    /// described (missing stream, invalid credentials, unreachable endpoint).
    ///
    /// Use [`SinkConfig::to_sink`] to fall back to an unavailable sink instead.
    pub fn initialize(config: SinkConfig) -> Result<Sink> {
        let client = FirehoseClient::connect(&config)?;
        Ok(Sink::with_client(config.stream_name, client))
    }

    /// Create a ready sink using the given client.
    pub fn with_client(
        stream_name: impl Into<String>,
        client: impl DeliveryClient + 'static,
    ) -> Sink {
        Sink {
            state: SinkState::Ready {
                stream_name: stream_name.into(),
                client: Box::new(client),
            },
        }
    }

    /// Create an unavailable sink. Every send fails.
    pub fn unavailable() -> Sink {
        Sink {
            state: SinkState::Unavailable,
        }
    }

    /// Whether the sink holds a client.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, SinkState::Ready { .. })
    }

    /// Name of the target stream. `None` if the sink is unavailable.
    pub fn stream_name(&self) -> Option<&str> {
        match &self.state {
            SinkState::Ready { stream_name, .. } => Some(stream_name.as_str()),
            SinkState::Unavailable => None,
        }
    }

    /// Send one event as a newline-terminated JSON record.
    ///
    /// Returns `true` if the service accepted the record. Every failure (unavailable sink,
    /// serialization, service or network error) is logged and returns `false`.
    pub fn send(&self, event: &ExperimentEvent) -> bool {
        match self.try_send(event) {
            Ok(record_id) => {
                log::debug!(target: "experiment_firehose",
                            "successfully sent experiment event, record id: {record_id}");
                true
            }
            Err(Error::SinkUnavailable) => {
                log::debug!(target: "experiment_firehose",
                            "sink not available, skipping event for flag {}", event.flag_key);
                false
            }
            Err(err) => {
                log::warn!(target: "experiment_firehose",
                           "error sending experiment event for flag {}: {err}", event.flag_key);
                false
            }
        }
    }

    fn try_send(&self, event: &ExperimentEvent) -> Result<String> {
        let SinkState::Ready {
            stream_name,
            client,
        } = &self.state
        else {
            return Err(Error::SinkUnavailable);
        };

        let data = event.to_record()?;
        client.put_record(stream_name, data)
    }

    /// Send events with as few `PutRecordBatch` calls as the service limit allows.
    ///
    /// This is an explicit bulk API for callers that already hold several events; the hook itself
    /// always sends one event per evaluation. Failed events are counted, not retried.
    pub fn send_batch(&self, events: &[ExperimentEvent]) -> BatchOutcome {
        let SinkState::Ready {
            stream_name,
            client,
        } = &self.state
        else {
            log::debug!(target: "experiment_firehose",
                        "sink not available, skipping batch of {} events", events.len());
            return BatchOutcome {
                accepted: 0,
                failed: events.len(),
            };
        };

        let mut outcome = BatchOutcome::default();

        let mut records = Vec::with_capacity(events.len());
        for event in events {
            match event.to_record() {
                Ok(record) => records.push(record),
                Err(err) => {
                    log::warn!(target: "experiment_firehose",
                               "cannot serialize experiment event for flag {}: {err}", event.flag_key);
                    outcome.failed += 1;
                }
            }
        }

        while !records.is_empty() {
            let rest = records.split_off(records.len().min(MAX_BATCH_RECORDS));
            let chunk = std::mem::replace(&mut records, rest);
            let chunk_len = chunk.len();

            match client.put_record_batch(stream_name, chunk) {
                Ok(response) => {
                    let failed = response.failed_put_count.min(chunk_len);
                    if failed > 0 {
                        log::warn!(target: "experiment_firehose",
                                   "failed to send {failed} of {chunk_len} records");
                    }
                    outcome.failed += failed;
                    outcome.accepted += chunk_len - failed;
                }
                Err(err) => {
                    log::warn!(target: "experiment_firehose",
                               "error sending batch of {chunk_len} records: {err}");
                    outcome.failed += chunk_len;
                }
            }
        }

        log::debug!(target: "experiment_firehose",
                    "sent {} of {} experiment events", outcome.accepted, events.len());
        outcome
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            SinkState::Ready { stream_name, .. } => f
                .debug_struct("Sink")
                .field("stream_name", stream_name)
                .finish_non_exhaustive(),
            SinkState::Unavailable => f.write_str("Sink(unavailable)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use serde_json::{json, Map};

    use super::{BatchOutcome, BatchResponse, DeliveryClient, Sink, MAX_BATCH_RECORDS};
    use crate::{Error, EventMetadata, ExperimentEvent, Result};

    #[derive(Default)]
    struct FakeClient {
        fail: bool,
        rejected_per_batch: usize,
        puts: Mutex<Vec<(String, Vec<u8>)>>,
        batches: Mutex<Vec<usize>>,
    }

    impl DeliveryClient for FakeClient {
        fn put_record(&self, stream_name: &str, data: Vec<u8>) -> Result<String> {
            if self.fail {
                return Err(Error::Delivery("ServiceUnavailableException".to_owned()));
            }
            let mut puts = self.puts.lock().unwrap();
            puts.push((stream_name.to_owned(), data));
            Ok(format!("record-{}", puts.len()))
        }

        fn put_record_batch(
            &self,
            _stream_name: &str,
            records: Vec<Vec<u8>>,
        ) -> Result<BatchResponse> {
            if self.fail {
                return Err(Error::Delivery("ServiceUnavailableException".to_owned()));
            }
            assert!(records.len() <= MAX_BATCH_RECORDS);
            assert!(records.iter().all(|it| it.ends_with(b"\n")));
            self.batches.lock().unwrap().push(records.len());
            Ok(BatchResponse {
                failed_put_count: self.rejected_per_batch,
            })
        }
    }

    fn event(flag_key: &str) -> ExperimentEvent {
        ExperimentEvent {
            timestamp: Utc::now(),
            flag_key: flag_key.to_owned(),
            evaluation_context: Map::new(),
            flag_value: json!(true),
            variation_index: Some(0),
            reason_kind: Some("FALLTHROUGH".to_owned()),
            metadata: EventMetadata::default(),
        }
    }

    #[test]
    fn unavailable_sink_returns_false() {
        let sink = Sink::unavailable();

        assert!(!sink.is_ready());
        assert_eq!(sink.stream_name(), None);
        assert!(!sink.send(&event("flag")));
        assert_eq!(
            sink.send_batch(&[event("a"), event("b")]),
            BatchOutcome {
                accepted: 0,
                failed: 2
            }
        );
    }

    #[test]
    fn sends_newline_terminated_record_to_stream() {
        let client = Arc::new(FakeClient::default());
        let sink = Sink::with_client("experiment-events", client.clone());

        assert!(sink.is_ready());
        assert!(sink.send(&event("flag")));

        let puts = client.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].0, "experiment-events");
        assert!(puts[0].1.ends_with(b"}\n"));
    }

    #[test]
    fn service_failure_returns_false() {
        let client = FakeClient {
            fail: true,
            ..FakeClient::default()
        };
        let sink = Sink::with_client("experiment-events", client);

        assert!(!sink.send(&event("flag")));
        assert_eq!(
            sink.send_batch(&[event("a")]),
            BatchOutcome {
                accepted: 0,
                failed: 1
            }
        );
    }

    #[test]
    fn splits_batches_at_service_limit() {
        let client = Arc::new(FakeClient {
            rejected_per_batch: 1,
            ..FakeClient::default()
        });
        let sink = Sink::with_client("experiment-events", client.clone());
        let events: Vec<_> = (0..1_201).map(|i| event(&format!("flag-{i}"))).collect();

        let outcome = sink.send_batch(&events);

        assert_eq!(*client.batches.lock().unwrap(), vec![500, 500, 201]);
        assert_eq!(
            outcome,
            BatchOutcome {
                accepted: 1_198,
                failed: 3
            }
        );
    }

    #[test]
    fn empty_batch_makes_no_calls() {
        let client = Arc::new(FakeClient::default());
        let sink = Sink::with_client("experiment-events", client.clone());

        assert_eq!(sink.send_batch(&[]), BatchOutcome::default());
        assert!(client.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn concurrent_sends_share_one_client() {
        let client = Arc::new(FakeClient::default());
        let sink = Arc::new(Sink::with_client("experiment-events", client.clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = sink.clone();
                std::thread::spawn(move || sink.send(&event(&format!("flag-{i}"))))
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(client.puts.lock().unwrap().len(), 8);
    }
}
