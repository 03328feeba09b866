use url::Url;

use crate::{Error, Result, Sink};

/// Configuration for [`Sink`].
///
/// # Examples
/// ```no_run
/// # use experiment_firehose::SinkConfig;
/// let sink = SinkConfig::from_stream_name("experiment-events")
///     .region("eu-west-1")
///     .to_sink();
/// ```
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub(crate) stream_name: String,
    pub(crate) region: String,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) endpoint_url: Option<Url>,
    pub(crate) verify_stream: bool,
}

impl SinkConfig {
    /// Region used when none is configured.
    pub const DEFAULT_REGION: &'static str = "us-east-1";

    /// Environment variable holding the delivery stream name.
    pub const STREAM_NAME_VAR: &'static str = "FIREHOSE_STREAM_NAME";
    /// Environment variable holding the region.
    pub const REGION_VAR: &'static str = "AWS_REGION";
    /// Environment variable holding an endpoint URL override.
    pub const ENDPOINT_URL_VAR: &'static str = "FIREHOSE_ENDPOINT_URL";
    /// Environment variable disabling stream verification when set to `false` or `0`.
    pub const VERIFY_STREAM_VAR: &'static str = "FIREHOSE_VERIFY_STREAM";

    /// Create a default configuration for the named delivery stream.
    ///
    /// Credentials are resolved by the AWS default provider chain.
    pub fn from_stream_name(stream_name: impl Into<String>) -> SinkConfig {
        SinkConfig {
            stream_name: stream_name.into(),
            region: SinkConfig::DEFAULT_REGION.to_owned(),
            credentials: None,
            endpoint_url: None,
            verify_stream: true,
        }
    }

    /// Read configuration from the environment, loading `.env` first if present.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingStreamName`] if `FIREHOSE_STREAM_NAME` is unset or empty.
    /// - [`Error::InvalidEndpointUrl`] if `FIREHOSE_ENDPOINT_URL` is not a valid URL.
    pub fn from_env() -> Result<SinkConfig> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                log::warn!(target: "experiment_firehose", "cannot load .env file: {err}");
            }
        }
        SinkConfig::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<SinkConfig> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let stream_name = var(SinkConfig::STREAM_NAME_VAR).ok_or(Error::MissingStreamName)?;
        let mut config = SinkConfig::from_stream_name(stream_name);

        if let Some(region) = var(SinkConfig::REGION_VAR) {
            config = config.region(region);
        }
        if let Some(endpoint_url) = var(SinkConfig::ENDPOINT_URL_VAR) {
            let endpoint_url = Url::parse(&endpoint_url).map_err(Error::InvalidEndpointUrl)?;
            config = config.endpoint_url(endpoint_url);
        }
        if let Some(verify) = var(SinkConfig::VERIFY_STREAM_VAR) {
            let verify = verify.trim();
            config = config.verify_stream(!(verify.eq_ignore_ascii_case("false") || verify == "0"));
        }

        Ok(config)
    }

    /// Set the AWS region.
    pub fn region(mut self, region: impl Into<String>) -> SinkConfig {
        self.region = region.into();
        self
    }

    /// Use static credentials instead of the AWS default provider chain.
    pub fn credentials(mut self, credentials: Credentials) -> SinkConfig {
        self.credentials = Some(credentials);
        self
    }

    /// Override the service endpoint, e.g. for a local emulator. Clients should use the default
    /// endpoint in most cases.
    pub fn endpoint_url(mut self, endpoint_url: Url) -> SinkConfig {
        self.endpoint_url = Some(endpoint_url);
        self
    }

    /// Whether [`Sink::initialize`] describes the stream to detect missing streams and invalid
    /// credentials up front. Enabled by default.
    pub fn verify_stream(mut self, verify_stream: bool) -> SinkConfig {
        self.verify_stream = verify_stream;
        self
    }

    /// Name of the delivery stream.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Create a [`Sink`] using this configuration.
    ///
    /// If initialization fails, the failure is logged once and an unavailable sink is returned:
    /// events are dropped but flag evaluation keeps working.
    pub fn to_sink(self) -> Sink {
        Sink::initialize(self).unwrap_or_else(|err| {
            log::warn!(target: "experiment_firehose",
                       "failed to initialize sink, experiment events will be dropped: {err}");
            Sink::unavailable()
        })
    }
}

/// Static AWS credentials.
#[derive(Clone)]
pub struct Credentials {
    pub(crate) access_key_id: String,
    pub(crate) secret_access_key: String,
    pub(crate) session_token: Option<String>,
}

impl Credentials {
    /// Create long-term credentials.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Credentials {
        Credentials {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attach a session token for temporary credentials.
    pub fn session_token(mut self, session_token: impl Into<String>) -> Credentials {
        self.session_token = Some(session_token.into());
        self
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{Credentials, SinkConfig};
    use crate::Error;

    fn from_vars(vars: &[(&str, &str)]) -> crate::Result<SinkConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        SinkConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn requires_stream_name() {
        assert!(matches!(from_vars(&[]), Err(Error::MissingStreamName)));
        assert!(matches!(
            from_vars(&[("FIREHOSE_STREAM_NAME", "  ")]),
            Err(Error::MissingStreamName)
        ));
    }

    #[test]
    fn defaults_region_and_verification() {
        let config = from_vars(&[("FIREHOSE_STREAM_NAME", "experiment-events")]).unwrap();

        assert_eq!(config.stream_name(), "experiment-events");
        assert_eq!(config.region, "us-east-1");
        assert!(config.verify_stream);
        assert!(config.endpoint_url.is_none());
        assert!(config.credentials.is_none());
    }

    #[test]
    fn reads_optional_variables() {
        let config = from_vars(&[
            ("FIREHOSE_STREAM_NAME", "experiment-events"),
            ("AWS_REGION", "eu-west-1"),
            ("FIREHOSE_ENDPOINT_URL", "http://localhost:4566"),
            ("FIREHOSE_VERIFY_STREAM", "false"),
        ])
        .unwrap();

        assert_eq!(config.region, "eu-west-1");
        assert_eq!(
            config.endpoint_url.as_ref().map(|url| url.as_str()),
            Some("http://localhost:4566/")
        );
        assert!(!config.verify_stream);
    }

    #[test]
    fn rejects_invalid_endpoint_url() {
        let result = from_vars(&[
            ("FIREHOSE_STREAM_NAME", "experiment-events"),
            ("FIREHOSE_ENDPOINT_URL", "not a url"),
        ]);

        assert!(matches!(result, Err(Error::InvalidEndpointUrl(_))));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let credentials = Credentials::new("AKIAEXAMPLE", "very-secret").session_token("token");
        let debug = format!("{credentials:?}");

        assert!(debug.contains("AKIAEXAMPLE"));
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("\"token\""));
    }
}
