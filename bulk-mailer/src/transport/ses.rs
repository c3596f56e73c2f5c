//! Amazon SES v2 transport.
//!
//! Wraps `aws_sdk_sesv2::Client`. Credentials come from the standard AWS
//! provider chain (environment, profile, SSO, instance or task role).
//! Two operations are used:
//! - `GetAccount` to verify the session before a run
//! - `SendEmail` with raw MIME content

use std::time::Duration;

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sesv2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sesv2::primitives::Blob;
use aws_sdk_sesv2::types::{Destination, EmailContent, RawMessage};
use aws_sdk_sesv2::Client;
use tracing::{debug, error, info};

use super::{TransportClient, TransportError};
use crate::config::Config;

/// Connection settings for [`SesClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct SesConfig {
    pub region: String,
    /// Overrides the regional endpoint (e.g. a local SES emulator)
    pub endpoint: Option<String>,
    /// Per-operation timeout, retries included
    pub timeout: Duration,
}

impl SesConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            region: config.aws_region.clone(),
            endpoint: config.ses_endpoint.clone(),
            timeout: config.request_timeout(),
        }
    }
}

/// SES v2 transport.
pub struct SesClient {
    config: SesConfig,
    client: Client,
}

impl std::fmt::Debug for SesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SesClient")
            .field("config", &self.config)
            .field("client", &"<SesV2Client>")
            .finish()
    }
}

impl SesClient {
    /// Build an SDK client from the default AWS configuration chain.
    pub async fn new(config: SesConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.timeout)
                    .build(),
            );

        if let Some(endpoint) = &config.endpoint {
            debug!(endpoint = %endpoint, "ses_custom_endpoint");
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        info!(region = %config.region, endpoint = ?config.endpoint, "ses_client_created");

        Self::with_client(config, Client::new(&sdk_config))
    }

    /// Wrap a pre-built SDK client.
    pub fn with_client(config: SesConfig, client: Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &SesConfig {
        &self.config
    }
}

/// Turn an SDK failure into a classified transport error.
fn classify_sdk_error<E>(err: &SdkError<E>) -> TransportError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let detail = DisplayErrorContext(err).to_string();
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            TransportError::Network(detail)
        }
        _ => TransportError::classify(
            err.raw_response().map(|r| r.status().as_u16()),
            err.code(),
            err.message().unwrap_or(detail.as_str()),
        ),
    }
}

/// A paused or suspended account rejects every send; fail before the run.
fn ensure_sending_enabled(sending_enabled: bool) -> Result<(), TransportError> {
    if sending_enabled {
        return Ok(());
    }
    Err(TransportError::Credentials {
        code: "SendingDisabled".to_string(),
        message: "sending is disabled for this SES account".to_string(),
    })
}

#[async_trait]
impl TransportClient for SesClient {
    async fn verify(&self) -> Result<(), TransportError> {
        let account = self.client.get_account().send().await.map_err(|e| {
            let err = classify_sdk_error(&e);
            error!(code = %err.code(), error = %err, "ses_verify_failed");
            err
        })?;

        info!(
            sending_enabled = account.sending_enabled(),
            production_access = account.production_access_enabled(),
            send_quota = ?account.send_quota(),
            "ses_account_verified"
        );

        ensure_sending_enabled(account.sending_enabled())
    }

    async fn send(
        &self,
        source: &str,
        destinations: &[String],
        raw_message: &[u8],
    ) -> Result<String, TransportError> {
        debug!(
            source = source,
            destinations = ?destinations,
            raw_length = raw_message.len(),
            "ses_send_starting"
        );

        let raw = RawMessage::builder()
            .data(Blob::new(raw_message))
            .build()
            .map_err(|e| TransportError::Rejected {
                code: "InvalidRawMessage".to_string(),
                message: e.to_string(),
            })?;

        let output = self
            .client
            .send_email()
            .from_email_address(source)
            .destination(
                Destination::builder()
                    .set_to_addresses(Some(destinations.to_vec()))
                    .build(),
            )
            .content(EmailContent::builder().raw(raw).build())
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        Ok(output.message_id().unwrap_or("unknown").to_owned())
    }

    fn name(&self) -> &'static str {
        "ses"
    }
}
