use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use intake_core::config::SmsConfig;
use intake_core::notify::{
    DeliveryReport, DeliveryStatus, NotificationError, Notifier, RecipientDelivery,
};

/// Recipient status codes the gateway uses for processed, sent and queued.
const ACCEPTED_STATUS_CODES: &[u16] = &[100, 101, 102];

#[derive(Debug, Error)]
pub enum GatewayBuildError {
    #[error("sms.username is not configured")]
    MissingUsername,
    #[error("sms.api_key is not configured")]
    MissingApiKey,
    #[error("sms http client could not be built: {0}")]
    Client(#[source] reqwest::Error),
}

pub struct SmsGateway {
    client: Client,
    endpoint: String,
    username: String,
    api_key: SecretString,
    sender_id: Option<String>,
}

impl std::fmt::Debug for SmsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsGateway")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("sender_id", &self.sender_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(rename = "SMSMessageData")]
    data: MessageData,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Recipients", default)]
    recipients: Vec<GatewayRecipient>,
}

#[derive(Debug, Deserialize)]
struct GatewayRecipient {
    #[serde(rename = "statusCode")]
    status_code: u16,
    number: String,
    status: String,
    #[serde(rename = "messageId", default)]
    message_id: Option<String>,
}

impl SmsGateway {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        api_key: SecretString,
        sender_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayBuildError> {
        let client =
            Client::builder().timeout(timeout).build().map_err(GatewayBuildError::Client)?;
        Ok(Self { client, endpoint: endpoint.into(), username: username.into(), api_key, sender_id })
    }

    pub fn from_config(config: &SmsConfig) -> Result<Self, GatewayBuildError> {
        let username = config
            .username
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(GatewayBuildError::MissingUsername)?;
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or(GatewayBuildError::MissingApiKey)?;

        Self::new(
            config.base_url.clone(),
            username,
            api_key,
            config.sender_id.clone().filter(|value| !value.trim().is_empty()),
            Duration::from_secs(config.timeout_secs.max(1)),
        )
    }
}

#[async_trait]
impl Notifier for SmsGateway {
    async fn send(
        &self,
        message: &str,
        recipients: &[String],
    ) -> Result<DeliveryReport, NotificationError> {
        if recipients.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let to = recipients.join(",");
        let mut form = vec![
            ("username", self.username.as_str()),
            ("to", to.as_str()),
            ("message", message),
        ];
        if let Some(sender_id) = &self.sender_id {
            form.push(("from", sender_id.as_str()));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("apiKey", self.api_key.expose_secret())
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|error| NotificationError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "sms.gateway.rejected",
                status = status.as_u16(),
                "sms gateway rejected request"
            );
            return Err(NotificationError::Rejected { status: status.as_u16(), body });
        }

        let payload: SendResponse =
            response.json().await.map_err(|error| NotificationError::Decode(error.to_string()))?;
        debug!(
            event_name = "sms.gateway.response_received",
            summary = %payload.data.message,
            "sms gateway response received"
        );

        let report = DeliveryReport {
            recipients: payload
                .data
                .recipients
                .into_iter()
                .map(|recipient| {
                    let accepted = ACCEPTED_STATUS_CODES.contains(&recipient.status_code);
                    RecipientDelivery {
                        number: recipient.number,
                        status: if accepted {
                            DeliveryStatus::Accepted
                        } else {
                            DeliveryStatus::Failed
                        },
                        detail: recipient.status,
                        message_id: recipient.message_id.filter(|id| id != "None"),
                    }
                })
                .collect(),
        };

        if report.accepted() == 0 {
            let detail = if report.recipients.is_empty() {
                payload.data.message
            } else {
                report
                    .recipients
                    .iter()
                    .map(|entry| format!("{}: {}", entry.number, entry.detail))
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            return Err(NotificationError::Undelivered(detail));
        }

        Ok(report)
    }
}
