use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::customer::Customer;
use crate::domain::order::Order;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("gateway request failed: {0}")]
    Transport(String),
    #[error("gateway rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("gateway response could not be decoded: {0}")]
    Decode(String),
    #[error("message was not accepted for any recipient: {0}")]
    Undelivered(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Accepted,
    Failed,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecipientDelivery {
    pub number: String,
    pub status: DeliveryStatus,
    pub detail: String,
    pub message_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub recipients: Vec<RecipientDelivery>,
}

impl DeliveryReport {
    pub fn accepted(&self) -> usize {
        self.recipients.iter().filter(|entry| entry.status == DeliveryStatus::Accepted).count()
    }
}

/// Outbound message channel. Callers treat delivery as best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        message: &str,
        recipients: &[String],
    ) -> Result<DeliveryReport, NotificationError>;

    fn is_noop(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(
        &self,
        _message: &str,
        recipients: &[String],
    ) -> Result<DeliveryReport, NotificationError> {
        Ok(DeliveryReport {
            recipients: recipients
                .iter()
                .map(|number| RecipientDelivery {
                    number: number.clone(),
                    status: DeliveryStatus::Skipped,
                    detail: "notifications disabled".to_string(),
                    message_id: None,
                })
                .collect(),
        })
    }

    fn is_noop(&self) -> bool {
        true
    }
}

pub fn order_notification(customer: &Customer, order: &Order) -> String {
    format!(
        "Hello {}, your order #{} for {} (amount {}) has been received.",
        customer.name, order.id, order.item, order.amount
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{order_notification, DeliveryStatus, NoopNotifier, Notifier};
    use crate::domain::customer::{Customer, CustomerCode, CustomerId};
    use crate::domain::order::{Order, OrderId};

    #[tokio::test]
    async fn noop_notifier_skips_every_recipient() {
        let notifier = NoopNotifier;
        let report = notifier
            .send("hello", &["+254700000000".to_string(), "+254711111111".to_string()])
            .await
            .expect("noop send never fails");

        assert!(notifier.is_noop());
        assert_eq!(report.recipients.len(), 2);
        assert_eq!(report.accepted(), 0);
        assert!(report.recipients.iter().all(|entry| entry.status == DeliveryStatus::Skipped));
    }

    #[test]
    fn order_notification_mentions_item_and_amount() {
        let customer = Customer {
            id: CustomerId(1),
            name: "John Doe".to_string(),
            code: CustomerCode("CUST12345".to_string()),
            phone_number: "+254701234567".to_string(),
        };
        let order = Order {
            id: OrderId(7),
            customer_id: customer.id,
            item: "Product A".to_string(),
            amount: Decimal::new(15_075, 2),
            time: Utc::now(),
        };

        let message = order_notification(&customer, &order);

        assert!(message.contains("John Doe"));
        assert!(message.contains("Product A"));
        assert!(message.contains("150.75"));
        assert!(message.contains("#7"));
    }
}
