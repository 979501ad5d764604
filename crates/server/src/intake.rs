//! Write path for customers and orders.
//!
//! Validation runs before any storage call. Customer codes are computed here
//! and retried against the store's unique constraint. Order notifications are
//! sent only after the order row is committed and never change the outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use intake_core::code::CodeAllocator;
use intake_core::config::IntakeConfig;
use intake_core::domain::customer::{Customer, CustomerDraft, CustomerId};
use intake_core::domain::order::{Order, OrderDraft, OrderId, PlacedOrder};
use intake_core::errors::{ApplicationError, DomainError};
use intake_core::notify::{order_notification, Notifier};
use intake_db::repositories::{CustomerRepository, OrderRepository, RepositoryError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntakeSettings {
    pub max_code_attempts: u32,
    pub notification_timeout: Duration,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self { max_code_attempts: 5, notification_timeout: Duration::from_secs(5) }
    }
}

impl From<&IntakeConfig> for IntakeSettings {
    fn from(config: &IntakeConfig) -> Self {
        Self {
            max_code_attempts: config.max_code_attempts.max(1),
            notification_timeout: Duration::from_secs(config.notification_timeout_secs.max(1)),
        }
    }
}

pub struct IntakeService {
    customers: Arc<dyn CustomerRepository>,
    orders: Arc<dyn OrderRepository>,
    codes: Arc<dyn CodeAllocator>,
    notifier: Arc<dyn Notifier>,
    settings: IntakeSettings,
}

impl IntakeService {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        orders: Arc<dyn OrderRepository>,
        codes: Arc<dyn CodeAllocator>,
        notifier: Arc<dyn Notifier>,
        settings: IntakeSettings,
    ) -> Self {
        Self { customers, orders, codes, notifier, settings }
    }

    pub async fn create_customer(&self, draft: CustomerDraft) -> Result<Customer, ApplicationError> {
        let fields = draft.validate()?;

        if let Some(code) = fields.code.clone() {
            return match self.customers.insert(fields.with_code(code)).await {
                Ok(customer) => Ok(customer_created(customer, 1)),
                Err(RepositoryError::DuplicateCode(code)) => {
                    Err(ApplicationError::CodeConflict(code))
                }
                Err(other) => Err(persistence(other)),
            };
        }

        let attempts = self.settings.max_code_attempts.max(1);
        for attempt in 1..=attempts {
            let code = self.codes.allocate();
            match self.customers.insert(fields.with_code(code)).await {
                Ok(customer) => return Ok(customer_created(customer, attempt)),
                Err(RepositoryError::DuplicateCode(code)) => {
                    warn!(
                        event_name = "intake.customer.code_collision",
                        code = %code,
                        attempt,
                        max_attempts = attempts,
                        "allocated customer code already taken"
                    );
                }
                Err(other) => return Err(persistence(other)),
            }
        }

        error!(
            event_name = "intake.customer.code_exhausted",
            attempts,
            "could not allocate a unique customer code"
        );
        Err(ApplicationError::AllocationExhausted { attempts })
    }

    pub async fn create_order(&self, draft: OrderDraft) -> Result<Order, ApplicationError> {
        let order = draft.validate(Utc::now())?;

        let placed = self.orders.place(order).await.map_err(|error| match error {
            RepositoryError::CustomerNotFound(id) => {
                ApplicationError::Domain(DomainError::CustomerNotFound(id))
            }
            other => persistence(other),
        })?;

        info!(
            event_name = "intake.order.created",
            order_id = %placed.order.id,
            customer_id = %placed.customer.id,
            "order committed"
        );

        self.notify_placed(&placed).await;
        Ok(placed.order)
    }

    pub async fn customer(&self, id: CustomerId) -> Result<Customer, ApplicationError> {
        self.customers
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or(ApplicationError::NotFound { resource: "customer", id: id.0 })
    }

    pub async fn order(&self, id: OrderId) -> Result<Order, ApplicationError> {
        self.orders
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or(ApplicationError::NotFound { resource: "order", id: id.0 })
    }

    pub async fn customer_orders(&self, id: CustomerId) -> Result<Vec<Order>, ApplicationError> {
        self.customer(id).await?;
        self.orders.list_for_customer(id).await.map_err(persistence)
    }

    async fn notify_placed(&self, placed: &PlacedOrder) {
        let message = order_notification(&placed.customer, &placed.order);
        let recipients = [placed.customer.phone_number.clone()];

        match tokio::time::timeout(
            self.settings.notification_timeout,
            self.notifier.send(&message, &recipients),
        )
        .await
        {
            Ok(Ok(report)) => info!(
                event_name = "intake.order.notified",
                order_id = %placed.order.id,
                accepted = report.accepted(),
                recipients = report.recipients.len(),
                noop = self.notifier.is_noop(),
                "order notification dispatched"
            ),
            Ok(Err(error)) => warn!(
                event_name = "intake.order.notification_failed",
                order_id = %placed.order.id,
                error = %error,
                "order notification failed"
            ),
            Err(_) => warn!(
                event_name = "intake.order.notification_timeout",
                order_id = %placed.order.id,
                timeout_ms = self.settings.notification_timeout.as_millis() as u64,
                "order notification timed out"
            ),
        }
    }
}

fn customer_created(customer: Customer, attempt: u32) -> Customer {
    info!(
        event_name = "intake.customer.created",
        customer_id = %customer.id,
        code = %customer.code,
        attempt,
        "customer created"
    );
    customer
}

fn persistence(error: RepositoryError) -> ApplicationError {
    error!(event_name = "intake.persistence.error", error = %error, "storage operation failed");
    ApplicationError::Persistence(error.to_string())
}
