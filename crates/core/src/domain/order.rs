use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::customer::{present, Customer, CustomerId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub item: String,
    pub amount: Decimal,
    pub time: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct OrderDraft {
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub item: String,
    pub amount: Decimal,
    pub time: DateTime<Utc>,
}

/// An order that has been committed together with the customer it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order: Order,
    pub customer: Customer,
}

impl OrderDraft {
    /// Resolves the draft into an insertable order. `now` stands in for a
    /// missing `time`.
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewOrder, DomainError> {
        let item = present(self.item);

        let mut missing = Vec::new();
        if self.customer_id.is_none() {
            missing.push("customer_id");
        }
        if item.is_none() {
            missing.push("item");
        }
        if self.amount.is_none() {
            missing.push("amount");
        }

        let (Some(customer_id), Some(item), Some(amount)) = (self.customer_id, item, self.amount)
        else {
            return Err(DomainError::MissingFields(missing));
        };

        if amount < Decimal::ZERO {
            return Err(DomainError::NegativeAmount);
        }

        let time = match present(self.time) {
            Some(raw) => parse_order_time(&raw)?,
            None => now,
        };

        Ok(NewOrder { customer_id: CustomerId(customer_id), item, amount, time })
    }
}

/// Accepts RFC 3339 timestamps and offset-less ISO 8601 date-times, the
/// latter read as UTC.
pub fn parse_order_time(raw: &str) -> Result<DateTime<Utc>, DomainError> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| DomainError::InvalidTime(raw.to_string()))
}
