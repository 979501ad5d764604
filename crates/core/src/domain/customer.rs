use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub i64);

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public identifier handed to customers, distinct from the surrogate id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerCode(pub String);

impl CustomerCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub code: CustomerCode,
    pub phone_number: String,
}

/// Unvalidated customer input as received from a caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CustomerDraft {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomerFields {
    pub name: String,
    pub phone_number: String,
    pub code: Option<CustomerCode>,
}

/// A customer row ready to be inserted: every field resolved, no id yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCustomer {
    pub name: String,
    pub phone_number: String,
    pub code: CustomerCode,
}

impl CustomerDraft {
    pub fn validate(self) -> Result<CustomerFields, DomainError> {
        let name = present(self.name);
        let phone_number = present(self.phone_number);

        let mut missing = Vec::new();
        if name.is_none() {
            missing.push("name");
        }
        if phone_number.is_none() {
            missing.push("phone_number");
        }

        match (name, phone_number) {
            (Some(name), Some(phone_number)) => Ok(CustomerFields {
                name,
                phone_number,
                code: present(self.code).map(CustomerCode),
            }),
            _ => Err(DomainError::MissingFields(missing)),
        }
    }
}

impl CustomerFields {
    pub fn with_code(&self, code: CustomerCode) -> NewCustomer {
        NewCustomer { name: self.name.clone(), phone_number: self.phone_number.clone(), code }
    }
}

pub(crate) fn present(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
