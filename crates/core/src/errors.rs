use thiserror::Error;

use crate::domain::customer::{CustomerCode, CustomerId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("customer {0} does not exist")]
    CustomerNotFound(CustomerId),
    #[error("amount must be non-negative")]
    NegativeAmount,
    #[error("invalid order time `{0}`")]
    InvalidTime(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("customer code `{0}` is already assigned")]
    CodeConflict(CustomerCode),
    #[error("no unique customer code found after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },
    #[error("{resource} {id} was not found")]
    NotFound { resource: &'static str, id: i64 },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Error shape handed to callers. `message` on client-facing variants is
/// already safe to expose.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("method not allowed: {message}")]
    MethodNotAllowed { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::MethodNotAllowed { message, .. } => message,
            Self::Internal { .. } => "Internal server error",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::MethodNotAllowed { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::MethodNotAllowed { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::MissingFields(_)) => Self::BadRequest {
                message: "Missing required fields".to_owned(),
                correlation_id: unassigned(),
            },
            ApplicationError::Domain(DomainError::CustomerNotFound(_)) => Self::BadRequest {
                message: "Customer does not exist".to_owned(),
                correlation_id: unassigned(),
            },
            ApplicationError::Domain(DomainError::NegativeAmount) => Self::BadRequest {
                message: "Amount must be non-negative".to_owned(),
                correlation_id: unassigned(),
            },
            ApplicationError::Domain(DomainError::InvalidTime(_)) => Self::BadRequest {
                message: "Invalid order time".to_owned(),
                correlation_id: unassigned(),
            },
            ApplicationError::CodeConflict(_) => Self::Conflict {
                message: "Customer code already exists".to_owned(),
                correlation_id: unassigned(),
            },
            ApplicationError::NotFound { resource, .. } => Self::NotFound {
                message: format!("{resource} not found"),
                correlation_id: unassigned(),
            },
            ApplicationError::AllocationExhausted { .. }
            | ApplicationError::Persistence(_)
            | ApplicationError::Configuration(_) => {
                Self::Internal { message: value.to_string(), correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::customer::{CustomerCode, CustomerId};
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn missing_fields_map_to_bad_request_with_correlation_id() {
        let interface = ApplicationError::from(DomainError::MissingFields(vec!["name"]))
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(interface.user_message(), "Missing required fields");
    }

    #[test]
    fn unknown_customer_maps_to_bad_request() {
        let interface = ApplicationError::from(DomainError::CustomerNotFound(CustomerId(9999)))
            .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert_eq!(interface.user_message(), "Customer does not exist");
    }

    #[test]
    fn code_conflict_maps_to_conflict() {
        let interface = ApplicationError::CodeConflict(CustomerCode("CUST12345".to_owned()))
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(interface.correlation_id(), "req-3");
    }

    #[test]
    fn persistence_error_hides_internal_detail() {
        let interface = ApplicationError::Persistence("database is locked".to_owned())
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "Internal server error");
        assert!(interface.to_string().contains("database is locked"));
    }

    #[test]
    fn allocation_exhaustion_is_internal() {
        let interface =
            ApplicationError::AllocationExhausted { attempts: 5 }.into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
    }
}
