use async_trait::async_trait;
use thiserror::Error;

use intake_core::domain::customer::{Customer, CustomerCode, CustomerId, NewCustomer};
use intake_core::domain::order::{NewOrder, Order, OrderId, PlacedOrder};

pub mod customer;
pub mod memory;
pub mod order;
pub mod session;

pub use customer::SqlCustomerRepository;
pub use memory::InMemoryIntakeRepository;
pub use order::SqlOrderRepository;
pub use session::{AuthSession, SqlSessionRepository};

/// Opens a transaction holding the SQLite write lock from its first statement,
/// so concurrent writers queue on `busy_timeout` instead of failing.
pub(crate) const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("customer code `{0}` is already assigned")]
    DuplicateCode(CustomerCode),
    #[error("customer {0} does not exist")]
    CustomerNotFound(CustomerId),
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Inserts in its own transaction. A taken code yields `DuplicateCode`.
    async fn insert(&self, customer: NewCustomer) -> Result<Customer, RepositoryError>;
    async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError>;
    async fn find_by_code(&self, code: &CustomerCode)
        -> Result<Option<Customer>, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Resolves the owning customer and inserts the order atomically. Nothing
    /// is written when the customer is missing.
    async fn place(&self, order: NewOrder) -> Result<PlacedOrder, RepositoryError>;
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;
    async fn list_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Order>, RepositoryError>;
}
