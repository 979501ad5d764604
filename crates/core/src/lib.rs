pub mod code;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;

pub use code::{CodeAllocator, RandomCodeAllocator};
pub use domain::customer::{Customer, CustomerCode, CustomerDraft, CustomerFields, CustomerId, NewCustomer};
pub use domain::order::{NewOrder, Order, OrderDraft, OrderId, PlacedOrder};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use notify::{
    DeliveryReport, DeliveryStatus, NoopNotifier, NotificationError, Notifier, RecipientDelivery,
};
