use std::collections::BTreeMap;

use tokio::sync::RwLock;

use intake_core::domain::customer::{Customer, CustomerCode, CustomerId, NewCustomer};
use intake_core::domain::order::{NewOrder, Order, OrderId, PlacedOrder};

use super::{CustomerRepository, OrderRepository, RepositoryError};

#[derive(Default)]
struct MemoryState {
    customers: BTreeMap<i64, Customer>,
    orders: BTreeMap<i64, Order>,
    last_customer_id: i64,
    last_order_id: i64,
}

/// Customers and orders behind one lock so order placement can check the
/// owning customer the way the SQL store does inside a transaction.
#[derive(Default)]
pub struct InMemoryIntakeRepository {
    state: RwLock<MemoryState>,
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryIntakeRepository {
    async fn insert(&self, customer: NewCustomer) -> Result<Customer, RepositoryError> {
        let mut state = self.state.write().await;
        if state.customers.values().any(|existing| existing.code == customer.code) {
            return Err(RepositoryError::DuplicateCode(customer.code));
        }

        state.last_customer_id += 1;
        let created = Customer {
            id: CustomerId(state.last_customer_id),
            name: customer.name,
            code: customer.code,
            phone_number: customer.phone_number,
        };
        state.customers.insert(created.id.0, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.customers.get(&id.0).cloned())
    }

    async fn find_by_code(
        &self,
        code: &CustomerCode,
    ) -> Result<Option<Customer>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.customers.values().find(|customer| &customer.code == code).cloned())
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryIntakeRepository {
    async fn place(&self, order: NewOrder) -> Result<PlacedOrder, RepositoryError> {
        let mut state = self.state.write().await;
        let customer = state
            .customers
            .get(&order.customer_id.0)
            .cloned()
            .ok_or(RepositoryError::CustomerNotFound(order.customer_id))?;

        state.last_order_id += 1;
        let placed = Order {
            id: OrderId(state.last_order_id),
            customer_id: order.customer_id,
            item: order.item,
            amount: order.amount,
            time: order.time,
        };
        state.orders.insert(placed.id.0, placed.clone());
        Ok(PlacedOrder { order: placed, customer })
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.orders.get(&id.0).cloned())
    }

    async fn list_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by(|left, right| left.time.cmp(&right.time).then(left.id.cmp(&right.id)));
        Ok(orders)
    }
}
