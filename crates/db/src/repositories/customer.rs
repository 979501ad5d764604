use chrono::Utc;
use sqlx::Row;

use intake_core::domain::customer::{Customer, CustomerCode, CustomerId, NewCustomer};

use super::{CustomerRepository, RepositoryError, BEGIN_WRITE};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) const CUSTOMER_COLUMNS: &str = "id, name, code, phone_number";

pub(crate) fn row_to_customer(row: &sqlx::sqlite::SqliteRow) -> Result<Customer, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let code: String = row.try_get("code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let phone_number: String =
        row.try_get("phone_number").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Customer { id: CustomerId(id), name, code: CustomerCode(code), phone_number })
}

fn insert_error(error: sqlx::Error, code: &CustomerCode) -> RepositoryError {
    match &error {
        sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
            RepositoryError::DuplicateCode(code.clone())
        }
        _ => RepositoryError::Database(error),
    }
}

#[async_trait::async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn insert(&self, customer: NewCustomer) -> Result<Customer, RepositoryError> {
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;

        let result = sqlx::query(
            "INSERT INTO customer (name, code, phone_number, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&customer.name)
        .bind(customer.code.as_str())
        .bind(&customer.phone_number)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|error| insert_error(error, &customer.code))?;

        tx.commit().await?;

        Ok(Customer {
            id: CustomerId(result.last_insert_rowid()),
            name: customer.name,
            code: customer.code,
            phone_number: customer.phone_number,
        })
    }

    async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CUSTOMER_COLUMNS} FROM customer WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_customer).transpose()
    }

    async fn find_by_code(
        &self,
        code: &CustomerCode,
    ) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CUSTOMER_COLUMNS} FROM customer WHERE code = ?"))
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_customer).transpose()
    }
}

#[cfg(test)]
mod tests {
    use intake_core::domain::customer::{CustomerCode, CustomerId, NewCustomer};

    use crate::repositories::{CustomerRepository, RepositoryError, SqlCustomerRepository};
    use crate::{connect_in_memory, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_in_memory().await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn new_customer(code: &str) -> NewCustomer {
        NewCustomer {
            name: "John Doe".to_string(),
            phone_number: "+254701234567".to_string(),
            code: CustomerCode(code.to_string()),
        }
    }

    #[tokio::test]
    async fn insert_assigns_id_and_round_trips() {
        let pool = setup().await;
        let repo = SqlCustomerRepository::new(pool.clone());

        let created = repo.insert(new_customer("CUST12345")).await.expect("insert customer");
        assert_eq!(created.id, CustomerId(1));

        let by_id = repo.find_by_id(created.id).await.expect("find by id");
        assert_eq!(by_id, Some(created.clone()));

        let by_code = repo
            .find_by_code(&CustomerCode("CUST12345".to_string()))
            .await
            .expect("find by code");
        assert_eq!(by_code, Some(created));

        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_code_is_reported_and_not_persisted() {
        let pool = setup().await;
        let repo = SqlCustomerRepository::new(pool.clone());

        repo.insert(new_customer("CUST55555")).await.expect("first insert");
        let error = repo.insert(new_customer("CUST55555")).await.expect_err("duplicate code");

        assert!(
            matches!(error, RepositoryError::DuplicateCode(ref code) if code.as_str() == "CUST55555")
        );

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customer")
            .fetch_one(&pool)
            .await
            .expect("count customers");
        assert_eq!(count, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn unknown_id_is_absent() {
        let pool = setup().await;
        let repo = SqlCustomerRepository::new(pool.clone());

        let found = repo.find_by_id(CustomerId(42)).await.expect("lookup succeeds");
        assert_eq!(found, None);

        pool.close().await;
    }
}
