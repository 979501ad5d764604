use chrono::{DateTime, Utc};
use sqlx::Row;

use super::RepositoryError;
use crate::DbPool;

/// Server-side login session. `state_token` and `nonce` are set while a login
/// is in flight; `claims_json` once the provider has vouched for the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthSession {
    pub id: String,
    pub state_token: Option<String>,
    pub nonce: Option<String>,
    pub claims_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_authenticated(&self, now: DateTime<Utc>) -> bool {
        self.claims_json.is_some() && !self.is_expired(now)
    }
}

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, session: &AuthSession) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO auth_session (id, state_token, nonce, claims_json, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.state_token)
        .bind(&session.nonce)
        .bind(&session.claims_json)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find(&self, id: &str) -> Result<Option<AuthSession>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, state_token, nonce, claims_json, created_at, expires_at
             FROM auth_session WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    /// Clears the pending state token if it matches. Returns `false` when the
    /// token was wrong or already consumed, so a callback can succeed once.
    pub async fn consume_state(&self, id: &str, state_token: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE auth_session SET state_token = NULL WHERE id = ? AND state_token = ?",
        )
        .bind(id)
        .bind(state_token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Re-keys a pending session under `new_id` and marks it authenticated.
    /// The pre-login id stops resolving. Returns `false` when `id` is unknown.
    pub async fn promote(
        &self,
        id: &str,
        new_id: &str,
        claims_json: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE auth_session
             SET id = ?, claims_json = ?, nonce = NULL, expires_at = ?
             WHERE id = ?",
        )
        .bind(new_id)
        .bind(claims_json)
        .bind(expires_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM auth_session WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Removes sessions past their expiry and returns how many were dropped.
    /// Every timestamp is written by `to_rfc3339` in UTC, so text order is
    /// time order.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM auth_session WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<AuthSession, RepositoryError> {
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let expires_at: String =
        row.try_get("expires_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(AuthSession {
        id: row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        state_token: row.try_get("state_token").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        nonce: row.try_get("nonce").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        claims_json: row.try_get("claims_json").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        created_at: parse_timestamp(&created_at)?,
        expires_at: parse_timestamp(&expires_at)?,
    })
}
