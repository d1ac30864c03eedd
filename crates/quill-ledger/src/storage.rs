use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use quill_types::{EntryId, LedgerEntry, LedgerEventType, PendingEntry, UserId};

use crate::error::LedgerError;

/// Ledger persistence backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStorageConfig {
    /// Keep all entries in process memory only.
    Memory,
    /// Mirror all entries to PostgreSQL and hydrate on startup.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl LedgerStorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

impl Default for LedgerStorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Durable mirror for ledger and pending entries.
///
/// The in-memory chain stays authoritative; this store receives every entry
/// before the in-memory commit and feeds hydration on startup. Schema is
/// provisioned once through [`migrate`](Self::migrate) — the request path
/// assumes the tables exist and fails fast otherwise.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(storage_err)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// One-time schema provisioning. Never called on the request path.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quill_ledger_entries (
                seq BIGSERIAL PRIMARY KEY,
                id UUID NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                reason_code TEXT NOT NULL,
                amount BIGINT NOT NULL,
                balance_after BIGINT NOT NULL,
                metadata JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS quill_ledger_entries_user_idx \
             ON quill_ledger_entries (user_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quill_pending_entries (
                seq BIGSERIAL PRIMARY KEY,
                id UUID NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                reason_code TEXT NOT NULL,
                amount BIGINT NOT NULL,
                metadata JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        info!("ledger schema migrated");
        Ok(())
    }

    pub async fn insert_entry(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO quill_ledger_entries \
             (id, user_id, event_type, reason_code, amount, balance_after, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id.0)
        .bind(&entry.user_id.0)
        .bind(entry.event_type.to_string())
        .bind(&entry.reason_code)
        .bind(entry.amount)
        .bind(entry.balance_after)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    pub async fn insert_pending(&self, entry: &PendingEntry) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO quill_pending_entries \
             (id, user_id, event_type, reason_code, amount, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.id.0)
        .bind(&entry.user_id.0)
        .bind(entry.event_type.to_string())
        .bind(&entry.reason_code)
        .bind(entry.amount)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    /// All mirrored entries in append order.
    pub async fn load_entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query(
            "SELECT id, user_id, event_type, reason_code, amount, balance_after, \
             metadata, created_at FROM quill_ledger_entries ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let event_type: String = row.try_get("event_type").map_err(storage_err)?;
            entries.push(LedgerEntry {
                id: EntryId(row.try_get("id").map_err(storage_err)?),
                user_id: UserId(row.try_get("user_id").map_err(storage_err)?),
                event_type: parse_event_type(&event_type)?,
                reason_code: row.try_get("reason_code").map_err(storage_err)?,
                amount: row.try_get("amount").map_err(storage_err)?,
                balance_after: row.try_get("balance_after").map_err(storage_err)?,
                metadata: row.try_get("metadata").map_err(storage_err)?,
                created_at: row.try_get("created_at").map_err(storage_err)?,
            });
        }
        Ok(entries)
    }
}

fn parse_event_type(raw: &str) -> Result<LedgerEventType, LedgerError> {
    match raw {
        "EARN" => Ok(LedgerEventType::Earn),
        "SPEND" => Ok(LedgerEventType::Spend),
        "PENALTY" => Ok(LedgerEventType::Penalty),
        "ADJUSTMENT" => Ok(LedgerEventType::Adjustment),
        other => Err(LedgerError::Storage(format!(
            "unknown event type in mirror: {}",
            other
        ))),
    }
}

fn storage_err(err: sqlx::Error) -> LedgerError {
    LedgerError::Storage(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_round_trip_through_text() {
        for event in [
            LedgerEventType::Earn,
            LedgerEventType::Spend,
            LedgerEventType::Penalty,
            LedgerEventType::Adjustment,
        ] {
            assert_eq!(parse_event_type(&event.to_string()).unwrap(), event);
        }
        assert!(parse_event_type("BONUS").is_err());
    }

    #[test]
    fn config_labels() {
        assert_eq!(LedgerStorageConfig::memory().label(), "memory");
        assert_eq!(
            LedgerStorageConfig::postgres("postgres://localhost/quill", 5).label(),
            "postgres"
        );
    }
}
