//! Postgres-backed stock store.
//!
//! ## Locking
//!
//! `lock_record` first inserts an empty row with `ON CONFLICT DO NOTHING`
//! and then takes `SELECT … FOR UPDATE`, so even first-time keys are
//! serialized. Callers lock keys in `StockKey` order; two transactions
//! touching the same pair of keys therefore cannot deadlock.
//!
//! ## Error Mapping
//!
//! | SQLx error | SQLSTATE | `StorageError` |
//! |------------|----------|----------------|
//! | Database | `40001` serialization failure | `Conflict` |
//! | Database | `40P01` deadlock detected | `Conflict` |
//! | Database | `55P03` lock not available | `Conflict` |
//! | Database | `23505` unique violation | `Conflict` |
//! | Database | `57014` statement timeout | `Unavailable` |
//! | Database | any other | `Backend` |
//! | PoolClosed / PoolTimedOut / Io / Tls | n/a | `Unavailable` |
//! | ColumnDecode / Decode / ColumnNotFound | n/a | `Corrupt` |
//! | Other | n/a | `Backend` |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockkeep_core::{MovementId, ProductId, UserId, VariantId};
use stockkeep_inventory::{
    LedgerTotals, Location, Movement, MovementType, StockKey, StockRecord,
};

use super::query::{MovementFilter, MovementPage, Pagination};
use super::{LedgerSnapshot, StockStore, StockTransaction, StorageError};
use crate::config::DatabaseConfig;

const SCHEMA: &str = include_str!("../../migrations/0001_stock_ledger.sql");

const RECORD_COLUMNS: &str = "product_id, variant_id, location, quantity_available, \
     quantity_reserved, quantity_sold, reorder_level, version, active, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, product_id, variant_id, location, movement_type, quantity, \
     performed_by, notes, reason, transaction_reference, created_at";

#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool sized from configuration.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StorageError::Unavailable("database.url is not set".to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTransaction { tx })
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn stock_record(&self, key: &StockKey) -> Result<Option<StockRecord>, StorageError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records \
             WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 AND location = $3"
        );
        let row = sqlx::query(&sql)
            .bind(*key.product_id.as_uuid())
            .bind(key.variant_id.map(|v| *v.as_uuid()))
            .bind(key.location.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("stock_record", e))?;

        row.as_ref().map(decode_record).transpose()
    }

    #[instrument(skip(self), fields(location = ?location.map(Location::as_str)), err)]
    async fn stock_levels(
        &self,
        location: Option<&Location>,
    ) -> Result<Vec<StockRecord>, StorageError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records \
             WHERE ($1::text IS NULL OR location = $1) \
             ORDER BY product_id, variant_id NULLS FIRST, location"
        );
        let rows = sqlx::query(&sql)
            .bind(location.map(Location::as_str))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("stock_levels", e))?;

        rows.iter().map(decode_record).collect()
    }

    #[instrument(skip(self), fields(location = ?location.map(Location::as_str)), err)]
    async fn ledger_snapshot(
        &self,
        location: Option<&Location>,
    ) -> Result<LedgerSnapshot, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records WHERE ($1::text IS NULL OR location = $1)"
        );
        let record_rows = sqlx::query(&sql)
            .bind(location.map(Location::as_str))
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("snapshot_records", e))?;

        let total_rows = sqlx::query(
            r#"
            SELECT product_id, variant_id, location,
                   SUM(quantity)::BIGINT AS quantity,
                   COUNT(*) AS movements
            FROM stock_movements
            WHERE ($1::text IS NULL OR location = $1)
            GROUP BY product_id, variant_id, location
            "#,
        )
        .bind(location.map(Location::as_str))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("snapshot_totals", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let records = record_rows
            .iter()
            .map(decode_record)
            .collect::<Result<Vec<_>, _>>()?;

        let mut totals = HashMap::with_capacity(total_rows.len());
        for row in &total_rows {
            let key = decode_key(row)?;
            let quantity: i64 = row.try_get("quantity").map_err(corrupt)?;
            let movements: i64 = row.try_get("movements").map_err(corrupt)?;
            let movements = u64::try_from(movements)
                .map_err(|_| StorageError::Corrupt(format!("negative movement count for {key}")))?;
            totals.insert(key, LedgerTotals { quantity, movements });
        }

        Ok(LedgerSnapshot { records, totals })
    }

    #[instrument(skip(self, filter), fields(limit = pagination.limit, offset = pagination.offset), err)]
    async fn query_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StorageError> {
        const WHERE: &str = r#"
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR variant_id = $2)
              AND ($3::text IS NULL OR location = $3)
              AND ($4::text IS NULL OR movement_type = $4)
              AND ($5::uuid IS NULL OR performed_by = $5)
              AND ($6::text IS NULL OR transaction_reference = $6)
              AND ($7::timestamptz IS NULL OR created_at >= $7)
              AND ($8::timestamptz IS NULL OR created_at <= $8)
        "#;

        let count_sql = format!("SELECT COUNT(*) AS total FROM stock_movements {WHERE}");
        let total: i64 = bind_filter(sqlx::query(&count_sql), filter)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_movements", e))?
            .try_get("total")
            .map_err(corrupt)?;

        let page_sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements {WHERE} \
             ORDER BY created_at DESC, id DESC LIMIT $9 OFFSET $10"
        );
        let rows = bind_filter(sqlx::query(&page_sql), filter)
            .bind(i64::from(pagination.limit))
            .bind(i64::from(pagination.offset))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("query_movements", e))?;

        let movements = rows
            .iter()
            .map(decode_movement)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MovementPage::new(
            movements,
            u64::try_from(total).unwrap_or(0),
            pagination,
        ))
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>;

fn bind_filter<'q>(query: PgQuery<'q>, filter: &'q MovementFilter) -> PgQuery<'q> {
    query
        .bind(filter.product_id.map(|p| *p.as_uuid()))
        .bind(filter.variant_id.map(|v| *v.as_uuid()))
        .bind(filter.location.as_ref().map(Location::as_str))
        .bind(filter.movement_type.map(|t| t.as_str()))
        .bind(filter.performed_by.map(|u| *u.as_uuid()))
        .bind(filter.transaction_reference.as_deref())
        .bind(filter.created_after)
        .bind(filter.created_before)
}

/// An open Postgres transaction. Dropping it rolls back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl StockTransaction for PostgresTransaction {
    #[instrument(skip(self), fields(key = %key), err)]
    async fn lock_record(&mut self, key: &StockKey) -> Result<StockRecord, StorageError> {
        sqlx::query(
            r#"
            INSERT INTO stock_records (product_id, variant_id, location)
            VALUES ($1, $2, $3)
            ON CONFLICT ON CONSTRAINT stock_records_key DO NOTHING
            "#,
        )
        .bind(*key.product_id.as_uuid())
        .bind(key.variant_id.map(|v| *v.as_uuid()))
        .bind(key.location.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_record", e))?;

        self.lock_existing(key).await?.ok_or_else(|| {
            StorageError::Backend(format!("record {key} vanished after insert"))
        })
    }

    async fn lock_existing(&mut self, key: &StockKey) -> Result<Option<StockRecord>, StorageError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records \
             WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 AND location = $3 \
             FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(*key.product_id.as_uuid())
            .bind(key.variant_id.map(|v| *v.as_uuid()))
            .bind(key.location.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_record", e))?;

        row.as_ref().map(decode_record).transpose()
    }

    async fn save_record(&mut self, record: &StockRecord) -> Result<(), StorageError> {
        let version = i64::try_from(record.version)
            .map_err(|_| StorageError::Backend("record version out of range".to_string()))?;
        let result = sqlx::query(
            r#"
            UPDATE stock_records
            SET quantity_available = $4,
                quantity_reserved = $5,
                quantity_sold = $6,
                reorder_level = $7,
                version = $8,
                active = $9,
                updated_at = $10
            WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 AND location = $3
            "#,
        )
        .bind(*record.key.product_id.as_uuid())
        .bind(record.key.variant_id.map(|v| *v.as_uuid()))
        .bind(record.key.location.as_str())
        .bind(record.quantity_available)
        .bind(record.quantity_reserved)
        .bind(record.quantity_sold)
        .bind(record.reorder_level)
        .bind(version)
        .bind(record.active)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_record", e))?;

        if result.rows_affected() != 1 {
            return Err(StorageError::Backend(format!(
                "record {} was not locked in this transaction",
                record.key
            )));
        }
        Ok(())
    }

    async fn append_movement(&mut self, movement: &Movement) -> Result<(), StorageError> {
        let sql = format!(
            "INSERT INTO stock_movements ({MOVEMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        );
        sqlx::query(&sql)
            .bind(*movement.id.as_uuid())
            .bind(*movement.key.product_id.as_uuid())
            .bind(movement.key.variant_id.map(|v| *v.as_uuid()))
            .bind(movement.key.location.as_str())
            .bind(movement.movement_type.as_str())
            .bind(movement.quantity)
            .bind(movement.performed_by.map(|u| *u.as_uuid()))
            .bind(movement.notes.as_deref())
            .bind(movement.reason.as_deref())
            .bind(movement.transaction_reference.as_deref())
            .bind(movement.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("append_movement", e))?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StorageError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StorageError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn corrupt(err: sqlx::Error) -> StorageError {
    StorageError::Corrupt(err.to_string())
}

fn decode_key(row: &PgRow) -> Result<StockKey, StorageError> {
    let product_id: Uuid = row.try_get("product_id").map_err(corrupt)?;
    let variant_id: Option<Uuid> = row.try_get("variant_id").map_err(corrupt)?;
    let location: String = row.try_get("location").map_err(corrupt)?;
    let location = Location::new(&location).map_err(|e| StorageError::Corrupt(e.to_string()))?;
    Ok(StockKey::new(
        ProductId::from_uuid(product_id),
        variant_id.map(VariantId::from_uuid),
        location,
    ))
}

fn decode_record(row: &PgRow) -> Result<StockRecord, StorageError> {
    StockRecordRow::from_row(row)
        .map_err(corrupt)?
        .into_record(decode_key(row)?)
}

fn decode_movement(row: &PgRow) -> Result<Movement, StorageError> {
    MovementRow::from_row(row)
        .map_err(corrupt)?
        .into_movement(decode_key(row)?)
}

/// Non-key columns of `stock_records`.
#[derive(Debug)]
struct StockRecordRow {
    quantity_available: i64,
    quantity_reserved: i64,
    quantity_sold: i64,
    reorder_level: i64,
    version: i64,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for StockRecordRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            quantity_available: row.try_get("quantity_available")?,
            quantity_reserved: row.try_get("quantity_reserved")?,
            quantity_sold: row.try_get("quantity_sold")?,
            reorder_level: row.try_get("reorder_level")?,
            version: row.try_get("version")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl StockRecordRow {
    fn into_record(self, key: StockKey) -> Result<StockRecord, StorageError> {
        let version = u64::try_from(self.version)
            .map_err(|_| StorageError::Corrupt(format!("negative version for {key}")))?;
        Ok(StockRecord {
            key,
            quantity_available: self.quantity_available,
            quantity_reserved: self.quantity_reserved,
            quantity_sold: self.quantity_sold,
            reorder_level: self.reorder_level,
            version,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Non-key columns of `stock_movements`.
#[derive(Debug)]
struct MovementRow {
    id: Uuid,
    movement_type: String,
    quantity: i64,
    performed_by: Option<Uuid>,
    notes: Option<String>,
    reason: Option<String>,
    transaction_reference: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            movement_type: row.try_get("movement_type")?,
            quantity: row.try_get("quantity")?,
            performed_by: row.try_get("performed_by")?,
            notes: row.try_get("notes")?,
            reason: row.try_get("reason")?,
            transaction_reference: row.try_get("transaction_reference")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl MovementRow {
    fn into_movement(self, key: StockKey) -> Result<Movement, StorageError> {
        let movement_type = self
            .movement_type
            .parse::<MovementType>()
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(Movement {
            id: MovementId::from_uuid(self.id),
            key,
            movement_type,
            quantity: self.quantity,
            performed_by: self.performed_by.map(UserId::from_uuid),
            notes: self.notes,
            reason: self.reason,
            transaction_reference: self.transaction_reference,
            created_at: self.created_at,
        })
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") | Some("55P03") | Some("23505") => {
                    StorageError::Conflict(msg)
                }
                Some("57014") => StorageError::Unavailable(msg),
                _ => StorageError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StorageError::Unavailable(format!("connection pool unavailable in {operation}: {err}"))
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StorageError::Unavailable(format!("connection error in {operation}: {err}"))
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_) => {
            StorageError::Corrupt(format!("undecodable row in {operation}: {err}"))
        }
        _ => StorageError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_retryable() {
        assert!(map_sqlx_error("op", sqlx::Error::PoolClosed).is_retryable());
        assert!(map_sqlx_error("op", sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn missing_rows_are_backend_errors() {
        let err = map_sqlx_error("op", sqlx::Error::RowNotFound);
        assert!(matches!(err, StorageError::Backend(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn missing_columns_are_corruption() {
        let err = map_sqlx_error("op", sqlx::Error::ColumnNotFound("x".to_string()));
        assert!(matches!(err, StorageError::Corrupt(_)));
    }

    #[test]
    fn schema_declares_both_tables() {
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS stock_records"));
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS stock_movements"));
        assert!(SCHEMA.contains("NULLS NOT DISTINCT"));
    }
}
