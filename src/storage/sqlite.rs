//! SQLite implementation of OrderStore.

use crate::domain::{
    Direction, NewOrder, NewUser, Order, OrderStatus, OrderUpdate, PaymentType, SettingValue,
    Statistics, User,
};
use crate::storage::{OrderStore, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};

const ORDER_COLUMNS: &str = "id, external_id, user_id, direction, amount_fiat, amount_crypto, rate, \
     processing_fee, admin_fee, total_amount, payment_type, destination, requisites, status, \
     is_problematic, received_amount, operator_notes, created_at, updated_at";

const USER_COLUMNS: &str = "id, username, first_name, registered_at, is_blocked, total_operations, \
     total_amount, referred_by, referral_count, last_review_at";

/// SqliteStorage implements OrderStore using SQLite.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

/// SqliteStorageConfig holds SQLite storage configuration.
#[derive(Debug, Clone)]
pub struct SqliteStorageConfig {
    /// Path to the SQLite database file.
    pub path: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
}

impl Default for SqliteStorageConfig {
    fn default() -> Self {
        Self {
            path: "exchange.db".to_string(),
            max_connections: 5,
        }
    }
}

impl From<&crate::config::StorageConfig> for SqliteStorageConfig {
    fn from(config: &crate::config::StorageConfig) -> Self {
        Self {
            path: config.path.clone(),
            max_connections: config.max_connections,
        }
    }
}

impl SqliteStorage {
    /// Creates a new SQLite storage instance.
    pub async fn new(config: SqliteStorageConfig) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let storage = Self { pool };

        storage.migrate().await?;

        info!(path = %config.path, "SQLite storage initialized");
        Ok(storage)
    }

    /// Runs database migrations to create the schema.
    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT,
                user_id INTEGER NOT NULL,
                direction TEXT NOT NULL,
                amount_fiat TEXT NOT NULL,
                amount_crypto TEXT NOT NULL,
                rate TEXT NOT NULL,
                processing_fee TEXT NOT NULL,
                admin_fee TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                payment_type TEXT NOT NULL,
                destination TEXT NOT NULL,
                requisites TEXT,
                status TEXT NOT NULL,
                is_problematic INTEGER NOT NULL DEFAULT 0,
                received_amount TEXT,
                operator_notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT,
                registered_at TEXT NOT NULL,
                is_blocked INTEGER NOT NULL DEFAULT 0,
                total_operations INTEGER NOT NULL DEFAULT 0,
                total_amount TEXT NOT NULL DEFAULT '0',
                referred_by INTEGER,
                referral_count INTEGER NOT NULL DEFAULT 0,
                last_review_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_user_id ON orders(user_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_external_id ON orders(external_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_orders_status_created_at ON orders(status, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Fixed-width UTC timestamps so that text comparison matches time order.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Appends `WHERE id = ? AND status IN (...)` to a conditional update.
fn push_id_and_status_in(builder: &mut QueryBuilder<'_, Sqlite>, id: i64, from: &[OrderStatus]) {
    builder.push(" WHERE id = ").push_bind(id);
    builder.push(" AND status IN (");
    let mut statuses = builder.separated(", ");
    for status in from {
        statuses.push_bind(status.as_str());
    }
    statuses.push_unseparated(")");
}

#[async_trait]
impl OrderStore for SqliteStorage {
    async fn create_order(&self, order: &NewOrder) -> Result<Order, StorageError> {
        let now = format_ts(Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                user_id, direction, amount_fiat, amount_crypto, rate, processing_fee,
                admin_fee, total_amount, payment_type, destination, status,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            "#,
        )
        .bind(order.user_id)
        .bind(order.direction.to_string())
        .bind(order.amount_fiat.to_string())
        .bind(order.amount_crypto.to_string())
        .bind(order.rate.to_string())
        .bind(order.processing_fee.to_string())
        .bind(order.admin_fee.to_string())
        .bind(order.total_amount.to_string())
        .bind(order.payment_type.to_string())
        .bind(&order.destination)
        .bind(OrderStatus::Created.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();

        debug!(id, user_id = order.user_id, total = %order.total_amount, "Order saved");

        self.get_order(id)
            .await?
            .ok_or_else(|| StorageError::InvalidData(format!("order {} vanished after insert", id)))
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, StorageError> {
        let row = sqlx::query(&format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(parse_order_row).transpose()
    }

    async fn get_order_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Order>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE external_id = ? ORDER BY id DESC LIMIT 1",
            ORDER_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(parse_order_row).transpose()
    }

    async fn update_order(&self, id: i64, update: &OrderUpdate) -> Result<bool, StorageError> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET updated_at = ");
        builder.push_bind(format_ts(Utc::now()));

        if let Some(status) = update.status {
            builder.push(", status = ").push_bind(status.as_str());
        }
        if let Some(is_problematic) = update.is_problematic {
            builder.push(", is_problematic = ").push_bind(is_problematic);
        }
        if let Some(ref requisites) = update.requisites {
            builder.push(", requisites = ").push_bind(requisites.clone());
        }
        if let Some(ref external_id) = update.external_id {
            builder.push(", external_id = ").push_bind(external_id.clone());
        }
        if let Some(ref notes) = update.operator_notes {
            builder.push(", operator_notes = ").push_bind(notes.clone());
        }

        builder.push(" WHERE id = ").push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_user_orders(&self, user_id: i64, limit: i64) -> Result<Vec<Order>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE user_id = ? ORDER BY id DESC LIMIT ?",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_order_row).collect()
    }

    async fn transition_status(
        &self,
        id: i64,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<bool, StorageError> {
        if from.is_empty() {
            return Ok(false);
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET status = ");
        builder.push_bind(to.as_str());
        builder.push(", updated_at = ").push_bind(format_ts(Utc::now()));
        push_id_and_status_in(&mut builder, id, from);

        let result = builder.build().execute(&self.pool).await?;
        let applied = result.rows_affected() > 0;

        debug!(id, to = %to, applied, "Order status transition");
        Ok(applied)
    }

    async fn bind_processor(
        &self,
        id: i64,
        external_id: &str,
        requisites: &str,
    ) -> Result<bool, StorageError> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET external_id = ");
        builder.push_bind(external_id);
        builder.push(", requisites = ").push_bind(requisites);
        builder.push(", status = ").push_bind(OrderStatus::Waiting.as_str());
        builder.push(", updated_at = ").push_bind(format_ts(Utc::now()));
        push_id_and_status_in(
            &mut builder,
            id,
            &OrderStatus::sources_of(OrderStatus::Waiting),
        );

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_payment(
        &self,
        id: i64,
        received_amount: Option<Decimal>,
        problematic: bool,
    ) -> Result<bool, StorageError> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET status = ");
        builder.push_bind(OrderStatus::PaidByClient.as_str());
        builder
            .push(", received_amount = COALESCE(")
            .push_bind(received_amount.map(|a| a.to_string()))
            .push(", received_amount)");
        builder
            .push(", is_problematic = (is_problematic OR ")
            .push_bind(problematic)
            .push(")");
        builder.push(", updated_at = ").push_bind(format_ts(Utc::now()));
        push_id_and_status_in(
            &mut builder,
            id,
            &OrderStatus::sources_of(OrderStatus::PaidByClient),
        );

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete_order(&self, id: i64) -> Result<bool, StorageError> {
        let now = format_ts(Utc::now());
        let mut tx = self.pool.begin().await?;

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET status = ");
        builder.push_bind(OrderStatus::Completed.as_str());
        builder.push(", updated_at = ").push_bind(now.clone());
        push_id_and_status_in(
            &mut builder,
            id,
            &OrderStatus::sources_of(OrderStatus::Completed),
        );

        let result = builder.build().execute(&mut *tx).await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let row = sqlx::query("SELECT user_id, total_amount FROM orders WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        let user_id: i64 = row.try_get("user_id")?;
        let order_total = parse_decimal(&row, "total_amount")?;

        sqlx::query(
            "INSERT INTO users (id, registered_at) VALUES (?1, ?2) ON CONFLICT(id) DO NOTHING",
        )
        .bind(user_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query("SELECT total_amount FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        let user_total = parse_decimal(&row, "total_amount")?;
        let new_total = user_total.checked_add(order_total).ok_or_else(|| {
            StorageError::InvalidData(format!("user {} total overflows", user_id))
        })?;

        sqlx::query(
            "UPDATE users SET total_operations = total_operations + 1, total_amount = ?1 WHERE id = ?2",
        )
        .bind(new_total.to_string())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(id, user_id, total = %order_total, "Order completed");
        Ok(true)
    }

    async fn escalate_order(&self, id: i64) -> Result<bool, StorageError> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET status = ");
        builder.push_bind(OrderStatus::Problem.as_str());
        builder.push(", is_problematic = 1, updated_at = ");
        builder.push_bind(format_ts(Utc::now()));
        push_id_and_status_in(&mut builder, id, &OrderStatus::escalation_sources());

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_orders_created_before(
        &self,
        status: OrderStatus,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Order>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE status = ? AND created_at < ? ORDER BY created_at ASC",
            ORDER_COLUMNS
        ))
        .bind(status.as_str())
        .bind(format_ts(created_before))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_order_row).collect()
    }

    async fn get_setting(&self, key: &str) -> Result<Option<SettingValue>, StorageError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("value")?;
                let value = serde_json::from_str(&raw).map_err(|e| {
                    StorageError::InvalidData(format!("Invalid setting {}: {}", key, e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set_setting(&self, key: &str, value: &SettingValue) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| StorageError::InvalidData(format!("Invalid setting {}: {}", key, e)))?;

        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(raw)
        .bind(format_ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        debug!(key, kind = value.kind(), "Setting saved");
        Ok(())
    }

    async fn add_user(&self, user: &NewUser) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, username, first_name, registered_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(format_ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(parse_user_row).transpose()
    }

    async fn set_user_blocked(&self, id: i64, blocked: bool) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE users SET is_blocked = ? WHERE id = ?")
            .bind(blocked)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn link_referral(&self, user_id: i64, referrer_id: i64) -> Result<bool, StorageError> {
        if user_id == referrer_id {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;

        let linked = sqlx::query(
            "UPDATE users SET referred_by = ?1 WHERE id = ?2 AND referred_by IS NULL",
        )
        .bind(referrer_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if linked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let counted =
            sqlx::query("UPDATE users SET referral_count = referral_count + 1 WHERE id = ?")
                .bind(referrer_id)
                .execute(&mut *tx)
                .await?;

        if counted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn touch_review(&self, user_id: i64, at: DateTime<Utc>) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE users SET last_review_at = ? WHERE id = ?")
            .bind(format_ts(at))
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_statistics(&self, today_start: DateTime<Utc>) -> Result<Statistics, StorageError> {
        let total_users: i64 = sqlx::query("SELECT COUNT(*) AS count FROM users")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;

        let total_orders: i64 = sqlx::query("SELECT COUNT(*) AS count FROM orders")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;

        let today = format_ts(today_start);

        let today_orders: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM orders WHERE created_at >= ?")
                .bind(&today)
                .fetch_one(&self.pool)
                .await?
                .try_get("count")?;

        let completed = sqlx::query("SELECT total_amount, created_at FROM orders WHERE status = ?")
            .bind(OrderStatus::Completed.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut stats = Statistics {
            total_users,
            total_orders,
            today_orders,
            ..Default::default()
        };

        for row in &completed {
            let amount = parse_decimal(row, "total_amount")?;
            let created_at: String = row.try_get("created_at")?;

            stats.completed_orders += 1;
            stats.total_volume += amount;
            if created_at >= today {
                stats.today_volume += amount;
            }
        }

        Ok(stats)
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

fn parse_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, StorageError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw)
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
}

fn parse_optional_decimal(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, StorageError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        Decimal::from_str(&s)
            .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
    })
    .transpose()
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
}

/// Parses an order from a database row.
fn parse_order_row(row: &SqliteRow) -> Result<Order, StorageError> {
    let direction_str: String = row.try_get("direction")?;
    let direction = Direction::from_str(&direction_str).map_err(StorageError::InvalidData)?;

    let payment_type_str: String = row.try_get("payment_type")?;
    let payment_type =
        PaymentType::from_str(&payment_type_str).map_err(StorageError::InvalidData)?;

    let status_str: String = row.try_get("status")?;
    let status = OrderStatus::from_str(&status_str).map_err(StorageError::InvalidData)?;

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Order {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        user_id: row.try_get("user_id")?,
        direction,
        amount_fiat: parse_decimal(row, "amount_fiat")?,
        amount_crypto: parse_decimal(row, "amount_crypto")?,
        rate: parse_decimal(row, "rate")?,
        processing_fee: parse_decimal(row, "processing_fee")?,
        admin_fee: parse_decimal(row, "admin_fee")?,
        total_amount: parse_decimal(row, "total_amount")?,
        payment_type,
        destination: row.try_get("destination")?,
        requisites: row.try_get("requisites")?,
        status,
        is_problematic: row.try_get("is_problematic")?,
        received_amount: parse_optional_decimal(row, "received_amount")?,
        operator_notes: row.try_get("operator_notes")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

/// Parses a user from a database row.
fn parse_user_row(row: &SqliteRow) -> Result<User, StorageError> {
    let registered_at: String = row.try_get("registered_at")?;
    let last_review_at: Option<String> = row.try_get("last_review_at")?;

    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        registered_at: parse_timestamp(&registered_at, "registered_at")?,
        is_blocked: row.try_get("is_blocked")?,
        total_operations: row.try_get("total_operations")?,
        total_amount: parse_decimal(row, "total_amount")?,
        referred_by: row.try_get("referred_by")?,
        referral_count: row.try_get("referral_count")?,
        last_review_at: last_review_at
            .as_deref()
            .map(|ts| parse_timestamp(ts, "last_review_at"))
            .transpose()?,
    })
}
