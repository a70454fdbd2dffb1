use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::{AccessRecord, AccessStore, NewPromo, PromoOutcome, TRIAL_DAYS};
use crate::{
    errors::{BotError, BotResult},
    migrations,
};

/// Access records in SQLite. Timestamps are unix seconds.
#[derive(Clone)]
pub struct SqliteAccessStore {
    pool: Arc<SqlitePool>,
}

impl SqliteAccessStore {
    /// Connect and bring the schema up to date
    pub async fn connect(database_url: &str) -> BotResult<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| BotError::StorageError(format!("Failed to connect to database: {}", e)))?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> BotResult<Self> {
        migrations::run_migrations(&pool).await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn timestamp(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn record_from_row(user_id: u64, row: &SqliteRow) -> AccessRecord {
    AccessRecord {
        user_id,
        subscribed: row.get::<Option<i64>, _>("is_subscribed").unwrap_or(0) != 0,
        free_until: timestamp(row.get("free_until")),
        unlimited: row.get::<Option<i64>, _>("has_unlimited").unwrap_or(0) != 0,
    }
}

#[async_trait]
impl AccessStore for SqliteAccessStore {
    async fn get_access(&self, user_id: u64) -> BotResult<Option<AccessRecord>> {
        let row = sqlx::query(
            "SELECT is_subscribed, free_until, has_unlimited FROM users WHERE user_id = ?",
        )
        .bind(user_id as i64)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(|row| record_from_row(user_id, &row)))
    }

    async fn register(&self, user_id: u64, username: &str) -> BotResult<()> {
        let trial_end = (Utc::now() + Duration::days(TRIAL_DAYS)).timestamp();

        let result = sqlx::query(
            "INSERT OR IGNORE INTO users (user_id, username, free_until) VALUES (?, ?, ?)",
        )
        .bind(user_id as i64)
        .bind(username)
        .bind(trial_end)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() > 0 {
            log::info!("Registered user {} ({}) with a {}-day trial", user_id, username, TRIAL_DAYS);
        }
        Ok(())
    }

    async fn set_subscribed(&self, user_id: u64, subscribed: bool) -> BotResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, is_subscribed) VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET is_subscribed = excluded.is_subscribed
            "#,
        )
        .bind(user_id as i64)
        .bind(subscribed as i64)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn redeem_promo(&self, user_id: u64, code: &str) -> BotResult<PromoOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(row) =
            sqlx::query("SELECT days, unlimited FROM promocodes WHERE code = ?")
                .bind(code)
                .fetch_optional(&mut *tx)
                .await?
        else {
            return Ok(PromoOutcome::NotFound);
        };
        let days: i64 = row.get::<Option<i64>, _>("days").unwrap_or(0);
        let unlimited = row.get::<Option<i64>, _>("unlimited").unwrap_or(0) != 0;

        let used_before = sqlx::query("SELECT 1 FROM promocode_usages WHERE user_id = ? AND code = ?")
            .bind(user_id as i64)
            .bind(code)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if used_before {
            return Ok(PromoOutcome::AlreadyUsed);
        }

        // Counting and the limit check happen in one statement.
        let counted = sqlx::query(
            "UPDATE promocodes SET used_count = used_count + 1 \
             WHERE code = ? AND (unlimited = 1 OR used_count < max_uses)",
        )
        .bind(code)
        .execute(&mut *tx)
        .await?;
        if counted.rows_affected() == 0 {
            return Ok(PromoOutcome::Exhausted);
        }

        let now = Utc::now();
        if unlimited {
            sqlx::query(
                r#"
                INSERT INTO users (user_id, has_unlimited) VALUES (?, 1)
                ON CONFLICT(user_id) DO UPDATE SET has_unlimited = 1
                "#,
            )
            .bind(user_id as i64)
            .execute(&mut *tx)
            .await?;
        } else {
            let until = (now + Duration::days(days)).timestamp();
            sqlx::query(
                r#"
                INSERT INTO users (user_id, free_until) VALUES (?, ?)
                ON CONFLICT(user_id) DO UPDATE SET free_until = excluded.free_until
                "#,
            )
            .bind(user_id as i64)
            .bind(until)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("INSERT INTO promocode_usages (user_id, code, used_at) VALUES (?, ?, ?)")
            .bind(user_id as i64)
            .bind(code)
            .bind(now.timestamp())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        log::info!("User {} redeemed promo code {}", user_id, code);
        Ok(PromoOutcome::Applied { unlimited, days })
    }

    /// Extends from the later of now and the current end, in one statement.
    async fn extend_access(&self, user_id: u64, days: i64) -> BotResult<DateTime<Utc>> {
        let now = Utc::now().timestamp();
        let secs = Duration::days(days).num_seconds();

        let until: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (user_id, free_until) VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE
                SET free_until = MAX(COALESCE(users.free_until, 0), ?) + ?
            RETURNING free_until
            "#,
        )
        .bind(user_id as i64)
        .bind(now + secs)
        .bind(now)
        .bind(secs)
        .fetch_one(self.pool.as_ref())
        .await?;

        let new_until = timestamp(Some(until))
            .ok_or_else(|| BotError::StorageError(format!("Bad free_until {until}")))?;
        log::info!("Access extended for user {}: until {}", user_id, new_until);

        Ok(new_until)
    }

    async fn add_promo(&self, promo: &NewPromo) -> BotResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO promocodes (code, days, max_uses, unlimited) VALUES (?, ?, ?, ?)",
        )
        .bind(&promo.code)
        .bind(promo.days)
        .bind(promo.max_uses)
        .bind(promo.unlimited as i64)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
