//! PostgreSQL snapshot writer and crash-recovery reader.
//!
//! This module provides:
//! - the schema DDL for the durable tables
//! - `DeadlineRecovery` trait for reading unfinished heists at startup
//! - `PgRecoveryReader` adapter implementing the trait
//! - account snapshot upsert/load for durable ledger state
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use racket_domain::{Account, Counters, Heist, HeistPhase, Skills, Stats};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::sync::Arc;

/// Schema for the durable tables, applied idempotently at startup.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    account_id      BIGINT PRIMARY KEY,
    username        TEXT,
    cash            NUMERIC(18, 2) NOT NULL DEFAULT 0,
    debt            NUMERIC(18, 2) NOT NULL DEFAULT 0,
    crypto          NUMERIC(18, 4) NOT NULL DEFAULT 0,
    reputation      BIGINT NOT NULL DEFAULT 0,
    skills          TEXT NOT NULL,
    exp             BIGINT NOT NULL DEFAULT 0,
    level           BIGINT NOT NULL DEFAULT 1,
    stats           TEXT NOT NULL,
    counters        TEXT NOT NULL,
    referrer        BIGINT,
    referral_reward_given BOOLEAN NOT NULL DEFAULT FALSE,
    created_at      TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    order_id        UUID PRIMARY KEY,
    owner_id        BIGINT NOT NULL,
    side            TEXT NOT NULL,
    price           BIGINT NOT NULL,
    remaining       NUMERIC(18, 4) NOT NULL,
    collateral      NUMERIC(18, 4) NOT NULL,
    status          TEXT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_orders_book
    ON orders (side, price, created_at) WHERE status = 'active';

CREATE TABLE IF NOT EXISTS trades (
    trade_id        UUID PRIMARY KEY,
    buy_order       UUID NOT NULL,
    sell_order      UUID NOT NULL,
    buyer_id        BIGINT NOT NULL,
    seller_id       BIGINT NOT NULL,
    amount          NUMERIC(18, 4) NOT NULL,
    price           BIGINT NOT NULL,
    executed_at     TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS heists (
    heist_id        UUID PRIMARY KEY,
    room_id         BIGINT NOT NULL,
    template        TEXT NOT NULL,
    pot             BIGINT NOT NULL,
    bonus           NUMERIC(18, 4) NOT NULL DEFAULT 0,
    bonus_share     NUMERIC(18, 4) NOT NULL DEFAULT 0,
    phase           TEXT NOT NULL,
    join_deadline   TIMESTAMPTZ NOT NULL,
    split_deadline  TIMESTAMPTZ NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_heists_live_room
    ON heists (room_id) WHERE phase <> 'finished';

CREATE TABLE IF NOT EXISTS participants (
    heist_id        UUID NOT NULL,
    account_id      BIGINT NOT NULL,
    base_share      NUMERIC(18, 2) NOT NULL DEFAULT 0,
    current_share   NUMERIC(18, 2) NOT NULL DEFAULT 0,
    defense_bonus   BIGINT NOT NULL DEFAULT 0,
    joined_at       TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (heist_id, account_id)
);

CREATE TABLE IF NOT EXISTS betrayals (
    betrayal_id     UUID PRIMARY KEY,
    heist_id        UUID NOT NULL,
    attacker_id     BIGINT NOT NULL,
    target_id       BIGINT NOT NULL,
    success         BOOLEAN NOT NULL,
    amount          NUMERIC(18, 2) NOT NULL,
    occurred_at     TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS cooldowns (
    account_id      BIGINT NOT NULL,
    action          TEXT NOT NULL,
    last_attempt    TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (account_id, action)
);

CREATE TABLE IF NOT EXISTS settings (
    key             TEXT PRIMARY KEY,
    value           TEXT NOT NULL
);
"#;

/// Apply the schema idempotently.
pub async fn init_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Trait for reading unfinished heists from the durable store.
///
/// This allows the scheduler to re-arm deadline tasks after a restart
/// without coupling it directly to PostgreSQL.
#[async_trait]
pub trait DeadlineRecovery: Send + Sync {
    /// Every heist whose phase is not `finished`, with its deadlines.
    async fn find_unfinished_heists(&self) -> Result<Vec<Heist>, StoreError>;
}

/// PostgreSQL adapter for recovery reads.
pub struct PgRecoveryReader {
    /// PostgreSQL connection pool
    pool: Arc<PgPool>,
}

impl PgRecoveryReader {
    /// Create a new PostgreSQL recovery reader.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DeadlineRecovery for PgRecoveryReader {
    async fn find_unfinished_heists(&self) -> Result<Vec<Heist>, StoreError> {
        find_unfinished_heists(&self.pool).await
    }
}

/// Read every non-finished heist from the durable store.
pub async fn find_unfinished_heists(pool: &PgPool) -> Result<Vec<Heist>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT heist_id, room_id, template, pot, bonus, bonus_share,
               phase, join_deadline, split_deadline, created_at
        FROM heists
        WHERE phase <> 'finished'
        ORDER BY created_at
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_heist_row).collect()
}

fn parse_heist_row(row: &sqlx::postgres::PgRow) -> Result<Heist, StoreError> {
    let phase = match row.try_get::<String, _>("phase")?.as_str() {
        "joining" => HeistPhase::Joining,
        "splitting" => HeistPhase::Splitting,
        "finished" => HeistPhase::Finished,
        other => {
            return Err(StoreError::Serialization(format!("unknown heist phase: {}", other)));
        },
    };
    Ok(Heist {
        id: row.try_get("heist_id")?,
        room: row.try_get("room_id")?,
        template: row.try_get("template")?,
        pot: row.try_get("pot")?,
        bonus: row.try_get("bonus")?,
        bonus_share: row.try_get("bonus_share")?,
        phase,
        join_deadline: row.try_get::<DateTime<Utc>, _>("join_deadline")?,
        split_deadline: row.try_get::<DateTime<Utc>, _>("split_deadline")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

/// Upsert one account snapshot.
///
/// Nested value groups (skills, stats, counters) are serialized as JSON
/// text; the in-memory row stays the source of truth between snapshots.
pub async fn upsert_account(pool: &PgPool, account: &Account) -> Result<(), StoreError> {
    let skills = serde_json::to_string(&account.skills)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let stats = serde_json::to_string(&account.stats)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let counters = serde_json::to_string(&account.counters)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO accounts (
            account_id, username, cash, debt, crypto, reputation,
            skills, exp, level, stats, counters,
            referrer, referral_reward_given, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (account_id) DO UPDATE SET
            username = EXCLUDED.username,
            cash = EXCLUDED.cash,
            debt = EXCLUDED.debt,
            crypto = EXCLUDED.crypto,
            reputation = EXCLUDED.reputation,
            skills = EXCLUDED.skills,
            exp = EXCLUDED.exp,
            level = EXCLUDED.level,
            stats = EXCLUDED.stats,
            counters = EXCLUDED.counters,
            referrer = EXCLUDED.referrer,
            referral_reward_given = EXCLUDED.referral_reward_given
        "#,
    )
    .bind(account.id)
    .bind(&account.username)
    .bind(account.cash)
    .bind(account.debt)
    .bind(account.crypto)
    .bind(account.reputation)
    .bind(skills)
    .bind(account.exp)
    .bind(account.level)
    .bind(stats)
    .bind(counters)
    .bind(account.referrer)
    .bind(account.referral_reward_given)
    .bind(account.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load every account snapshot.
pub async fn load_accounts(pool: &PgPool) -> Result<Vec<Account>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT account_id, username, cash, debt, crypto, reputation,
               skills, exp, level, stats, counters,
               referrer, referral_reward_given, created_at
        FROM accounts
        ORDER BY account_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_account_row).collect()
}

fn parse_account_row(row: &sqlx::postgres::PgRow) -> Result<Account, StoreError> {
    let skills: Skills = serde_json::from_str(&row.try_get::<String, _>("skills")?)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let stats: Stats = serde_json::from_str(&row.try_get::<String, _>("stats")?)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let counters: Counters = serde_json::from_str(&row.try_get::<String, _>("counters")?)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    Ok(Account {
        id: row.try_get("account_id")?,
        username: row.try_get("username")?,
        cash: row.try_get::<Decimal, _>("cash")?,
        debt: row.try_get::<Decimal, _>("debt")?,
        crypto: row.try_get::<Decimal, _>("crypto")?,
        reputation: row.try_get("reputation")?,
        skills,
        exp: row.try_get("exp")?,
        level: row.try_get("level")?,
        stats,
        counters,
        referrer: row.try_get("referrer")?,
        referral_reward_given: row.try_get("referral_reward_given")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}
