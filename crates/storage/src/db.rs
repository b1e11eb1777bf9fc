use cashlens_core::{CategorizationRule, MatchStrategy, RuleId, RuleScope, UserId};
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use thiserror::Error;
use uuid::Uuid;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid {column} in rule {id}: '{value}'")]
    InvalidColumn {
        id: String,
        column: &'static str,
        value: String,
    },
    #[error("rule not found: {0}")]
    NotFound(RuleId),
}

/// Opens a pool on `database_url` and brings the schema up to date.
pub async fn connect(database_url: &str) -> Result<DbPool, StorageError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categorization_rules (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            user_id TEXT,
            keyword TEXT NOT NULL,
            category TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            match_type TEXT NOT NULL DEFAULT 'substring',
            similarity_threshold REAL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rules_user ON categorization_rules (user_id, is_active)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

type RuleRow = (String, Option<String>, String, String, i32, String, Option<f64>);

const RULE_COLUMNS: &str =
    "id, user_id, keyword, category, priority, match_type, similarity_threshold";

fn parse_uuid(id: &str, column: &'static str, value: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(value).map_err(|_| StorageError::InvalidColumn {
        id: id.to_string(),
        column,
        value: value.to_string(),
    })
}

fn rule_from_row(row: RuleRow) -> Result<CategorizationRule, StorageError> {
    let (id, user_id, keyword, category, priority, match_type, threshold) = row;
    let scope = match user_id {
        Some(user) => RuleScope::Personal(UserId(parse_uuid(&id, "user_id", &user)?)),
        None => RuleScope::Global,
    };
    Ok(CategorizationRule {
        id: parse_uuid(&id, "id", &id)?,
        keyword,
        category,
        priority,
        strategy: MatchStrategy::from_parts(&match_type, threshold),
        scope,
    })
}

fn scope_user(scope: &RuleScope) -> Option<String> {
    match scope {
        RuleScope::Global => None,
        RuleScope::Personal(user) => Some(user.to_string()),
    }
}

pub async fn insert_rule(pool: &DbPool, rule: &CategorizationRule) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO categorization_rules (id, user_id, keyword, category, priority, match_type, similarity_threshold) VALUES (?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(rule.id.to_string())
    .bind(scope_user(&rule.scope))
    .bind(&rule.keyword)
    .bind(&rule.category)
    .bind(rule.priority)
    .bind(rule.strategy.name())
    .bind(rule.strategy.threshold())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_rule(pool: &DbPool, rule: &CategorizationRule) -> Result<(), StorageError> {
    let result = sqlx::query(
        "UPDATE categorization_rules SET user_id = ?, keyword = ?, category = ?, priority = ?, match_type = ?, similarity_threshold = ? WHERE id = ?"
    )
    .bind(scope_user(&rule.scope))
    .bind(&rule.keyword)
    .bind(&rule.category)
    .bind(rule.priority)
    .bind(rule.strategy.name())
    .bind(rule.strategy.threshold())
    .bind(rule.id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound(rule.id));
    }
    Ok(())
}

pub async fn set_rule_active(pool: &DbPool, id: RuleId, active: bool) -> Result<(), StorageError> {
    let result = sqlx::query("UPDATE categorization_rules SET is_active = ? WHERE id = ?")
        .bind(active)
        .bind(id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound(id));
    }
    Ok(())
}

pub async fn delete_rule(pool: &DbPool, id: RuleId) -> Result<(), StorageError> {
    let result = sqlx::query("DELETE FROM categorization_rules WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound(id));
    }
    Ok(())
}

/// Looks up a rule by id whether or not it is active.
pub async fn get_rule(
    pool: &DbPool,
    id: RuleId,
) -> Result<Option<CategorizationRule>, StorageError> {
    let row = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM categorization_rules WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(rule_from_row).transpose()
}

/// Active global rules, highest priority first, then in creation order.
pub async fn get_global_rules(pool: &DbPool) -> Result<Vec<CategorizationRule>, StorageError> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM categorization_rules WHERE user_id IS NULL AND is_active = 1 ORDER BY priority DESC, seq ASC"
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(rule_from_row).collect()
}

/// Active personal rules for `user`, highest priority first, then in creation order.
pub async fn get_user_rules(
    pool: &DbPool,
    user: UserId,
) -> Result<Vec<CategorizationRule>, StorageError> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM categorization_rules WHERE user_id = ? AND is_active = 1 ORDER BY priority DESC, seq ASC"
    ))
    .bind(user.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(rule_from_row).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleStats {
    pub global_rules: i64,
    pub user_rules: i64,
    pub global_categories: i64,
    pub user_categories: i64,
}

/// Counts of active rules and distinct categories, globally and for `user`.
pub async fn rule_stats(pool: &DbPool, user: UserId) -> Result<RuleStats, StorageError> {
    let (global_rules, user_rules, global_categories, user_categories) =
        sqlx::query_as::<_, (i64, i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM categorization_rules WHERE user_id IS NULL AND is_active = 1),
                (SELECT COUNT(*) FROM categorization_rules WHERE user_id = ?1 AND is_active = 1),
                (SELECT COUNT(DISTINCT category) FROM categorization_rules WHERE user_id IS NULL AND is_active = 1),
                (SELECT COUNT(DISTINCT category) FROM categorization_rules WHERE user_id = ?1 AND is_active = 1)
            "#,
        )
        .bind(user.to_string())
        .fetch_one(pool)
        .await?;

    Ok(RuleStats {
        global_rules,
        user_rules,
        global_categories,
        user_categories,
    })
}
