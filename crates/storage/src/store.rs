use async_trait::async_trait;
use cashlens_categorize::{Categorizer, RuleSource, SourceError};
use cashlens_core::{CategorizationRule, RuleId, UserId};
use std::sync::Arc;
use tracing::info;

use crate::db::{self, DbPool, RuleStats, StorageError};

impl From<StorageError> for SourceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Database(e) => SourceError::Unavailable(e.to_string()),
            other => SourceError::Invalid(other.to_string()),
        }
    }
}

/// Serves categorization rules out of SQLite.
#[derive(Debug, Clone)]
pub struct SqliteRuleStore {
    pool: DbPool,
}

impl SqliteRuleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        Ok(Self::new(db::connect(database_url).await?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl RuleSource for SqliteRuleStore {
    async fn global_rules(&self) -> Result<Vec<CategorizationRule>, SourceError> {
        Ok(db::get_global_rules(&self.pool).await?)
    }

    async fn personal_rules(&self, user: UserId) -> Result<Vec<CategorizationRule>, SourceError> {
        Ok(db::get_user_rules(&self.pool, user).await?)
    }
}

/// Rule mutations that keep a categorizer's cache coherent with the store.
pub struct RuleAdmin {
    store: SqliteRuleStore,
    categorizer: Arc<Categorizer>,
}

impl RuleAdmin {
    pub fn new(store: SqliteRuleStore, categorizer: Arc<Categorizer>) -> Self {
        Self { store, categorizer }
    }

    pub async fn create(&self, rule: &CategorizationRule) -> Result<(), StorageError> {
        db::insert_rule(self.store.pool(), rule).await?;
        info!(rule = %rule.id, category = %rule.category, "created rule");
        self.categorizer.rules_changed(&rule.scope).await;
        Ok(())
    }

    /// Updates a rule; if it moved between scopes both caches are dropped.
    pub async fn update(&self, rule: &CategorizationRule) -> Result<(), StorageError> {
        let previous = db::get_rule(self.store.pool(), rule.id)
            .await?
            .ok_or(StorageError::NotFound(rule.id))?;
        db::update_rule(self.store.pool(), rule).await?;
        info!(rule = %rule.id, "updated rule");

        self.categorizer.rules_changed(&rule.scope).await;
        if previous.scope != rule.scope {
            self.categorizer.rules_changed(&previous.scope).await;
        }
        Ok(())
    }

    pub async fn set_active(&self, id: RuleId, active: bool) -> Result<(), StorageError> {
        let rule = db::get_rule(self.store.pool(), id)
            .await?
            .ok_or(StorageError::NotFound(id))?;
        db::set_rule_active(self.store.pool(), id, active).await?;
        self.categorizer.rules_changed(&rule.scope).await;
        Ok(())
    }

    pub async fn delete(&self, id: RuleId) -> Result<(), StorageError> {
        let rule = db::get_rule(self.store.pool(), id)
            .await?
            .ok_or(StorageError::NotFound(id))?;
        db::delete_rule(self.store.pool(), id).await?;
        info!(rule = %id, "deleted rule");
        self.categorizer.rules_changed(&rule.scope).await;
        Ok(())
    }

    pub async fn stats(&self, user: UserId) -> Result<RuleStats, StorageError> {
        db::rule_stats(self.store.pool(), user).await
    }
}
