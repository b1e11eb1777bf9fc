use async_trait::async_trait;
use cashlens_core::{CategorizationRule, RuleId, RuleScope, UserId};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rule source unavailable: {0}")]
    Unavailable(String),
    #[error("invalid rule data: {0}")]
    Invalid(String),
}

/// Where categorization rules come from. Implementations return active
/// rules ordered by descending priority.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn global_rules(&self) -> Result<Vec<CategorizationRule>, SourceError>;

    async fn personal_rules(&self, user: UserId) -> Result<Vec<CategorizationRule>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<CategorizationRule>,
}

/// Rules held in memory, loaded from code or a TOML `[[rules]]` file.
#[derive(Debug, Default)]
pub struct InMemoryRuleSource {
    rules: RwLock<Vec<CategorizationRule>>,
    global_loads: AtomicUsize,
    personal_loads: AtomicUsize,
}

impl InMemoryRuleSource {
    pub fn new(rules: Vec<CategorizationRule>) -> Self {
        InMemoryRuleSource {
            rules: RwLock::new(rules),
            ..Default::default()
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, SourceError> {
        let file: RuleFile =
            toml::from_str(content).map_err(|e| SourceError::Invalid(e.to_string()))?;
        Ok(Self::new(file.rules))
    }

    pub fn insert(&self, rule: CategorizationRule) {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rule);
    }

    /// Replaces the keyword of rule `id`; returns false if no such rule exists.
    pub fn set_keyword(&self, id: RuleId, keyword: &str) -> bool {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        match rules.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.keyword = keyword.to_string();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: RuleId) -> Option<CategorizationRule> {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let index = rules.iter().position(|r| r.id == id)?;
        Some(rules.remove(index))
    }

    pub fn len(&self) -> usize {
        self.rules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `global_rules` calls served so far.
    pub fn global_loads(&self) -> usize {
        self.global_loads.load(Ordering::SeqCst)
    }

    /// Number of `personal_rules` calls served so far.
    pub fn personal_loads(&self) -> usize {
        self.personal_loads.load(Ordering::SeqCst)
    }

    fn scoped(&self, scope: RuleScope) -> Vec<CategorizationRule> {
        let mut selected: Vec<CategorizationRule> = self
            .rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.scope == scope)
            .cloned()
            .collect();
        // Stable, so equal priorities keep insertion order.
        selected.sort_by(|a, b| b.priority.cmp(&a.priority));
        selected
    }
}

#[async_trait]
impl RuleSource for InMemoryRuleSource {
    async fn global_rules(&self) -> Result<Vec<CategorizationRule>, SourceError> {
        self.global_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.scoped(RuleScope::Global))
    }

    async fn personal_rules(&self, user: UserId) -> Result<Vec<CategorizationRule>, SourceError> {
        self.personal_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.scoped(RuleScope::Personal(user)))
    }
}
