use cashlens_core::UserId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::strategy::CompiledRule;

pub type RuleSet = Arc<[CompiledRule]>;

/// Rules as loaded at one instant.
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    pub rules: RuleSet,
    loaded_at: Instant,
}

impl RuleSnapshot {
    pub fn new(rules: RuleSet) -> Self {
        RuleSnapshot {
            rules,
            loaded_at: Instant::now(),
        }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() < ttl
    }
}

/// Result of consulting one cache slot.
#[derive(Debug, Clone)]
pub enum Lookup {
    Fresh(RuleSet),
    Stale(RuleSet),
    Missing,
}

impl Lookup {
    fn from_snapshot(snapshot: Option<&RuleSnapshot>, ttl: Duration) -> Self {
        match snapshot {
            Some(s) if s.is_fresh(ttl) => Lookup::Fresh(s.rules.clone()),
            Some(s) => Lookup::Stale(s.rules.clone()),
            None => Lookup::Missing,
        }
    }
}

/// Token taken before a reload starts. An install presenting a ticket older
/// than the latest invalidation is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

/// Global and per-identity rule snapshots with a shared staleness window.
#[derive(Debug)]
pub struct RuleCache {
    ttl: Duration,
    global: RwLock<Option<RuleSnapshot>>,
    personal: RwLock<HashMap<UserId, RuleSnapshot>>,
    global_epoch: AtomicU64,
    personal_epoch: AtomicU64,
}

impl RuleCache {
    pub fn new(ttl: Duration) -> Self {
        RuleCache {
            ttl,
            global: RwLock::new(None),
            personal: RwLock::new(HashMap::new()),
            global_epoch: AtomicU64::new(0),
            personal_epoch: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn global(&self) -> Lookup {
        Lookup::from_snapshot(self.global.read().await.as_ref(), self.ttl)
    }

    pub async fn personal(&self, user: UserId) -> Lookup {
        Lookup::from_snapshot(self.personal.read().await.get(&user), self.ttl)
    }

    pub fn global_ticket(&self) -> LoadTicket {
        LoadTicket(self.global_epoch.load(Ordering::Acquire))
    }

    pub fn personal_ticket(&self) -> LoadTicket {
        LoadTicket(self.personal_epoch.load(Ordering::Acquire))
    }

    /// Installs a freshly loaded global rule set. Returns false if the global
    /// snapshot was invalidated after `ticket` was taken.
    pub async fn install_global(&self, rules: RuleSet, ticket: LoadTicket) -> bool {
        let mut slot = self.global.write().await;
        if self.global_ticket() != ticket {
            debug!("global rules invalidated during reload, not caching");
            return false;
        }
        *slot = Some(RuleSnapshot::new(rules));
        true
    }

    /// Installs a personal rule set. The personal epoch is shared across
    /// identities, so an invalidation of any identity voids in-flight loads.
    pub async fn install_personal(&self, user: UserId, rules: RuleSet, ticket: LoadTicket) -> bool {
        let mut map = self.personal.write().await;
        if self.personal_ticket() != ticket {
            debug!(user = %user, "personal rules invalidated during reload, not caching");
            return false;
        }
        map.insert(user, RuleSnapshot::new(rules));
        true
    }

    /// Evicts personal snapshots older than two TTL windows, except `keep`'s.
    /// Returns the evicted identities.
    pub async fn evict_idle(&self, keep: UserId) -> Vec<UserId> {
        let limit = self.ttl.saturating_mul(2);
        let mut map = self.personal.write().await;
        let idle: Vec<UserId> = map
            .iter()
            .filter(|(user, snapshot)| **user != keep && !snapshot.is_fresh(limit))
            .map(|(user, _)| *user)
            .collect();
        for user in &idle {
            map.remove(user);
        }
        if !idle.is_empty() {
            debug!(evicted = idle.len(), "evicted idle personal rules");
        }
        idle
    }

    pub async fn invalidate_global(&self) {
        let mut slot = self.global.write().await;
        self.global_epoch.fetch_add(1, Ordering::AcqRel);
        *slot = None;
    }

    pub async fn invalidate_personal(&self, user: UserId) {
        let mut map = self.personal.write().await;
        self.personal_epoch.fetch_add(1, Ordering::AcqRel);
        map.remove(&user);
    }

    pub async fn global_len(&self) -> usize {
        self.global.read().await.as_ref().map_or(0, |s| s.rules.len())
    }

    pub async fn identities(&self) -> usize {
        self.personal.read().await.len()
    }
}
