use cashlens_core::{
    CategorizationRule, RuleId, RuleScope, RuleSettings, TransactionCandidate, UserId,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{Lookup, RuleCache, RuleSet};
use crate::source::{RuleSource, SourceError};
use crate::strategy::{CompiledRule, PatternCache, Subject};

#[derive(Debug, Error)]
pub enum CategorizeError {
    #[error("failed to load global rules: {0}")]
    GlobalRules(#[source] SourceError),
    #[error("failed to load rules for user {user}: {source}")]
    PersonalRules {
        user: UserId,
        #[source]
        source: SourceError,
    },
}

/// The rule that won for a description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub rule_id: RuleId,
    pub category: String,
    pub priority: i32,
    pub score: f64,
    pub scope: RuleScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub global_rules: usize,
    pub cached_identities: usize,
    pub compiled_patterns: usize,
}

/// Assigns categories to transaction descriptions from cached global and
/// personal rules.
pub struct Categorizer {
    source: Arc<dyn RuleSource>,
    cache: RuleCache,
    patterns: PatternCache,
    serve_stale_on_error: bool,
}

impl Categorizer {
    pub fn new(source: Arc<dyn RuleSource>, settings: &RuleSettings) -> Self {
        Categorizer {
            source,
            cache: RuleCache::new(settings.ttl()),
            patterns: PatternCache::new(),
            serve_stale_on_error: settings.serve_stale_on_error,
        }
    }

    /// Category of the best matching rule, or `None` when nothing matches.
    pub async fn categorize(
        &self,
        description: &str,
        user: UserId,
    ) -> Result<Option<String>, CategorizeError> {
        Ok(self.classify(description, user).await?.map(|c| c.category))
    }

    /// Categorizes a parsed statement row by its folded description.
    pub async fn categorize_transaction(
        &self,
        txn: &TransactionCandidate,
        user: UserId,
    ) -> Result<Option<String>, CategorizeError> {
        self.categorize(&txn.folded_description(), user).await
    }

    /// Like [`categorize`](Self::categorize) but reports which rule won and why.
    pub async fn classify(
        &self,
        description: &str,
        user: UserId,
    ) -> Result<Option<Classification>, CategorizeError> {
        let global = self.global_rules().await?;
        let personal = self.personal_rules(user).await?;

        let subject = Subject::new(description);
        let best = best_match(personal.iter().chain(global.iter()), &subject);

        Ok(best.map(|(compiled, score)| {
            let rule = &compiled.rule;
            debug!(
                rule = %rule.id,
                category = %rule.category,
                priority = rule.priority,
                score,
                "matched rule"
            );
            Classification {
                rule_id: rule.id,
                category: rule.category.clone(),
                priority: rule.priority,
                score,
                scope: rule.scope,
            }
        }))
    }

    /// Reloads global rules from the source regardless of freshness.
    pub async fn load_global_rules(&self) -> Result<usize, CategorizeError> {
        Ok(self.reload_global().await?.len())
    }

    /// Reloads one identity's personal rules regardless of freshness.
    pub async fn load_personal_rules(&self, user: UserId) -> Result<usize, CategorizeError> {
        Ok(self.reload_personal(user).await?.len())
    }

    /// Drops the cached personal rules for `user`; the next call reloads them.
    pub async fn invalidate(&self, user: UserId) {
        self.cache.invalidate_personal(user).await;
    }

    pub async fn invalidate_global(&self) {
        self.cache.invalidate_global().await;
    }

    /// Call after any create, update or delete of a rule in `scope`.
    pub async fn rules_changed(&self, scope: &RuleScope) {
        match scope {
            RuleScope::Global => self.invalidate_global().await,
            RuleScope::Personal(user) => self.invalidate(*user).await,
        }
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            global_rules: self.cache.global_len().await,
            cached_identities: self.cache.identities().await,
            compiled_patterns: self.patterns.len(),
        }
    }

    async fn global_rules(&self) -> Result<RuleSet, CategorizeError> {
        let stale = match self.cache.global().await {
            Lookup::Fresh(rules) => return Ok(rules),
            Lookup::Stale(rules) => Some(rules),
            Lookup::Missing => None,
        };
        match self.reload_global().await {
            Ok(rules) => Ok(rules),
            Err(err) => self.fall_back(stale, err),
        }
    }

    async fn personal_rules(&self, user: UserId) -> Result<RuleSet, CategorizeError> {
        let stale = match self.cache.personal(user).await {
            Lookup::Fresh(rules) => return Ok(rules),
            Lookup::Stale(rules) => Some(rules),
            Lookup::Missing => None,
        };
        match self.reload_personal(user).await {
            Ok(rules) => Ok(rules),
            Err(err) => self.fall_back(stale, err),
        }
    }

    fn fall_back(
        &self,
        stale: Option<RuleSet>,
        err: CategorizeError,
    ) -> Result<RuleSet, CategorizeError> {
        match stale {
            Some(rules) if self.serve_stale_on_error => {
                warn!(
                    error = %err,
                    rules = rules.len(),
                    "rule refresh failed, serving stale rules"
                );
                Ok(rules)
            }
            _ => Err(err),
        }
    }

    async fn reload_global(&self) -> Result<RuleSet, CategorizeError> {
        let ticket = self.cache.global_ticket();
        let rules = self
            .source
            .global_rules()
            .await
            .map_err(CategorizeError::GlobalRules)?;
        let compiled = self.compile(rules);
        debug!(count = compiled.len(), "loaded global rules");
        self.cache.install_global(compiled.clone(), ticket).await;
        self.patterns.prune(RuleScope::Global, &compiled);
        Ok(compiled)
    }

    async fn reload_personal(&self, user: UserId) -> Result<RuleSet, CategorizeError> {
        let ticket = self.cache.personal_ticket();
        let rules = self
            .source
            .personal_rules(user)
            .await
            .map_err(|source| CategorizeError::PersonalRules { user, source })?;
        let compiled = self.compile(rules);
        debug!(user = %user, count = compiled.len(), "loaded personal rules");
        self.cache.install_personal(user, compiled.clone(), ticket).await;
        self.patterns.prune(RuleScope::Personal(user), &compiled);

        let evicted = self.cache.evict_idle(user).await;
        if !evicted.is_empty() {
            self.patterns.forget(&evicted);
        }
        Ok(compiled)
    }

    fn compile(&self, rules: Vec<CategorizationRule>) -> RuleSet {
        rules
            .into_iter()
            .map(|rule| self.patterns.compile(rule))
            .collect::<Vec<_>>()
            .into()
    }
}

/// The first match wins until a later match has strictly higher priority,
/// or equal priority and a strictly higher score.
fn best_match<'a, I>(rules: I, subject: &Subject) -> Option<(&'a CompiledRule, f64)>
where
    I: IntoIterator<Item = &'a CompiledRule>,
{
    let mut best: Option<(&'a CompiledRule, f64)> = None;
    for rule in rules {
        let eval = rule.evaluate(subject);
        if !eval.matched {
            continue;
        }
        let better = match best {
            None => true,
            Some((current, score)) => {
                rule.rule.priority > current.rule.priority
                    || (rule.rule.priority == current.rule.priority && eval.score > score)
            }
        };
        if better {
            best = Some((rule, eval.score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryRuleSource;
    use async_trait::async_trait;
    use cashlens_core::MatchStrategy;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    fn global(
        keyword: &str,
        category: &str,
        priority: i32,
        strategy: MatchStrategy,
    ) -> CategorizationRule {
        CategorizationRule::global(keyword, category, priority, strategy)
    }

    fn fuzzy() -> MatchStrategy {
        MatchStrategy::Fuzzy { threshold: 0.7 }
    }

    fn categorizer_with(
        source: Arc<dyn RuleSource>,
        ttl_secs: u64,
        serve_stale_on_error: bool,
    ) -> Categorizer {
        Categorizer::new(
            source,
            &RuleSettings {
                ttl_secs,
                serve_stale_on_error,
            },
        )
    }

    fn categorizer(rules: Vec<CategorizationRule>) -> (Arc<InMemoryRuleSource>, Categorizer) {
        let source = Arc::new(InMemoryRuleSource::new(rules));
        let categorizer = Categorizer::new(source.clone(), &RuleSettings::default());
        (source, categorizer)
    }

    fn indian_rule_set() -> Vec<CategorizationRule> {
        use MatchStrategy::{Pattern, Substring};
        vec![
            global("^(NEFT|IMPS|RTGS).*(SALARY|SAL|EMP|PAYROLL)", "Salaries", 10, Pattern),
            global("^UPI.*(SALARY|SAL|PAYROLL)", "Salaries", 10, Pattern),
            global("^UPI/.*/(ZOMATO|SWIGGY)", "Team Meals", 4, Pattern),
            global("^UPI/.*/(OLA|UBER|RAPIDO)", "Travel", 6, Pattern),
            global("^UPI/.*/(PAYTM|PHONEPE|GPAY)", "Payment Processing", 9, Pattern),
            global("zomato", "Team Meals", 4, fuzzy()),
            global("swiggy", "Team Meals", 4, fuzzy()),
            global("razorpay", "Payment Processing", 9, fuzzy()),
            global("paytm", "Payment Processing", 9, fuzzy()),
            global("aws", "Cloud & Hosting", 10, Substring),
            global("electricity", "Utilities", 7, Substring),
            global("rent", "Rent & Lease", 9, Substring),
        ]
    }

    #[tokio::test]
    async fn categorizes_common_indian_transactions() {
        let (_, categorizer) = categorizer(indian_rule_set());
        let user = UserId::new();

        let cases = [
            ("NEFT SALARY CREDIT EMP123", "Salaries"),
            ("IMPS-SALARY-TRANSFER-456", "Salaries"),
            ("UPI/123456789/ZOMATO/FOOD-ORDER", "Team Meals"),
            ("UPI/987654/SWIGGY/DELIVERY", "Team Meals"),
            ("UPI/555/UBER/RIDE", "Travel"),
            ("UPI/777/PAYTM/WALLET", "Payment Processing"),
            ("zomatto food delivery", "Team Meals"),
            ("paytmm payment gateway", "Payment Processing"),
            ("AWS SERVICES INVOICE MARCH", "Cloud & Hosting"),
            ("ELECTRICITY BILL PAYMENT", "Utilities"),
            ("OFFICE RENT PAYMENT", "Rent & Lease"),
        ];

        for (description, expected) in cases {
            let got = categorizer.categorize(description, user).await.unwrap();
            assert_eq!(got.as_deref(), Some(expected), "{description}");
        }
    }

    #[tokio::test]
    async fn parsed_rows_match_regardless_of_case() {
        let (_, categorizer) = categorizer(indian_rule_set());
        let date = "2024-01-15".parse().unwrap();
        let user = UserId::new();

        let txn = TransactionCandidate::debit(date, "UPI/555/Uber/Ride", 250.0, String::new());
        let got = categorizer.categorize_transaction(&txn, user).await.unwrap();
        assert_eq!(got.as_deref(), Some("Travel"));

        let txn = TransactionCandidate::debit(date, "Office Rent Payment", 40000.0, String::new());
        let got = categorizer.categorize_transaction(&txn, user).await.unwrap();
        assert_eq!(got.as_deref(), Some("Rent & Lease"));
    }

    #[tokio::test]
    async fn no_match_is_none() {
        let (_, categorizer) = categorizer(indian_rule_set());
        let got = categorizer
            .categorize("unknown transaction xyz", UserId::new())
            .await
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn higher_priority_wins() {
        let (_, categorizer) = categorizer(vec![
            global("aws", "Cloud & Hosting", 5, MatchStrategy::Substring),
            global("salary", "Salaries", 10, MatchStrategy::Substring),
        ]);
        let got = categorizer.categorize("aws salary payment", UserId::new()).await.unwrap();
        assert_eq!(got.as_deref(), Some("Salaries"));
    }

    #[tokio::test]
    async fn equal_priority_prefers_higher_score() {
        let (_, categorizer) = categorizer(vec![
            global("rent", "Rent & Lease", 5, MatchStrategy::Substring),
            global("office", "Office Supplies", 5, MatchStrategy::Substring),
        ]);
        let hit = categorizer
            .classify("office rent payment", UserId::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.category, "Office Supplies");
        assert!((hit.score - 6.0 / 19.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn full_tie_keeps_first_evaluated() {
        let user = UserId::new();
        let (_, categorizer) = categorizer(vec![
            global("aws", "Shared", 5, MatchStrategy::Exact),
            CategorizationRule::personal(user, "aws", "Mine", 5, MatchStrategy::Exact),
        ]);
        let got = categorizer.categorize("AWS", user).await.unwrap();
        assert_eq!(got.as_deref(), Some("Mine"));
    }

    #[tokio::test]
    async fn personal_rule_overrides_global() {
        let user = UserId::new();
        let (_, categorizer) = categorizer(vec![
            global("aws", "Cloud & Hosting", 10, MatchStrategy::Substring),
            CategorizationRule::personal(
                user,
                "aws",
                "Custom Category",
                100,
                MatchStrategy::Substring,
            ),
        ]);

        let mine = categorizer.categorize("aws payment", user).await.unwrap();
        assert_eq!(mine.as_deref(), Some("Custom Category"));

        let someone_else = categorizer.categorize("aws payment", UserId::new()).await.unwrap();
        assert_eq!(someone_else.as_deref(), Some("Cloud & Hosting"));
    }

    #[tokio::test]
    async fn invalid_pattern_disqualifies_only_its_rule() {
        let (_, categorizer) = categorizer(vec![
            global("([", "Broken", 100, MatchStrategy::Pattern),
            global("aws", "Cloud & Hosting", 1, MatchStrategy::Substring),
        ]);
        let got = categorizer.categorize("aws ([", UserId::new()).await.unwrap();
        assert_eq!(got.as_deref(), Some("Cloud & Hosting"));
    }

    #[tokio::test]
    async fn repeated_calls_hit_the_cache() {
        let (source, categorizer) = categorizer(indian_rule_set());
        let user = UserId::new();

        let first = categorizer.categorize("AWS SERVICES", user).await.unwrap();
        let second = categorizer.categorize("AWS SERVICES", user).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.global_loads(), 1);
        assert_eq!(source.personal_loads(), 1);
    }

    #[tokio::test]
    async fn expired_snapshots_are_reloaded() {
        let source = Arc::new(InMemoryRuleSource::new(indian_rule_set()));
        let categorizer = categorizer_with(source.clone(), 0, false);
        let user = UserId::new();

        categorizer.categorize("AWS SERVICES", user).await.unwrap();
        categorizer.categorize("AWS SERVICES", user).await.unwrap();
        assert_eq!(source.global_loads(), 2);
        assert_eq!(source.personal_loads(), 2);
    }

    #[tokio::test]
    async fn invalidate_without_cache_is_noop() {
        let (source, categorizer) = categorizer(indian_rule_set());
        let user = UserId::new();

        categorizer.invalidate(user).await;
        assert_eq!(categorizer.stats().await.cached_identities, 0);
        assert_eq!(source.personal_loads(), 0);
    }

    #[tokio::test]
    async fn invalidate_forces_personal_reload() {
        let user = UserId::new();
        let (source, categorizer) = categorizer(vec![global(
            "aws",
            "Cloud & Hosting",
            10,
            MatchStrategy::Substring,
        )]);

        assert_eq!(
            categorizer.categorize("aws", user).await.unwrap().as_deref(),
            Some("Cloud & Hosting")
        );

        source.insert(CategorizationRule::personal(
            user,
            "aws",
            "Custom",
            100,
            MatchStrategy::Substring,
        ));
        // Still cached.
        assert_eq!(
            categorizer.categorize("aws", user).await.unwrap().as_deref(),
            Some("Cloud & Hosting")
        );

        categorizer.rules_changed(&RuleScope::Personal(user)).await;
        assert_eq!(
            categorizer.categorize("aws", user).await.unwrap().as_deref(),
            Some("Custom")
        );
        assert_eq!(source.personal_loads(), 2);
        assert_eq!(source.global_loads(), 1);
    }

    #[tokio::test]
    async fn pattern_edit_recompiles_after_global_invalidation() {
        let rule = global("^UPI/.*/(OLA|RAPIDO)", "Travel", 6, MatchStrategy::Pattern);
        let id = rule.id;
        let (source, categorizer) = categorizer(vec![rule]);
        let user = UserId::new();

        assert_eq!(
            categorizer.categorize("UPI/1/OLA/RIDE", user).await.unwrap().as_deref(),
            Some("Travel")
        );

        assert!(source.set_keyword(id, "^UPI/.*/UBER"));
        categorizer.rules_changed(&RuleScope::Global).await;

        assert_eq!(categorizer.categorize("UPI/1/OLA/RIDE", user).await.unwrap(), None);
        assert_eq!(
            categorizer.categorize("upi/2/uber/ride", user).await.unwrap().as_deref(),
            Some("Travel")
        );
        assert_eq!(categorizer.stats().await.compiled_patterns, 1);
    }

    #[tokio::test]
    async fn deleted_pattern_rules_leave_the_pattern_cache() {
        let rule = global("^UPI/.*/(OLA|UBER)", "Travel", 6, MatchStrategy::Pattern);
        let id = rule.id;
        let (source, categorizer) = categorizer(vec![rule]);
        let user = UserId::new();

        categorizer.categorize("UPI/1/OLA/RIDE", user).await.unwrap();
        assert_eq!(categorizer.stats().await.compiled_patterns, 1);

        assert!(source.remove(id).is_some());
        categorizer.rules_changed(&RuleScope::Global).await;
        assert_eq!(categorizer.categorize("UPI/1/OLA/RIDE", user).await.unwrap(), None);
        assert_eq!(
            categorizer.stats().await,
            CacheStats {
                global_rules: 0,
                cached_identities: 1,
                compiled_patterns: 0,
            }
        );
    }

    #[tokio::test]
    async fn pattern_rule_changing_strategy_is_dropped() {
        let user = UserId::new();
        let mut rule =
            CategorizationRule::personal(user, "^AWS", "Cloud", 5, MatchStrategy::Pattern);
        let (source, categorizer) = categorizer(vec![rule.clone()]);

        categorizer.categorize("AWS", user).await.unwrap();
        assert_eq!(categorizer.stats().await.compiled_patterns, 1);

        source.remove(rule.id);
        rule.strategy = MatchStrategy::Substring;
        rule.keyword = "aws".into();
        source.insert(rule);
        categorizer.rules_changed(&RuleScope::Personal(user)).await;

        assert_eq!(categorizer.categorize("aws", user).await.unwrap().as_deref(), Some("Cloud"));
        assert_eq!(categorizer.stats().await.compiled_patterns, 0);
    }

    #[tokio::test]
    async fn idle_identities_release_their_rules() {
        let (alice, bob) = (UserId::new(), UserId::new());
        let source = Arc::new(InMemoryRuleSource::new(vec![
            CategorizationRule::personal(alice, "^OLA", "Travel", 5, MatchStrategy::Pattern),
            CategorizationRule::personal(bob, "^UBER", "Travel", 5, MatchStrategy::Pattern),
        ]));
        let categorizer = categorizer_with(source, 0, false);

        categorizer.categorize("OLA RIDE", alice).await.unwrap();
        categorizer.categorize("UBER RIDE", bob).await.unwrap();

        let stats = categorizer.stats().await;
        assert_eq!(stats.cached_identities, 1);
        assert_eq!(stats.compiled_patterns, 1);
    }

    #[tokio::test]
    async fn explicit_loads_report_counts() {
        let user = UserId::new();
        let mut rules = indian_rule_set();
        rules.push(CategorizationRule::personal(
            user,
            "ca fees",
            "Professional Services",
            8,
            MatchStrategy::Substring,
        ));
        let (_, categorizer) = categorizer(rules);

        assert_eq!(categorizer.load_global_rules().await.unwrap(), 12);
        assert_eq!(categorizer.load_personal_rules(user).await.unwrap(), 1);

        let stats = categorizer.stats().await;
        assert_eq!(
            stats,
            CacheStats {
                global_rules: 12,
                cached_identities: 1,
                compiled_patterns: 5,
            }
        );
    }

    struct FlakySource {
        inner: InMemoryRuleSource,
        failing: AtomicBool,
    }

    impl FlakySource {
        fn new(rules: Vec<CategorizationRule>) -> Self {
            FlakySource {
                inner: InMemoryRuleSource::new(rules),
                failing: AtomicBool::new(false),
            }
        }

        fn check(&self) -> Result<(), SourceError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SourceError::Unavailable("database is down".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RuleSource for FlakySource {
        async fn global_rules(&self) -> Result<Vec<CategorizationRule>, SourceError> {
            self.check()?;
            self.inner.global_rules().await
        }

        async fn personal_rules(
            &self,
            user: UserId,
        ) -> Result<Vec<CategorizationRule>, SourceError> {
            self.check()?;
            self.inner.personal_rules(user).await
        }
    }

    #[tokio::test]
    async fn refresh_failure_propagates_by_default() {
        let source = Arc::new(FlakySource::new(indian_rule_set()));
        let categorizer = categorizer_with(source.clone(), 0, false);
        let user = UserId::new();

        categorizer.categorize("aws", user).await.unwrap();
        source.failing.store(true, Ordering::SeqCst);

        let err = categorizer.categorize("aws", user).await.unwrap_err();
        assert!(matches!(err, CategorizeError::GlobalRules(SourceError::Unavailable(_))));
    }

    #[tokio::test]
    async fn refresh_failure_can_serve_stale_rules() {
        let source = Arc::new(FlakySource::new(indian_rule_set()));
        let categorizer = categorizer_with(source.clone(), 0, true);
        let user = UserId::new();

        categorizer.categorize("aws", user).await.unwrap();
        source.failing.store(true, Ordering::SeqCst);

        let got = categorizer.categorize("aws", user).await.unwrap();
        assert_eq!(got.as_deref(), Some("Cloud & Hosting"));
    }

    #[tokio::test]
    async fn stale_serving_needs_a_snapshot() {
        let source = Arc::new(FlakySource::new(indian_rule_set()));
        source.failing.store(true, Ordering::SeqCst);
        let categorizer = categorizer_with(source, 300, true);

        assert!(categorizer.categorize("aws", UserId::new()).await.is_err());
    }

    #[tokio::test]
    async fn personal_load_failure_names_the_user() {
        struct NoPersonal;

        #[async_trait]
        impl RuleSource for NoPersonal {
            async fn global_rules(&self) -> Result<Vec<CategorizationRule>, SourceError> {
                Ok(Vec::new())
            }

            async fn personal_rules(
            &self,
            _: UserId,
        ) -> Result<Vec<CategorizationRule>, SourceError> {
                Err(SourceError::Unavailable("timeout".into()))
            }
        }

        let categorizer = categorizer_with(Arc::new(NoPersonal), 300, false);
        let user = UserId::new();
        match categorizer.categorize("aws", user).await.unwrap_err() {
            CategorizeError::PersonalRules { user: failed, .. } => assert_eq!(failed, user),
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Blocks the first personal load until released.
    struct GatedSource {
        inner: InMemoryRuleSource,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RuleSource for GatedSource {
        async fn global_rules(&self) -> Result<Vec<CategorizationRule>, SourceError> {
            self.inner.global_rules().await
        }

        async fn personal_rules(
            &self,
            user: UserId,
        ) -> Result<Vec<CategorizationRule>, SourceError> {
            let rules = self.inner.personal_rules(user).await;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            rules
        }
    }

    #[tokio::test]
    async fn invalidation_during_load_is_not_overwritten() {
        let user = UserId::new();
        let rule = CategorizationRule::personal(user, "aws", "Old", 100, MatchStrategy::Substring);
        let id = rule.id;
        let source = Arc::new(GatedSource {
            inner: InMemoryRuleSource::new(vec![rule]),
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let categorizer = Arc::new(categorizer_with(source.clone(), 300, false));

        let in_flight = {
            let categorizer = categorizer.clone();
            tokio::spawn(async move { categorizer.categorize("aws invoice", user).await })
        };

        source.entered.notified().await;
        source.inner.set_keyword(id, "gcp");
        categorizer.invalidate(user).await;
        source.release.notify_one();

        // The call that started before the edit still uses what it loaded.
        let got = in_flight.await.unwrap().unwrap();
        assert_eq!(got.as_deref(), Some("Old"));
        assert_eq!(categorizer.stats().await.cached_identities, 0);

        assert_eq!(categorizer.categorize("aws invoice", user).await.unwrap(), None);
        assert_eq!(
            categorizer.categorize("gcp invoice", user).await.unwrap().as_deref(),
            Some("Old")
        );
        assert_eq!(source.inner.personal_loads(), 2);
    }
}
