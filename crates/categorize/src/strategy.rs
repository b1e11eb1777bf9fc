use cashlens_core::{CategorizationRule, MatchStrategy, RuleId, RuleScope, UserId};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

use crate::util::similarity;

/// Score given to any pattern match.
pub const PATTERN_SCORE: f64 = 0.8;

/// Outcome of testing one rule against one description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub matched: bool,
    pub score: f64,
}

impl Evaluation {
    pub const MISS: Evaluation = Evaluation {
        matched: false,
        score: 0.0,
    };

    pub fn hit(score: f64) -> Self {
        Evaluation {
            matched: true,
            score,
        }
    }
}

/// A description folded once per call: trimmed and upper-cased for
/// patterns, lower-cased for everything else.
#[derive(Debug, Clone)]
pub struct Subject {
    upper: String,
    lower: String,
}

impl Subject {
    pub fn new(description: &str) -> Self {
        let upper = description.trim().to_uppercase();
        let lower = upper.to_lowercase();
        Subject { upper, lower }
    }

    pub fn upper(&self) -> &str {
        &self.upper
    }

    pub fn lower(&self) -> &str {
        &self.lower
    }
}

pub fn match_exact(text: &str, keyword: &str) -> Evaluation {
    if text == keyword {
        Evaluation::hit(1.0)
    } else {
        Evaluation::MISS
    }
}

/// Longer keywords relative to the description score higher.
pub fn match_substring(text: &str, keyword: &str) -> Evaluation {
    if !text.contains(keyword) {
        return Evaluation::MISS;
    }
    let text_len = text.chars().count();
    if text_len == 0 {
        return Evaluation::hit(1.0);
    }
    Evaluation::hit(keyword.chars().count() as f64 / text_len as f64)
}

pub fn match_pattern(pattern: &Regex, text: &str) -> Evaluation {
    if pattern.is_match(text) {
        Evaluation::hit(PATTERN_SCORE)
    } else {
        Evaluation::MISS
    }
}

/// Literal containment scores 1.0. Otherwise the whole description, then each
/// whitespace-separated word, is compared; the first similarity reaching the
/// threshold is the score. A miss carries the best similarity seen.
pub fn match_fuzzy(text: &str, keyword: &str, threshold: f64) -> Evaluation {
    if text.contains(keyword) {
        return Evaluation::hit(1.0);
    }

    let whole = similarity(text, keyword);
    if whole >= threshold {
        return Evaluation::hit(whole);
    }

    let mut best = whole;
    for word in text.split_whitespace() {
        let score = similarity(word, keyword);
        if score >= threshold {
            return Evaluation::hit(score);
        }
        best = best.max(score);
    }

    Evaluation {
        matched: false,
        score: best,
    }
}

/// A rule prepared for repeated evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: CategorizationRule,
    keyword: String,
    pattern: Option<Arc<Regex>>,
}

impl CompiledRule {
    pub fn evaluate(&self, subject: &Subject) -> Evaluation {
        match &self.rule.strategy {
            MatchStrategy::Exact => match_exact(subject.lower(), &self.keyword),
            MatchStrategy::Substring => match_substring(subject.lower(), &self.keyword),
            MatchStrategy::Pattern => self
                .pattern
                .as_deref()
                .map_or(Evaluation::MISS, |re| match_pattern(re, subject.upper())),
            MatchStrategy::Fuzzy { threshold } => {
                match_fuzzy(subject.lower(), &self.keyword, *threshold)
            }
        }
    }

    /// False only for a pattern rule whose keyword failed to compile.
    pub fn is_usable(&self) -> bool {
        self.rule.strategy != MatchStrategy::Pattern || self.pattern.is_some()
    }
}

#[derive(Debug)]
struct CachedPattern {
    scope: RuleScope,
    source: String,
    regex: Option<Arc<Regex>>,
}

/// Compiled regular expressions keyed by rule id. An entry is rebuilt only
/// when the rule's keyword text changes, and dropped once a reload of its
/// scope no longer contains the rule.
#[derive(Debug, Default)]
pub struct PatternCache {
    entries: Mutex<HashMap<RuleId, CachedPattern>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the compiled pattern for `id`, compiling `source` if the id is
    /// new or its text changed. Invalid patterns yield `None`.
    pub fn get(&self, id: RuleId, scope: RuleScope, source: &str) -> Option<Arc<Regex>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = entries.get_mut(&id) {
            if cached.source == source {
                cached.scope = scope;
                return cached.regex.clone();
            }
        }

        let regex = match Regex::new(source) {
            Ok(re) => Some(Arc::new(re)),
            Err(error) => {
                warn!(rule = %id, pattern = source, %error, "invalid rule pattern");
                None
            }
        };
        entries.insert(
            id,
            CachedPattern {
                scope,
                source: source.to_string(),
                regex: regex.clone(),
            },
        );
        regex
    }

    pub fn compile(&self, rule: CategorizationRule) -> CompiledRule {
        let pattern = match rule.strategy {
            MatchStrategy::Pattern => self.get(rule.id, rule.scope, &rule.keyword),
            _ => None,
        };
        CompiledRule {
            keyword: rule.keyword.to_lowercase(),
            pattern,
            rule,
        }
    }

    /// Drops entries of `scope` with no pattern rule in `loaded`, the rule
    /// set that scope was just reloaded with.
    pub fn prune(&self, scope: RuleScope, loaded: &[CompiledRule]) {
        let live: HashSet<RuleId> = loaded
            .iter()
            .filter(|c| c.rule.strategy == MatchStrategy::Pattern)
            .map(|c| c.rule.id)
            .collect();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id, cached| cached.scope != scope || live.contains(id));
    }

    /// Drops every entry owned by the given identities.
    pub fn forget(&self, users: &[UserId]) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, cached| match cached.scope {
                RuleScope::Personal(user) => !users.contains(&user),
                RuleScope::Global => true,
            });
    }

    /// Number of successfully compiled patterns held.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| c.regex.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashlens_core::DEFAULT_FUZZY_THRESHOLD;

    fn fuzzy(text: &str, keyword: &str) -> Evaluation {
        match_fuzzy(text, keyword, DEFAULT_FUZZY_THRESHOLD)
    }

    #[test]
    fn subject_folds_case_and_whitespace() {
        let s = Subject::new("  Upi/123/Zomato  ");
        assert_eq!(s.upper(), "UPI/123/ZOMATO");
        assert_eq!(s.lower(), "upi/123/zomato");
    }

    #[test]
    fn exact_requires_equality() {
        assert_eq!(match_exact("aws", "aws"), Evaluation::hit(1.0));
        assert_eq!(match_exact("aws services", "aws"), Evaluation::MISS);
    }

    #[test]
    fn substring_scores_by_coverage() {
        let eval = match_substring("aws services", "aws");
        assert!(eval.matched);
        assert!((eval.score - 0.25).abs() < 1e-9);
        assert_eq!(match_substring("aws", "aws").score, 1.0);
        assert_eq!(match_substring("google ads", "aws"), Evaluation::MISS);
    }

    #[test]
    fn substring_of_empty_description() {
        assert_eq!(match_substring("", ""), Evaluation::hit(1.0));
    }

    #[test]
    fn pattern_matches_score_constant() {
        let re = Regex::new("^(NEFT|IMPS|RTGS).*(SALARY|SAL)").unwrap();
        assert_eq!(match_pattern(&re, "NEFT SALARY CREDIT"), Evaluation::hit(PATTERN_SCORE));
        assert_eq!(match_pattern(&re, "UPI SALARY"), Evaluation::MISS);
    }

    #[test]
    fn fuzzy_containment_is_full_score() {
        assert_eq!(fuzzy("paytmm payment gateway", "paytm"), Evaluation::hit(1.0));
    }

    #[test]
    fn fuzzy_matches_misspelled_word() {
        let eval = fuzzy("zomatto food delivery", "zomato");
        assert!(eval.matched);
        assert!((eval.score - 6.0 / 7.0).abs() < 1e-9);

        let eval = fuzzy("flipcart order", "flipkart");
        assert!(eval.matched);
        assert!((eval.score - 0.875).abs() < 1e-9);
    }

    #[test]
    fn fuzzy_whole_description_can_match() {
        let eval = fuzzy("swigy", "swiggy");
        assert!(eval.matched);
        assert!((eval.score - 5.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn fuzzy_threshold_is_honoured() {
        assert!(match_fuzzy("strpe payout", "stripe", 0.6).matched);
        assert!(!match_fuzzy("strpe payout", "stripe", 0.9).matched);
    }

    #[test]
    fn fuzzy_threshold_sensitivity() {
        let eval = fuzzy("google services", "stripe");
        assert!(!eval.matched);
        assert!((eval.score - 0.5).abs() < 1e-9);

        assert!(match_fuzzy("strpe payment", "stripe", 0.6).matched);
    }

    #[test]
    fn fuzzy_miss_counts_whole_description() {
        let eval = match_fuzzy("ola cab", "ola cabs", 0.9);
        assert!(!eval.matched);
        assert!((eval.score - 7.0 / 8.0).abs() < 1e-9);
    }

    #[test]
    fn fuzzy_miss_reports_best_similarity() {
        let eval = fuzzy("patym wallet", "paytm");
        assert!(!eval.matched);
        assert!((eval.score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn compiled_rule_uses_folded_forms() {
        let cache = PatternCache::new();
        let substring = cache.compile(CategorizationRule::global(
            "AWS",
            "Cloud & Hosting",
            10,
            MatchStrategy::Substring,
        ));
        assert!(substring.evaluate(&Subject::new("aws invoice")).matched);

        let pattern = cache.compile(CategorizationRule::global(
            "^UPI/.*/(ZOMATO|SWIGGY)",
            "Team Meals",
            4,
            MatchStrategy::Pattern,
        ));
        assert!(pattern.evaluate(&Subject::new("upi/987654/swiggy/delivery")).matched);
    }

    #[test]
    fn invalid_pattern_never_matches() {
        let cache = PatternCache::new();
        let rule = cache.compile(CategorizationRule::global(
            "([",
            "Broken",
            10,
            MatchStrategy::Pattern,
        ));
        assert!(!rule.is_usable());
        assert_eq!(rule.evaluate(&Subject::new("([")), Evaluation::MISS);
        assert!(cache.is_empty());
    }

    #[test]
    fn pattern_cache_reuses_and_recompiles() {
        let cache = PatternCache::new();
        let id = RuleId::new_v4();

        let first = cache.get(id, RuleScope::Global, "^AWS").unwrap();
        let again = cache.get(id, RuleScope::Global, "^AWS").unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let changed = cache.get(id, RuleScope::Global, "^GOOGLE").unwrap();
        assert!(!Arc::ptr_eq(&first, &changed));
        assert!(changed.is_match("GOOGLE ADS"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn prune_drops_rules_missing_from_reloaded_scope() {
        let cache = PatternCache::new();
        let user = UserId::new();
        let kept = cache.compile(CategorizationRule::global(
            "^AWS",
            "Cloud",
            1,
            MatchStrategy::Pattern,
        ));
        cache.compile(CategorizationRule::global("^GCP", "Cloud", 1, MatchStrategy::Pattern));
        cache.compile(CategorizationRule::personal(
            user,
            "^OLA",
            "Travel",
            1,
            MatchStrategy::Pattern,
        ));
        assert_eq!(cache.len(), 3);

        cache.prune(RuleScope::Global, &[kept]);
        assert_eq!(cache.len(), 2);

        cache.prune(RuleScope::Personal(user), &[]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn rule_moving_scope_is_owned_by_new_scope() {
        let cache = PatternCache::new();
        let user = UserId::new();
        let mut rule = CategorizationRule::personal(
            user,
            "^RENT",
            "Rent & Lease",
            1,
            MatchStrategy::Pattern,
        );
        cache.compile(rule.clone());

        rule.scope = RuleScope::Global;
        let moved = cache.compile(rule);
        cache.prune(RuleScope::Personal(user), &[]);
        assert_eq!(cache.len(), 1);

        cache.prune(RuleScope::Global, &[moved]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn forget_drops_only_named_identities() {
        let cache = PatternCache::new();
        let (alice, bob) = (UserId::new(), UserId::new());
        cache.compile(CategorizationRule::global("^AWS", "Cloud", 1, MatchStrategy::Pattern));
        cache.compile(CategorizationRule::personal(
            alice,
            "^OLA",
            "Travel",
            1,
            MatchStrategy::Pattern,
        ));
        cache.compile(CategorizationRule::personal(
            bob,
            "^UBER",
            "Travel",
            1,
            MatchStrategy::Pattern,
        ));

        cache.forget(&[alice]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn non_pattern_rules_are_not_cached() {
        let cache = PatternCache::new();
        cache.compile(CategorizationRule::global("aws", "Cloud", 1, MatchStrategy::Exact));
        assert!(cache.is_empty());
    }
}
