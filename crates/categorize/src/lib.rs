pub mod cache;
pub mod engine;
pub mod source;
pub mod strategy;
pub mod util;

pub use cache::{Lookup, RuleCache, RuleSet, RuleSnapshot};
pub use engine::{CacheStats, CategorizeError, Categorizer, Classification};
pub use source::{InMemoryRuleSource, RuleSource, SourceError};
pub use strategy::{CompiledRule, Evaluation, PatternCache, Subject};
pub use util::{levenshtein_distance, similarity};
