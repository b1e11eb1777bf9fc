use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type RuleId = Uuid;

/// Threshold applied to fuzzy rules stored without one.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.7;

/// Opaque identity of the account holder whose personal rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        UserId(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(UserId)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    #[default]
    Substring,
    /// Keyword is a regular expression matched against the upper-cased description.
    Pattern,
    Fuzzy {
        threshold: f64,
    },
}

impl MatchStrategy {
    /// Builds a strategy from the `match_type` and `similarity_threshold`
    /// columns of a stored rule. Unknown names fall back to substring.
    pub fn from_parts(match_type: &str, threshold: Option<f64>) -> Self {
        match match_type.trim().to_lowercase().as_str() {
            "exact" => MatchStrategy::Exact,
            "regex" | "pattern" => MatchStrategy::Pattern,
            "fuzzy" => MatchStrategy::Fuzzy {
                threshold: threshold.unwrap_or(DEFAULT_FUZZY_THRESHOLD),
            },
            _ => MatchStrategy::Substring,
        }
    }

    /// Name stored in the `match_type` column.
    pub fn name(&self) -> &'static str {
        match self {
            MatchStrategy::Exact => "exact",
            MatchStrategy::Substring => "substring",
            MatchStrategy::Pattern => "regex",
            MatchStrategy::Fuzzy { .. } => "fuzzy",
        }
    }

    pub fn threshold(&self) -> Option<f64> {
        match self {
            MatchStrategy::Fuzzy { threshold } => Some(*threshold),
            _ => None,
        }
    }
}

impl std::str::FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(MatchStrategy::Exact),
            "substring" | "contains" => Ok(MatchStrategy::Substring),
            "regex" | "pattern" => Ok(MatchStrategy::Pattern),
            "fuzzy" => Ok(MatchStrategy::Fuzzy {
                threshold: DEFAULT_FUZZY_THRESHOLD,
            }),
            s if s.starts_with("fuzzy:") => {
                let threshold = s[6..]
                    .parse::<f64>()
                    .map_err(|_| "Invalid fuzzy threshold".to_string())?;
                Ok(MatchStrategy::Fuzzy { threshold })
            }
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    #[default]
    Global,
    Personal(UserId),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategorizationRule {
    #[serde(default = "Uuid::new_v4")]
    pub id: RuleId,
    pub keyword: String,
    pub category: String,
    pub priority: i32,
    #[serde(default)]
    pub strategy: MatchStrategy,
    #[serde(default)]
    pub scope: RuleScope,
}

impl CategorizationRule {
    pub fn global(keyword: &str, category: &str, priority: i32, strategy: MatchStrategy) -> Self {
        CategorizationRule {
            id: Uuid::new_v4(),
            keyword: keyword.to_string(),
            category: category.to_string(),
            priority,
            strategy,
            scope: RuleScope::Global,
        }
    }

    pub fn personal(
        user: UserId,
        keyword: &str,
        category: &str,
        priority: i32,
        strategy: MatchStrategy,
    ) -> Self {
        CategorizationRule {
            scope: RuleScope::Personal(user),
            ..Self::global(keyword, category, priority, strategy)
        }
    }
}
