pub mod bank;
pub mod config;
pub mod rule;
pub mod transaction;

pub use bank::{AmountLayout, Bank, BankSchema, BANK_SCHEMAS};
pub use config::{
    ConfigError, PdfSettings, RuleSettings, Settings, StorageSettings, UploadSettings,
};
pub use rule::{
    CategorizationRule, MatchStrategy, RuleId, RuleScope, UserId, DEFAULT_FUZZY_THRESHOLD,
};
pub use transaction::{Direction, TransactionCandidate};
