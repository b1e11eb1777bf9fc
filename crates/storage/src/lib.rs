pub mod db;
pub mod store;

pub use db::{
    connect, delete_rule, get_global_rules, get_rule, get_user_rules, insert_rule, rule_stats,
    set_rule_active, update_rule, DbPool, RuleStats, StorageError,
};
pub use store::{RuleAdmin, SqliteRuleStore};
