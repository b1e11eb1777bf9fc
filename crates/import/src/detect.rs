use cashlens_core::Bank;
use std::collections::HashSet;

/// Identifies the exporting bank from a statement's header row.
///
/// Predicates run most specific first; Kotak's layout is the generic
/// date/description/debit/credit shape and is checked last.
pub fn detect_bank<S: AsRef<str>>(headers: &[S]) -> Option<Bank> {
    let set: HashSet<String> = headers
        .iter()
        .map(|h| h.as_ref().trim().to_lowercase())
        .collect();
    let has = |name: &str| set.contains(name);

    if has("narration") && has("withdrawal amt.") {
        return Some(Bank::Hdfc);
    }
    if has("transaction remarks") && has("withdrawal amount (inr)") {
        return Some(Bank::Icici);
    }
    if has("txn date") && has("description") {
        return Some(Bank::Sbi);
    }
    if has("particulars") && has("dr/cr") {
        return Some(Bank::Axis);
    }
    if has("date") && has("debit") && has("credit") && has("description") {
        return Some(Bank::Kotak);
    }

    None
}
