use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bank {
    Hdfc,
    Icici,
    Sbi,
    Axis,
    Kotak,
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bank::Hdfc => f.pad("HDFC"),
            Bank::Icici => f.pad("ICICI"),
            Bank::Sbi => f.pad("SBI"),
            Bank::Axis => f.pad("Axis"),
            Bank::Kotak => f.pad("Kotak"),
        }
    }
}

impl std::str::FromStr for Bank {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hdfc" => Ok(Bank::Hdfc),
            "icici" => Ok(Bank::Icici),
            "sbi" => Ok(Bank::Sbi),
            "axis" => Ok(Bank::Axis),
            "kotak" => Ok(Bank::Kotak),
            other => Err(format!("Unknown bank: '{other}'")),
        }
    }
}

impl Bank {
    pub fn schema(self) -> &'static BankSchema {
        match self {
            Bank::Hdfc => &BANK_SCHEMAS[0],
            Bank::Icici => &BANK_SCHEMAS[1],
            Bank::Sbi => &BANK_SCHEMAS[2],
            Bank::Axis => &BANK_SCHEMAS[3],
            Bank::Kotak => &BANK_SCHEMAS[4],
        }
    }
}

/// How a statement expresses the money moved by a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountLayout {
    /// Separate withdrawal and deposit columns; at most one is filled per row.
    Separate {
        debit: &'static str,
        credit: &'static str,
    },
    /// One unsigned amount column plus a `Dr`/`Cr` indicator column.
    Indicator {
        amount: &'static str,
        direction: &'static str,
    },
}

/// Column layout of one bank's statement export.
///
/// Column names are compared case-insensitively against the header row but
/// must otherwise match the exporter byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankSchema {
    pub bank: Bank,
    pub date_column: &'static str,
    pub description_column: &'static str,
    pub amounts: AmountLayout,
}

impl BankSchema {
    pub fn has_separate_amounts(&self) -> bool {
        matches!(self.amounts, AmountLayout::Separate { .. })
    }
}

pub const BANK_SCHEMAS: [BankSchema; 5] = [
    BankSchema {
        bank: Bank::Hdfc,
        date_column: "Date",
        description_column: "Narration",
        amounts: AmountLayout::Separate {
            debit: "Withdrawal Amt.",
            credit: "Deposit Amt.",
        },
    },
    BankSchema {
        bank: Bank::Icici,
        date_column: "Transaction Date",
        description_column: "Transaction Remarks",
        amounts: AmountLayout::Separate {
            debit: "Withdrawal Amount (INR)",
            credit: "Deposit Amount (INR)",
        },
    },
    BankSchema {
        bank: Bank::Sbi,
        date_column: "Txn Date",
        description_column: "Description",
        amounts: AmountLayout::Separate {
            debit: "Debit",
            credit: "Credit",
        },
    },
    BankSchema {
        bank: Bank::Axis,
        date_column: "Transaction Date",
        description_column: "Particulars",
        amounts: AmountLayout::Indicator {
            amount: "Amount",
            direction: "Dr/Cr",
        },
    },
    BankSchema {
        bank: Bank::Kotak,
        date_column: "Date",
        description_column: "Description",
        amounts: AmountLayout::Separate {
            debit: "Debit",
            credit: "Credit",
        },
    },
];
