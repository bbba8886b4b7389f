use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The direction of money for a ledger item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Income,
    Expense,
}

impl ItemKind {
    /// Every kind, in the order reports present them.
    pub const ALL: [ItemKind; 2] = [ItemKind::Income, ItemKind::Expense];

    /// The textual form used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Income => "income",
            ItemKind::Expense => "expense",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(ItemKind::Income),
            "expense" => Ok(ItemKind::Expense),
            other => Err(CoreError::InvalidInput("kind".to_string(), other.to_string())),
        }
    }
}
