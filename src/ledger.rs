// 📒 Ledger Model - In-memory snapshot of the target plain-text ledger
// Accounts, commodities, transactions, prices and balances as the mapper sees them

use crate::error::LedgerError;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// String keyed, string valued metadata attached to accounts, commodities and transactions
pub type MetaData = BTreeMap<String, String>;

pub const ACCOUNT_NAME_SEPARATOR: char = ':';

// ============================================================================
// ACCOUNT CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccountCategory {
    Asset,
    Liability,
    Income,
    Expense,
    Equity,
}

impl AccountCategory {
    pub const ALL: [AccountCategory; 5] = [
        AccountCategory::Asset,
        AccountCategory::Liability,
        AccountCategory::Income,
        AccountCategory::Expense,
        AccountCategory::Equity,
    ];

    /// Root segment of every account in this category
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountCategory::Asset => "Assets",
            AccountCategory::Liability => "Liabilities",
            AccountCategory::Income => "Income",
            AccountCategory::Expense => "Expenses",
            AccountCategory::Equity => "Equity",
        }
    }

    pub fn from_root(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.as_str() == segment)
    }
}

impl fmt::Display for AccountCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ACCOUNT NAME
// ============================================================================

/// Validated account name, e.g. `Assets:Wealthsimple:TFSA`
///
/// The first segment is always a category root, every further segment starts
/// with an uppercase letter or a digit and only contains alphanumerics and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountName {
    full_name: String,
    category: AccountCategory,
}

impl AccountName {
    pub fn new(name: impl Into<String>) -> std::result::Result<Self, LedgerError> {
        let full_name = name.into();
        let mut segments = full_name.split(ACCOUNT_NAME_SEPARATOR);

        let category = segments
            .next()
            .and_then(AccountCategory::from_root)
            .ok_or_else(|| LedgerError::InvalidAccountName(full_name.clone()))?;

        let mut has_child = false;
        for segment in segments {
            if !Self::is_valid_segment(segment) {
                return Err(LedgerError::InvalidAccountName(full_name));
            }
            has_child = true;
        }
        if !has_child {
            return Err(LedgerError::InvalidAccountName(full_name));
        }

        Ok(AccountName { full_name, category })
    }

    /// Names built from constants which are known to be valid
    pub(crate) fn from_trusted(category: AccountCategory, full_name: &str) -> Self {
        AccountName {
            full_name: full_name.to_string(),
            category,
        }
    }

    /// Check if a string can be used as a single segment of an account name
    pub fn is_valid_segment(segment: &str) -> bool {
        let mut chars = segment.chars();
        match chars.next() {
            Some(first) if first.is_uppercase() || first.is_ascii_digit() => {}
            _ => return false,
        }
        chars.all(|c| c.is_alphanumeric() || c == '-')
    }

    pub fn is_valid(name: &str) -> bool {
        Self::new(name).is_ok()
    }

    /// Append one segment, e.g. `Assets:Test` + `XGRO` → `Assets:Test:XGRO`
    pub fn child(&self, segment: &str) -> std::result::Result<AccountName, LedgerError> {
        AccountName::new(format!("{}{}{}", self.full_name, ACCOUNT_NAME_SEPARATOR, segment))
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn category(&self) -> AccountCategory {
        self.category
    }
}

impl TryFrom<String> for AccountName {
    type Error = LedgerError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        AccountName::new(value)
    }
}

impl From<AccountName> for String {
    fn from(name: AccountName) -> Self {
        name.full_name
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

// ============================================================================
// AMOUNTS
// ============================================================================

/// Decimal number in a commodity; equality is numeric (1.0 EUR == 1.00 EUR)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    pub number: Decimal,
    pub commodity_symbol: String,
}

impl Amount {
    pub fn new(number: Decimal, commodity_symbol: impl Into<String>) -> Self {
        Amount {
            number,
            commodity_symbol: commodity_symbol.into(),
        }
    }

    pub fn negated(&self) -> Self {
        Amount::new(-self.number, self.commodity_symbol.clone())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.commodity_symbol)
    }
}

/// Lot cost of a posting; an empty cost (`{}`) lets the ledger pick the lot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cost {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
}

// ============================================================================
// ACCOUNTS & COMMODITIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub name: AccountName,

    /// Commodity declared when the account was opened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commodity_symbol: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: MetaData,
}

impl Account {
    pub fn new(name: AccountName) -> Self {
        Account {
            name,
            commodity_symbol: None,
            metadata: MetaData::new(),
        }
    }

    /// Builder pattern: declare the account's commodity
    pub fn with_commodity(mut self, symbol: impl Into<String>) -> Self {
        self.commodity_symbol = Some(symbol.into());
        self
    }

    /// Builder pattern: add one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    pub symbol: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: MetaData,
}

impl Commodity {
    pub fn new(symbol: impl Into<String>) -> Self {
        Commodity {
            symbol: symbol.into(),
            metadata: MetaData::new(),
        }
    }

    /// Builder pattern: add one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// TRANSACTIONS, PRICES, BALANCES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flag {
    #[default]
    Complete,
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub account_name: AccountName,
    pub amount: Amount,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Amount>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Cost>,
}

impl Posting {
    pub fn new(account_name: AccountName, amount: Amount) -> Self {
        Posting {
            account_name,
            amount,
            price: None,
            cost: None,
        }
    }

    /// Builder pattern: per-unit price annotation (`@`)
    pub fn with_price(mut self, price: Amount) -> Self {
        self.price = Some(price);
        self
    }

    /// Builder pattern: lot cost annotation (`{}`)
    pub fn with_cost(mut self, cost: Cost) -> Self {
        self.cost = Some(cost);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetaData {
    pub date: NaiveDate,

    #[serde(default)]
    pub flag: Flag,

    #[serde(default)]
    pub payee: String,

    #[serde(default)]
    pub narration: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: MetaData,
}

impl TransactionMetaData {
    pub fn new(date: NaiveDate) -> Self {
        TransactionMetaData {
            date,
            flag: Flag::Complete,
            payee: String::new(),
            narration: String::new(),
            metadata: MetaData::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub metadata: TransactionMetaData,

    #[serde(default)]
    pub postings: Vec<Posting>,
}

impl Transaction {
    pub fn new(metadata: TransactionMetaData, postings: Vec<Posting>) -> Self {
        Transaction { metadata, postings }
    }

    /// Look up one metadata value of the transaction
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.metadata.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Price {
    pub date: NaiveDate,
    pub commodity_symbol: String,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Balance {
    pub date: NaiveDate,
    pub account_name: AccountName,
    pub amount: Amount,
}

// ============================================================================
// LEDGER SNAPSHOT
// ============================================================================

/// Everything the mapper needs to know about the existing ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub accounts: Vec<Account>,

    #[serde(default)]
    pub commodities: Vec<Commodity>,

    #[serde(default)]
    pub transactions: Vec<Transaction>,

    #[serde(default)]
    pub prices: Vec<Price>,

    #[serde(default)]
    pub balances: Vec<Balance>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a ledger snapshot from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read ledger snapshot: {:?}", path.as_ref()))?;

        let ledger: Ledger = serde_json::from_str(&content)
            .context("Failed to parse ledger snapshot JSON")?;

        Ok(ledger)
    }
}

// ============================================================================
// TESTS
// ============================================================================
