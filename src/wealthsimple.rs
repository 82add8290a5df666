// 🏦 Wealthsimple Entities - What the downloader hands us
// Accounts, positions and transactions exactly as the provider reports them

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

// ============================================================================
// ACCOUNT CAPABILITY
// ============================================================================

/// The parts of a provider account the mapper relies on
///
/// The lookup and mapper only ever see this trait, so any downloader type
/// exposing these four properties can be mapped.
pub trait WealthsimpleAccount {
    /// Opaque provider id, referenced by positions and transactions
    fn id(&self) -> &str;

    /// Account number shown to the user, stored as `number` metadata in the ledger
    fn number(&self) -> &str;

    /// Base currency of the account
    fn currency(&self) -> &str;

    fn account_type(&self) -> AccountType;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    #[serde(rename = "ca_tfsa")]
    Tfsa,
    #[serde(rename = "ca_rrsp")]
    Rrsp,
    #[serde(rename = "ca_rrif")]
    Rrif,
    #[serde(rename = "ca_lira")]
    Lira,
    #[serde(rename = "ca_resp")]
    Resp,
    #[serde(rename = "ca_fhsa")]
    Fhsa,
    #[serde(rename = "ca_non_registered")]
    NonRegistered,
    #[serde(rename = "ca_non_registered_crypto")]
    NonRegisteredCrypto,
    #[serde(rename = "ca_joint")]
    Joint,
    #[serde(rename = "ca_cash_msb")]
    Chequing,
}

impl AccountType {
    /// Tax sheltered accounts which come with contribution room
    pub fn is_registered(&self) -> bool {
        matches!(
            self,
            AccountType::Tfsa
                | AccountType::Rrsp
                | AccountType::Rrif
                | AccountType::Lira
                | AccountType::Resp
                | AccountType::Fhsa
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub number: String,
    pub currency: String,
    pub account_type: AccountType,
}

impl WealthsimpleAccount for Account {
    fn id(&self) -> &str {
        &self.id
    }

    fn number(&self) -> &str {
        &self.number
    }

    fn currency(&self) -> &str {
        &self.currency
    }

    fn account_type(&self) -> AccountType {
        self.account_type
    }
}

// ============================================================================
// TRANSACTION TYPE
// ============================================================================

/// Provider transaction types; unknown wire names are kept in `Other`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionType {
    Buy,
    Sell,
    Dividend,
    Deposit,
    Withdrawal,
    Fee,
    ReferralBonus,
    GiveawayBonus,
    Refund,
    Reimbursement,
    Interest,
    PaymentSpend,
    PaymentTransferIn,
    PaymentTransferOut,
    TransferIn,
    TransferOut,
    NonResidentWithholdingTax,
    StockDistribution,
    Journal,
    Other(String),
}

impl TransactionType {
    const KNOWN: [TransactionType; 19] = [
        TransactionType::Buy,
        TransactionType::Sell,
        TransactionType::Dividend,
        TransactionType::Deposit,
        TransactionType::Withdrawal,
        TransactionType::Fee,
        TransactionType::ReferralBonus,
        TransactionType::GiveawayBonus,
        TransactionType::Refund,
        TransactionType::Reimbursement,
        TransactionType::Interest,
        TransactionType::PaymentSpend,
        TransactionType::PaymentTransferIn,
        TransactionType::PaymentTransferOut,
        TransactionType::TransferIn,
        TransactionType::TransferOut,
        TransactionType::NonResidentWithholdingTax,
        TransactionType::StockDistribution,
        TransactionType::Journal,
    ];

    /// Name used by the provider API, e.g. `giveaway_bonus`
    pub fn raw_name(&self) -> &str {
        match self {
            TransactionType::Buy => "buy",
            TransactionType::Sell => "sell",
            TransactionType::Dividend => "dividend",
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Fee => "fee",
            TransactionType::ReferralBonus => "referral_bonus",
            TransactionType::GiveawayBonus => "giveaway_bonus",
            TransactionType::Refund => "refund",
            TransactionType::Reimbursement => "reimbursement",
            TransactionType::Interest => "interest",
            TransactionType::PaymentSpend => "payment_spend",
            TransactionType::PaymentTransferIn => "payment_transfer_in",
            TransactionType::PaymentTransferOut => "payment_transfer_out",
            TransactionType::TransferIn => "transfer_in",
            TransactionType::TransferOut => "transfer_out",
            TransactionType::NonResidentWithholdingTax => "non_resident_withholding_tax",
            TransactionType::StockDistribution => "stock_distribution",
            TransactionType::Journal => "journal",
            TransactionType::Other(name) => name,
        }
    }

    /// Name used in ledger metadata keys, e.g. `giveaway-bonus`
    pub fn canonical_name(&self) -> String {
        self.raw_name().to_lowercase().replace('_', "-")
    }
}

impl From<String> for TransactionType {
    fn from(value: String) -> Self {
        let lower = value.to_lowercase();
        Self::KNOWN
            .into_iter()
            .find(|known| known.raw_name() == lower)
            .unwrap_or(TransactionType::Other(value))
    }
}

impl From<TransactionType> for String {
    fn from(value: TransactionType) -> Self {
        value.raw_name().to_string()
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw_name())
    }
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Money {
            amount,
            currency: currency.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub transaction_type: TransactionType,
    pub description: String,

    /// Traded / paying security, empty for pure cash movements
    #[serde(default)]
    pub symbol: String,

    #[serde(default)]
    pub quantity: Decimal,

    pub market_price: Money,
    pub market_value: Money,
    pub net_cash: Money,

    /// Units of net cash currency per unit of market currency
    #[serde(default = "default_fx_rate")]
    pub fx_rate: Decimal,

    pub effective_date: NaiveDate,
    pub process_date: NaiveDate,
}

fn default_fx_rate() -> Decimal {
    Decimal::ONE
}

impl Transaction {
    /// Market and net cash currency differ, so the provider converted
    pub fn uses_fx(&self) -> bool {
        self.market_price.currency != self.net_cash.currency
    }
}

// ============================================================================
// POSITIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Currency,
    Equity,
    ExchangeTradedFund,
    MutualFund,
    Cryptocurrency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub asset_type: AssetType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub account_id: String,
    pub asset: Asset,
    pub quantity: Decimal,
    pub price: Money,
    pub position_date: NaiveDate,
    pub price_date: NaiveDate,
}

// ============================================================================
// DOWNLOADED BATCH
// ============================================================================

/// One download from the provider, as written by the downloader
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedData {
    #[serde(default)]
    pub accounts: Vec<Account>,

    #[serde(default)]
    pub positions: Vec<Position>,

    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl DownloadedData {
    /// Load a downloaded batch from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read Wealthsimple download: {:?}", path.as_ref()))?;

        let data: DownloadedData = serde_json::from_str(&content)
            .context("Failed to parse Wealthsimple download JSON")?;

        Ok(data)
    }
}

// ============================================================================
// TESTS
// ============================================================================
