// 🗂️ Ledger Lookup - Account resolution and duplicate detection against a ledger snapshot
//
// Built once per mapping run. Every query afterwards is a pure read of the
// maps below; changes to the ledger after construction are not seen.

use crate::error::{Result, WealthsimpleConversionError};
use crate::ledger::{AccountCategory, AccountName, Amount, Balance, Ledger, Price, Transaction};
use crate::wealthsimple::{TransactionType, WealthsimpleAccount};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use tracing::debug;

// ============================================================================
// METADATA VOCABULARY
// ============================================================================

/// Metadata keys read from and written to the ledger
pub mod meta_data_keys {
    pub const IMPORTER_TYPE: &str = "importer-type";
    pub const NUMBER: &str = "number";
    pub const ROUNDING: &str = "rounding";
    pub const CONTRIBUTION_ROOM: &str = "contribution-room";
    pub const DIVIDEND_PREFIX: &str = "dividend-";
    pub const PREFIX: &str = "type-";
    pub const COMMODITY_SYMBOL: &str = "commodity-symbol";
    pub const ID: &str = "id";
    pub const NRWT_ID: &str = "nrwt-id";
    pub const RECORD_DATE: &str = "record-date";
    pub const SHARES: &str = "shares";
    pub const SPLIT_RATIO: &str = "split-ratio";
}

/// Value of `importer-type` on accounts owned by this mapper
pub const IMPORTER_TYPE: &str = "wealthsimple";

/// Where payment spend goes when no expense account claims it
pub const FALLBACK_EXPENSE_ACCOUNT: &str = "Expenses:TODO";

pub fn fallback_expense_account_name() -> AccountName {
    AccountName::from_trusted(AccountCategory::Expense, FALLBACK_EXPENSE_ACCOUNT)
}

// ============================================================================
// TRANSACTION PURPOSE
// ============================================================================

/// What an account is looked up for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionPurpose {
    Rounding,
    ContributionRoom,
    /// Dividend of the given (ledger) commodity symbol
    Dividend(String),
    TransactionType(TransactionType),
}

impl TransactionPurpose {
    /// Metadata keys to search, most specific first
    pub fn meta_data_keys(&self) -> Vec<String> {
        match self {
            TransactionPurpose::Rounding => vec![meta_data_keys::ROUNDING.to_string()],
            TransactionPurpose::ContributionRoom => vec![meta_data_keys::CONTRIBUTION_ROOM.to_string()],
            TransactionPurpose::Dividend(symbol) => vec![
                format!("{}{}", meta_data_keys::DIVIDEND_PREFIX, symbol),
                Self::type_key(&TransactionType::Dividend),
            ],
            TransactionPurpose::TransactionType(transaction_type) => vec![Self::type_key(transaction_type)],
        }
    }

    fn type_key(transaction_type: &TransactionType) -> String {
        format!("{}{}", meta_data_keys::PREFIX, transaction_type.canonical_name())
    }
}

/// Render allowed categories for error messages, e.g. "Income, or Expenses, or Equity"
pub fn category_list_text(categories: &[AccountCategory]) -> String {
    categories
        .iter()
        .map(AccountCategory::as_str)
        .collect::<Vec<_>>()
        .join(", or ")
}

// ============================================================================
// LEDGER LOOKUP
// ============================================================================

/// Account claiming one metadata key, with the account numbers listed in its value
#[derive(Debug, Clone)]
struct KeyedAccount {
    name: AccountName,
    numbers: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LedgerLookup {
    /// metadata key → accounts carrying it, in ledger order
    accounts_by_key: HashMap<String, Vec<KeyedAccount>>,

    /// provider account number → base account
    base_accounts: HashMap<String, AccountName>,

    /// account name → declared commodity
    account_commodities: HashMap<AccountName, String>,

    /// provider symbol → ledger symbol from `commodity-symbol` metadata
    commodity_mappings: HashMap<String, String>,

    commodity_symbols: HashSet<String>,

    /// `id` and `nrwt-id` values of all ledger transactions
    transaction_ids: HashSet<String>,

    prices: HashSet<(NaiveDate, String, Amount)>,
    balances: HashSet<(NaiveDate, AccountName, Amount)>,
}

impl LedgerLookup {
    pub fn new(ledger: &Ledger) -> Self {
        let mut lookup = LedgerLookup::default();

        for account in &ledger.accounts {
            for (key, value) in &account.metadata {
                lookup
                    .accounts_by_key
                    .entry(key.clone())
                    .or_default()
                    .push(KeyedAccount {
                        name: account.name.clone(),
                        numbers: value.split_whitespace().map(str::to_string).collect(),
                    });
            }

            let is_importer_account = account
                .metadata
                .get(meta_data_keys::IMPORTER_TYPE)
                .is_some_and(|value| value == IMPORTER_TYPE);
            if is_importer_account {
                if let Some(number) = account.metadata.get(meta_data_keys::NUMBER) {
                    lookup
                        .base_accounts
                        .entry(number.clone())
                        .or_insert_with(|| account.name.clone());
                }
            }

            if let Some(symbol) = &account.commodity_symbol {
                lookup
                    .account_commodities
                    .entry(account.name.clone())
                    .or_insert_with(|| symbol.clone());
            }
        }

        for commodity in &ledger.commodities {
            if let Some(external) = commodity.metadata.get(meta_data_keys::COMMODITY_SYMBOL) {
                lookup
                    .commodity_mappings
                    .entry(external.clone())
                    .or_insert_with(|| commodity.symbol.clone());
            }
            lookup.commodity_symbols.insert(commodity.symbol.clone());
        }

        for transaction in &ledger.transactions {
            for key in [meta_data_keys::ID, meta_data_keys::NRWT_ID] {
                if let Some(id) = transaction.meta(key) {
                    lookup.transaction_ids.insert(id.to_string());
                }
            }
        }

        lookup.prices = ledger
            .prices
            .iter()
            .map(|price| (price.date, price.commodity_symbol.clone(), price.amount.clone()))
            .collect();

        lookup.balances = ledger
            .balances
            .iter()
            .map(|balance| (balance.date, balance.account_name.clone(), balance.amount.clone()))
            .collect();

        debug!(
            accounts = ledger.accounts.len(),
            base_accounts = lookup.base_accounts.len(),
            commodities = lookup.commodity_symbols.len(),
            transaction_ids = lookup.transaction_ids.len(),
            prices = lookup.prices.len(),
            balances = lookup.balances.len(),
            "built ledger lookup"
        );

        lookup
    }

    /// Commodity declared on the account, if the account exists and declares one
    pub fn account_commodity_symbol(&self, account_name: &AccountName) -> Option<&str> {
        self.account_commodities.get(account_name).map(String::as_str)
    }

    /// Ledger account of a provider account, or its per-commodity sub-account
    ///
    /// The base account is the one with `importer-type: wealthsimple` and a
    /// matching `number`. With a symbol, the symbol is appended to the base
    /// account as one more segment and must be a legal segment as-is.
    pub fn account_name_of(
        &self,
        account: &impl WealthsimpleAccount,
        symbol: Option<&str>,
    ) -> Result<AccountName> {
        let base = self
            .base_accounts
            .get(account.number())
            .ok_or_else(|| WealthsimpleConversionError::MissingWealthsimpleAccount(account.number().to_string()))?;

        match symbol {
            None => Ok(base.clone()),
            Some(symbol) => base
                .child(symbol)
                .map_err(|_| WealthsimpleConversionError::InvalidCommoditySymbol(symbol.to_string())),
        }
    }

    /// Account to post the other side of a transaction to
    ///
    /// Tries the purpose's keys in order and returns the first account of an
    /// allowed category whose value lists the provider account number.
    pub fn account_name_for(
        &self,
        purpose: &TransactionPurpose,
        account: &impl WealthsimpleAccount,
        allowed: &[AccountCategory],
    ) -> Result<AccountName> {
        let keys = purpose.meta_data_keys();
        let number = account.number();

        for key in &keys {
            let found = self.accounts_by_key.get(key).and_then(|candidates| {
                candidates
                    .iter()
                    .find(|candidate| allowed.contains(&candidate.name.category()) && candidate.numbers.contains(number))
            });
            if let Some(candidate) = found {
                return Ok(candidate.name.clone());
            }
        }

        if *purpose == TransactionPurpose::TransactionType(TransactionType::PaymentSpend) {
            debug!(number, "no payment spend account, using fallback");
            return Ok(fallback_expense_account_name());
        }

        Err(WealthsimpleConversionError::MissingAccount {
            key: keys.into_iter().next().unwrap_or_default(),
            number: number.to_string(),
            categories: category_list_text(allowed),
        })
    }

    /// Ledger commodity for a provider symbol
    ///
    /// An explicit `commodity-symbol` mapping always wins over a commodity
    /// which happens to have the same symbol.
    pub fn commodity_symbol(&self, external_symbol: &str) -> Result<String> {
        if let Some(symbol) = self.commodity_mappings.get(external_symbol) {
            return Ok(symbol.clone());
        }
        if self.commodity_symbols.contains(external_symbol) {
            return Ok(external_symbol.to_string());
        }
        Err(WealthsimpleConversionError::MissingCommodity(external_symbol.to_string()))
    }

    /// Same `id` (or linked `nrwt-id`) already in the ledger; dates and postings are ignored
    pub fn transaction_exists(&self, transaction: &Transaction) -> bool {
        [meta_data_keys::ID, meta_data_keys::NRWT_ID]
            .into_iter()
            .filter_map(|key| transaction.meta(key))
            .any(|id| self.transaction_ids.contains(id))
    }

    pub fn price_exists(&self, price: &Price) -> bool {
        self.prices
            .contains(&(price.date, price.commodity_symbol.clone(), price.amount.clone()))
    }

    pub fn balance_exists(&self, balance: &Balance) -> bool {
        self.balances
            .contains(&(balance.date, balance.account_name.clone(), balance.amount.clone()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
