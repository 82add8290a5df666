// ⚠️ Conversion Errors - Everything that can go wrong while mapping
// Each variant carries the missing key/value so the message says what to add to the ledger

use thiserror::Error;

// ============================================================================
// CONVERSION ERRORS
// ============================================================================

/// Errors which can happen when transforming downloaded Wealthsimple data into ledger entries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WealthsimpleConversionError {
    /// A commodity was not found in the ledger
    #[error(
        "The Commodity {0} was not found in your ledger. \
         Please make sure you add the metadata \"commodity-symbol: \"{0}\"\" to it."
    )]
    MissingCommodity(String),

    /// An account was not found in the ledger
    #[error(
        "The {categories} account for account number {number} and key {key} was not found in your ledger. \
         Please make sure you add the metadata \"{key}: \"{number}\"\" to it."
    )]
    MissingAccount {
        key: String,
        number: String,
        categories: String,
    },

    /// A Wealthsimple account was not found in the ledger
    #[error(
        "The account for the wealthsimple account with the number {0} was not found in your ledger. \
         Please make sure you add the metadata \"importer-type: \"wealthsimple\" number: \"{0}\"\" to it."
    )]
    MissingWealthsimpleAccount(String),

    /// Mapping of this transaction type has not been implemented yet
    #[error("Transactions of Type {0} are currently not yet supported")]
    UnsupportedTransactionType(String),

    /// The description of a transaction is not in the expected format
    #[error("Wealthsimple returned an unexpected description for a transaction: {0}")]
    UnexpectedDescription(String),

    /// The account of a position or transaction is not in the supplied account roster
    #[error("Wealthsimple returned an element from an account with id {0} which was not found.")]
    AccountNotFound(String),

    /// A commodity symbol cannot be used as an account name segment
    #[error(
        "Could not generate account for commodity {0}. \
         For the mapping to work commodity symbols must only contain characters allowed in account names."
    )]
    InvalidCommoditySymbol(String),

    /// A stock split happened but not exactly two matching transactions exist
    #[error("A stock split happened, but not exactly two transactions could be found: {0}")]
    UnexpectedStockSplit(String),
}

pub type Result<T> = std::result::Result<T, WealthsimpleConversionError>;

// ============================================================================
// LEDGER MODEL ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Invalid account name: {0}")]
    InvalidAccountName(String),
}
