// Wealthsimple Ledger Mapper - Core Library
// Exposes the lookup index and mapping rules for use in the CLI and tests

pub mod error;
pub mod ledger;        // Ledger snapshot model
pub mod wealthsimple;  // Downloaded provider entities
pub mod description;   // Provider description parsing
pub mod lookup;        // Lookup Index over a ledger snapshot
pub mod mapper;        // Mapping Rules

// Re-export commonly used types
pub use error::{LedgerError, Result, WealthsimpleConversionError};
pub use ledger::{
    Account, AccountCategory, AccountName, Amount, Balance, Commodity, Cost, Flag, Ledger, MetaData, Posting, Price,
    Transaction, TransactionMetaData,
};
pub use wealthsimple::{DownloadedData, Position, TransactionType, WealthsimpleAccount};
pub use lookup::{LedgerLookup, TransactionPurpose};
pub use mapper::WealthsimpleLedgerMapper;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
