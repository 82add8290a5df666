// 🔁 Ledger Mapper - Wealthsimple positions and transactions → ledger entries
//
// Every entry is resolved through the LedgerLookup and checked against the
// ledger before it is emitted. Duplicates are skipped, unresolvable entities
// fail the batch with the first error.

use crate::description::parse_dividend;
use crate::error::{Result, WealthsimpleConversionError};
use crate::ledger::{
    self, AccountCategory, Amount, Balance, Cost, Flag, Ledger, MetaData, Posting, Price, TransactionMetaData,
};
use crate::lookup::{meta_data_keys, LedgerLookup, TransactionPurpose};
use crate::wealthsimple::{self, AssetType, Position, TransactionType, WealthsimpleAccount};
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, info};

/// Payee of every generated transaction
pub const PAYEE: &str = "Wealthsimple";

/// Decimal places kept for inverted exchange rates
const FX_RATE_PRECISION: u32 = 8;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// MAPPER
// ============================================================================

pub struct WealthsimpleLedgerMapper<A: WealthsimpleAccount = wealthsimple::Account> {
    lookup: LedgerLookup,

    /// Downloaded provider accounts; positions and transactions must reference one of them
    pub accounts: Vec<A>,
}

impl<A: WealthsimpleAccount> WealthsimpleLedgerMapper<A> {
    /// Create a mapper for a ledger snapshot; the snapshot is indexed once, here
    pub fn new(ledger: &Ledger) -> Self {
        WealthsimpleLedgerMapper {
            lookup: LedgerLookup::new(ledger),
            accounts: Vec::new(),
        }
    }

    /// Builder pattern: set the downloaded account roster
    pub fn with_accounts(mut self, accounts: Vec<A>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn lookup(&self) -> &LedgerLookup {
        &self.lookup
    }

    fn account(&self, account_id: &str) -> Result<&A> {
        self.accounts
            .iter()
            .find(|account| account.id() == account_id)
            .ok_or_else(|| WealthsimpleConversionError::AccountNotFound(account_id.to_string()))
    }

    // ========================================================================
    // POSITIONS
    // ========================================================================

    /// Map positions to prices (non-cash assets) and balance assertions
    pub fn map_positions(&self, positions: &[Position]) -> Result<(Vec<Price>, Vec<Balance>)> {
        let mut prices = Vec::new();
        let mut balances = Vec::new();

        for position in positions {
            let (price, balance) = self.map_position(position)?;
            if let Some(price) = price {
                self.push_price(&mut prices, price);
            }
            if self.lookup.balance_exists(&balance) || balances.contains(&balance) {
                debug!(account = %balance.account_name, date = %balance.date, "skipping existing balance");
            } else {
                balances.push(balance);
            }
        }

        info!(prices = prices.len(), balances = balances.len(), "mapped positions");
        Ok((prices, balances))
    }

    fn map_position(&self, position: &Position) -> Result<(Option<Price>, Balance)> {
        let account = self.account(&position.account_id)?;
        let symbol = self.lookup.commodity_symbol(&position.asset.symbol)?;
        let is_cash = position.asset.asset_type == AssetType::Currency;

        let price = (!is_cash).then(|| Price {
            date: position.price_date,
            commodity_symbol: symbol.clone(),
            amount: Amount::new(position.price.amount, position.price.currency.clone()),
        });

        let account_name = self
            .lookup
            .account_name_of(account, (!is_cash).then_some(symbol.as_str()))?;

        // Balance assertions apply at the start of the day
        let balance = Balance {
            date: position.position_date.succ_opt().unwrap_or(position.position_date),
            account_name,
            amount: Amount::new(position.quantity, symbol),
        };

        Ok((price, balance))
    }

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    /// Map transactions to prices (from trades) and ledger transactions
    ///
    /// Withholding tax is merged into the dividend it belongs to, stock
    /// distributions are paired up into one split transaction.
    pub fn map_transactions(
        &self,
        transactions: &[wealthsimple::Transaction],
    ) -> Result<(Vec<Price>, Vec<ledger::Transaction>)> {
        let mut withholding_taxes = Vec::new();
        let mut stock_distributions = Vec::new();
        let mut regular = Vec::new();
        for transaction in transactions {
            match &transaction.transaction_type {
                TransactionType::NonResidentWithholdingTax => withholding_taxes.push(transaction),
                TransactionType::StockDistribution => stock_distributions.push(transaction),
                _ => regular.push(transaction),
            }
        }

        let mut prices = Vec::new();
        let mut result = Vec::new();
        let mut emitted_ids = HashSet::new();

        for transaction in regular {
            let account = self.account(&transaction.account_id)?;
            let (price, mut mapped) = self.map_transaction(transaction, account)?;

            // A dividend already in the ledger leaves its tax to be emitted on its own
            let is_new = !self.lookup.transaction_exists(&mapped) && !was_emitted(&emitted_ids, &mapped);
            if transaction.transaction_type == TransactionType::Dividend && is_new {
                let matching_tax = withholding_taxes
                    .iter()
                    .position(|tax| is_withholding_tax_of(tax, transaction));
                if let Some(index) = matching_tax {
                    let tax = withholding_taxes.remove(index);
                    self.merge_withholding_tax(&mut mapped, tax, account)?;
                }
            }

            if let Some(price) = price {
                self.push_price(&mut prices, price);
            }
            self.push_transaction(&mut result, &mut emitted_ids, mapped);
        }

        for tax in withholding_taxes {
            let account = self.account(&tax.account_id)?;
            let (_, mapped) = self.map_transaction(tax, account)?;
            self.push_transaction(&mut result, &mut emitted_ids, mapped);
        }

        for group in group_stock_distributions(&stock_distributions) {
            let mapped = self.map_stock_split(&group)?;
            self.push_transaction(&mut result, &mut emitted_ids, mapped);
        }

        info!(prices = prices.len(), transactions = result.len(), "mapped transactions");
        Ok((prices, result))
    }

    fn map_transaction(
        &self,
        transaction: &wealthsimple::Transaction,
        account: &A,
    ) -> Result<(Option<Price>, ledger::Transaction)> {
        use AccountCategory::{Asset, Expense, Income, Liability};

        let mapped = match &transaction.transaction_type {
            TransactionType::Buy | TransactionType::Sell => {
                let (price, mapped) = self.map_trade(transaction, account)?;
                return Ok((Some(price), mapped));
            }
            TransactionType::Dividend => self.map_dividend(transaction, account)?,
            TransactionType::NonResidentWithholdingTax => self.map_withholding_tax(transaction, account)?,
            TransactionType::Deposit
            | TransactionType::Withdrawal
            | TransactionType::PaymentTransferIn
            | TransactionType::PaymentTransferOut
            | TransactionType::TransferIn
            | TransactionType::TransferOut => self.map_simple(transaction, account, &[Asset, Liability])?,
            TransactionType::ReferralBonus | TransactionType::GiveawayBonus | TransactionType::Interest => {
                self.map_simple(transaction, account, &[Income])?
            }
            TransactionType::Refund | TransactionType::Reimbursement => {
                self.map_simple(transaction, account, &[Income, Expense])?
            }
            TransactionType::Fee | TransactionType::PaymentSpend => self.map_simple(transaction, account, &[Expense])?,
            // Batches pair distributions up before mapping; one on its own is never a split
            TransactionType::StockDistribution => {
                return Err(WealthsimpleConversionError::UnexpectedStockSplit(transaction.description.clone()))
            }
            TransactionType::Journal | TransactionType::Other(_) => {
                return Err(WealthsimpleConversionError::UnsupportedTransactionType(
                    transaction.transaction_type.raw_name().to_string(),
                ))
            }
        };

        Ok((None, mapped))
    }

    fn map_trade(&self, transaction: &wealthsimple::Transaction, account: &A) -> Result<(Price, ledger::Transaction)> {
        let symbol = self.lookup.commodity_symbol(&transaction.symbol)?;
        let commodity_account = self.lookup.account_name_of(account, Some(&symbol))?;
        let cash_account = self.lookup.account_name_of(account, None)?;

        let is_buy = transaction.transaction_type == TransactionType::Buy;
        let quantity = if is_buy {
            transaction.quantity.abs()
        } else {
            -transaction.quantity.abs()
        };
        let market_price = Amount::new(transaction.market_price.amount, transaction.market_price.currency.clone());

        let commodity_posting = Posting::new(commodity_account, Amount::new(quantity, symbol.clone()));
        let commodity_posting = if is_buy {
            commodity_posting.with_cost(Cost {
                amount: Some(market_price.clone()),
            })
        } else {
            commodity_posting
                .with_cost(Cost::default())
                .with_price(market_price.clone())
        };

        let mut cash_posting = Posting::new(
            cash_account,
            Amount::new(transaction.net_cash.amount, transaction.net_cash.currency.clone()),
        );
        if transaction.uses_fx() {
            if let Some(rate) = Decimal::ONE.checked_div(transaction.fx_rate) {
                cash_posting = cash_posting.with_price(Amount::new(
                    rate.round_dp(FX_RATE_PRECISION).normalize(),
                    transaction.market_price.currency.clone(),
                ));
            }
        }

        let mut postings = vec![commodity_posting, cash_posting];

        if is_buy && !transaction.uses_fx() {
            let difference = quantity
                .checked_mul(transaction.market_price.amount)
                .and_then(|value| value.checked_add(transaction.net_cash.amount));
            if difference.is_none() {
                debug!(id = %transaction.id, "trade value out of range, no rounding posting");
            }
            if let Some(difference) = difference.filter(|difference| !difference.is_zero()) {
                let rounding_account =
                    self.lookup
                        .account_name_for(&TransactionPurpose::Rounding, account, &[AccountCategory::Expense])?;
                postings.push(Posting::new(
                    rounding_account,
                    Amount::new(-difference, transaction.net_cash.currency.clone()),
                ));
            }
        }

        let price = Price {
            date: transaction.process_date,
            commodity_symbol: symbol,
            amount: market_price,
        };

        Ok((price, ledger_transaction(transaction, MetaData::new(), postings)))
    }

    fn map_dividend(&self, transaction: &wealthsimple::Transaction, account: &A) -> Result<ledger::Transaction> {
        let details = parse_dividend(&transaction.description)
            .ok_or_else(|| WealthsimpleConversionError::UnexpectedDescription(transaction.description.clone()))?;

        let symbol = self.lookup.commodity_symbol(&transaction.symbol)?;
        let income_account =
            self.lookup
                .account_name_for(&TransactionPurpose::Dividend(symbol), account, &[AccountCategory::Income])?;
        let cash_account = self.lookup.account_name_of(account, None)?;

        let amount = Amount::new(transaction.net_cash.amount, transaction.net_cash.currency.clone());
        let postings = vec![
            Posting::new(cash_account, amount.clone()),
            Posting::new(income_account, amount.negated()),
        ];

        let mut metadata = MetaData::new();
        metadata.insert(
            meta_data_keys::RECORD_DATE.to_string(),
            details.record_date.format(DATE_FORMAT).to_string(),
        );
        metadata.insert(meta_data_keys::SHARES.to_string(), details.shares.to_string());

        Ok(ledger_transaction(transaction, metadata, postings))
    }

    /// Fold a withholding tax into its dividend: net cash shrinks, tax becomes an expense
    fn merge_withholding_tax(
        &self,
        mapped: &mut ledger::Transaction,
        tax: &wealthsimple::Transaction,
        account: &A,
    ) -> Result<()> {
        let expense_account = self.withholding_tax_account(account)?;
        let cash_account = self.lookup.account_name_of(account, None)?;
        let tax_amount = Amount::new(tax.net_cash.amount, tax.net_cash.currency.clone());

        // Net cash shrinks in place; a tax in another currency (or out of range) gets its own posting
        let merged = mapped
            .postings
            .iter_mut()
            .find(|posting| {
                posting.account_name == cash_account && posting.amount.commodity_symbol == tax_amount.commodity_symbol
            })
            .and_then(|posting| {
                let number = posting.amount.number.checked_add(tax_amount.number)?;
                posting.amount.number = number;
                Some(())
            });
        if merged.is_none() {
            mapped.postings.push(Posting::new(cash_account, tax_amount.clone()));
        }
        mapped.postings.push(Posting::new(expense_account, tax_amount.negated()));

        mapped
            .metadata
            .metadata
            .insert(meta_data_keys::NRWT_ID.to_string(), tax.id.clone());
        Ok(())
    }

    /// Withholding tax without a dividend in the same batch
    fn map_withholding_tax(&self, transaction: &wealthsimple::Transaction, account: &A) -> Result<ledger::Transaction> {
        let expense_account = self.withholding_tax_account(account)?;
        let cash_account = self.lookup.account_name_of(account, None)?;

        let amount = Amount::new(transaction.net_cash.amount, transaction.net_cash.currency.clone());
        let postings = vec![
            Posting::new(cash_account, amount.clone()),
            Posting::new(expense_account, amount.negated()),
        ];

        Ok(ledger_transaction(transaction, MetaData::new(), postings))
    }

    fn withholding_tax_account(&self, account: &A) -> Result<ledger::AccountName> {
        self.lookup.account_name_for(
            &TransactionPurpose::TransactionType(TransactionType::NonResidentWithholdingTax),
            account,
            &[AccountCategory::Expense],
        )
    }

    /// Net cash against the account configured for the transaction type
    fn map_simple(
        &self,
        transaction: &wealthsimple::Transaction,
        account: &A,
        categories: &[AccountCategory],
    ) -> Result<ledger::Transaction> {
        let cash_account = self.lookup.account_name_of(account, None)?;
        let other_account = self.lookup.account_name_for(
            &TransactionPurpose::TransactionType(transaction.transaction_type.clone()),
            account,
            categories,
        )?;

        let amount = Amount::new(transaction.net_cash.amount, transaction.net_cash.currency.clone());
        let mut postings = vec![
            Posting::new(cash_account, amount.clone()),
            Posting::new(other_account, amount.negated()),
        ];

        if transaction.transaction_type == TransactionType::Deposit && account.account_type().is_registered() {
            postings.extend(self.contribution_room_postings(transaction, account)?);
        }

        Ok(ledger_transaction(transaction, MetaData::new(), postings))
    }

    /// Deposits into registered accounts use up contribution room, if it is tracked
    fn contribution_room_postings(&self, transaction: &wealthsimple::Transaction, account: &A) -> Result<Vec<Posting>> {
        let room_account =
            match self
                .lookup
                .account_name_for(&TransactionPurpose::ContributionRoom, account, &[AccountCategory::Asset])
            {
                Ok(room_account) => room_account,
                Err(WealthsimpleConversionError::MissingAccount { .. }) => return Ok(Vec::new()),
                Err(error) => return Err(error),
            };
        let used_account =
            self.lookup
                .account_name_for(&TransactionPurpose::ContributionRoom, account, &[AccountCategory::Expense])?;

        let symbol = self
            .lookup
            .account_commodity_symbol(&room_account)
            .unwrap_or(transaction.net_cash.currency.as_str())
            .to_string();
        let amount = Amount::new(transaction.net_cash.amount, symbol);

        Ok(vec![
            Posting::new(room_account, amount.negated()),
            Posting::new(used_account, amount),
        ])
    }

    /// One removal plus one addition of the same security → split transaction
    fn map_stock_split(&self, group: &[&wealthsimple::Transaction]) -> Result<ledger::Transaction> {
        let unexpected = |description: &str| WealthsimpleConversionError::UnexpectedStockSplit(description.to_string());

        let (removal, addition) = match group {
            [first, second] if first.quantity < Decimal::ZERO && second.quantity > Decimal::ZERO => (*first, *second),
            [first, second] if second.quantity < Decimal::ZERO && first.quantity > Decimal::ZERO => (*second, *first),
            [first, ..] => return Err(unexpected(&first.description)),
            [] => return Err(unexpected("")),
        };

        let account = self.account(&removal.account_id)?;
        let symbol = self.lookup.commodity_symbol(&removal.symbol)?;
        let commodity_account = self.lookup.account_name_of(account, Some(&symbol))?;

        let ratio = addition
            .quantity
            .checked_div(removal.quantity.abs())
            .ok_or_else(|| unexpected(&removal.description))?;

        let postings = vec![
            Posting::new(commodity_account.clone(), Amount::new(removal.quantity, symbol.clone())).with_cost(Cost::default()),
            Posting::new(commodity_account, Amount::new(addition.quantity, symbol)).with_cost(Cost::default()),
        ];

        let mut metadata = MetaData::new();
        metadata.insert(meta_data_keys::SPLIT_RATIO.to_string(), ratio.normalize().to_string());

        Ok(ledger_transaction(removal, metadata, postings))
    }

    // ========================================================================
    // DEDUPLICATION GATE
    // ========================================================================

    fn push_price(&self, prices: &mut Vec<Price>, price: Price) {
        if self.lookup.price_exists(&price) || prices.contains(&price) {
            debug!(commodity = %price.commodity_symbol, date = %price.date, "skipping existing price");
        } else {
            prices.push(price);
        }
    }

    /// Skip transactions already in the ledger or already emitted by this batch
    fn push_transaction(
        &self,
        transactions: &mut Vec<ledger::Transaction>,
        emitted_ids: &mut HashSet<String>,
        transaction: ledger::Transaction,
    ) {
        if self.lookup.transaction_exists(&transaction) || was_emitted(emitted_ids, &transaction) {
            debug!(id = ?transaction.meta(meta_data_keys::ID), "skipping existing transaction");
            return;
        }
        emitted_ids.extend(transaction_ids(&transaction).map(str::to_string));
        transactions.push(transaction);
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn ledger_transaction(
    transaction: &wealthsimple::Transaction,
    mut metadata: MetaData,
    postings: Vec<Posting>,
) -> ledger::Transaction {
    metadata.insert(meta_data_keys::ID.to_string(), transaction.id.clone());
    ledger::Transaction::new(
        TransactionMetaData {
            date: transaction.process_date,
            flag: Flag::Complete,
            payee: PAYEE.to_string(),
            narration: transaction.description.clone(),
            metadata,
        },
        postings,
    )
}

/// `id` and merged `nrwt-id` of a mapped transaction
fn transaction_ids(transaction: &ledger::Transaction) -> impl Iterator<Item = &str> {
    [meta_data_keys::ID, meta_data_keys::NRWT_ID]
        .into_iter()
        .filter_map(|key| transaction.meta(key))
}

fn was_emitted(emitted_ids: &HashSet<String>, transaction: &ledger::Transaction) -> bool {
    transaction_ids(transaction).any(|id| emitted_ids.contains(id))
}

fn is_withholding_tax_of(tax: &wealthsimple::Transaction, dividend: &wealthsimple::Transaction) -> bool {
    tax.account_id == dividend.account_id && tax.symbol == dividend.symbol && tax.process_date == dividend.process_date
}

/// Group stock distributions by account and description, in first-seen order
fn group_stock_distributions<'a>(
    distributions: &[&'a wealthsimple::Transaction],
) -> Vec<Vec<&'a wealthsimple::Transaction>> {
    let mut groups: Vec<Vec<&'a wealthsimple::Transaction>> = Vec::new();
    for &distribution in distributions {
        let existing = groups.iter_mut().find(|group| {
            group.first().is_some_and(|first| {
                first.account_id == distribution.account_id && first.description == distribution.description
            })
        });
        match existing {
            Some(group) => group.push(distribution),
            None => groups.push(vec![distribution]),
        }
    }
    groups
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Account, AccountName, Commodity};
    use crate::wealthsimple::{AccountType, Asset, Money};
    use chrono::NaiveDate;
    use std::str::FromStr;

    const TFSA_ID: &str = "tfsa-1";
    const NON_REGISTERED_ID: &str = "non-registered-1";

    fn name(full_name: &str) -> AccountName {
        AccountName::new(full_name).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn amount(value: &str, symbol: &str) -> Amount {
        Amount::new(dec(value), symbol)
    }

    fn money(value: &str, currency: &str) -> Money {
        Money::new(dec(value), currency)
    }

    fn test_ledger() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.accounts = vec![
            Account::new(name("Assets:Wealthsimple:TFSA"))
                .with_metadata("importer-type", "wealthsimple")
                .with_metadata("number", "A1B2"),
            Account::new(name("Assets:Wealthsimple:Personal"))
                .with_metadata("importer-type", "wealthsimple")
                .with_metadata("number", "C3D4"),
            Account::new(name("Income:Wealthsimple:Dividends")).with_metadata("type-dividend", "A1B2 C3D4"),
            Account::new(name("Income:Wealthsimple:Bonus")).with_metadata("type-giveaway-bonus", "A1B2"),
            Account::new(name("Expenses:Taxes:Withholding"))
                .with_metadata("type-non-resident-withholding-tax", "A1B2 C3D4"),
            Account::new(name("Expenses:Rounding")).with_metadata("rounding", "A1B2 C3D4"),
            Account::new(name("Assets:Bank:Chequing")).with_metadata("type-deposit", "A1B2 C3D4"),
            Account::new(name("Expenses:Fees")).with_metadata("type-fee", "A1B2"),
        ];
        ledger.commodities = vec![
            Commodity::new("CAD"),
            Commodity::new("USD"),
            Commodity::new("XGRO"),
            Commodity::new("VTI"),
        ];
        ledger
    }

    fn test_accounts() -> Vec<wealthsimple::Account> {
        vec![
            wealthsimple::Account {
                id: TFSA_ID.to_string(),
                number: "A1B2".to_string(),
                currency: "CAD".to_string(),
                account_type: AccountType::Tfsa,
            },
            wealthsimple::Account {
                id: NON_REGISTERED_ID.to_string(),
                number: "C3D4".to_string(),
                currency: "USD".to_string(),
                account_type: AccountType::NonRegistered,
            },
        ]
    }

    fn mapper(ledger: &Ledger) -> WealthsimpleLedgerMapper {
        WealthsimpleLedgerMapper::new(ledger).with_accounts(test_accounts())
    }

    fn create_test_transaction(
        id: &str,
        account_id: &str,
        transaction_type: TransactionType,
        description: &str,
        symbol: &str,
        quantity: &str,
        market_price: Money,
        net_cash: Money,
    ) -> wealthsimple::Transaction {
        wealthsimple::Transaction {
            id: id.to_string(),
            account_id: account_id.to_string(),
            transaction_type,
            description: description.to_string(),
            symbol: symbol.to_string(),
            quantity: dec(quantity),
            market_value: market_price.clone(),
            market_price,
            net_cash,
            fx_rate: Decimal::ONE,
            effective_date: date(2021, 1, 4),
            process_date: date(2021, 1, 5),
        }
    }

    fn cash_transaction(id: &str, account_id: &str, transaction_type: TransactionType, net_cash: Money) -> wealthsimple::Transaction {
        let currency = net_cash.currency.clone();
        create_test_transaction(id, account_id, transaction_type, "Cash movement", "", "0", money("0", &currency), net_cash)
    }

    fn dividend(id: &str, net_cash: &str) -> wealthsimple::Transaction {
        create_test_transaction(
            id,
            NON_REGISTERED_ID,
            TransactionType::Dividend,
            "VTI - Vanguard Total Stock Market ETF: 28-DEC-20 (record date) 20.0000 shares",
            "VTI",
            "0",
            money("0", "USD"),
            money(net_cash, "USD"),
        )
    }

    fn withholding_tax(id: &str, net_cash: &str) -> wealthsimple::Transaction {
        create_test_transaction(
            id,
            NON_REGISTERED_ID,
            TransactionType::NonResidentWithholdingTax,
            "VTI - Vanguard Total Stock Market ETF: Non-resident tax withheld",
            "VTI",
            "0",
            money("0", "USD"),
            money(net_cash, "USD"),
        )
    }

    fn stock_distribution(id: &str, quantity: &str) -> wealthsimple::Transaction {
        create_test_transaction(
            id,
            TFSA_ID,
            TransactionType::StockDistribution,
            "XGRO - iShares Core Growth ETF Portfolio: Subdivision 1 -> 4",
            "XGRO",
            quantity,
            money("0", "CAD"),
            money("0", "CAD"),
        )
    }

    fn position(symbol: &str, asset_type: AssetType, quantity: &str, price: Money) -> Position {
        Position {
            account_id: TFSA_ID.to_string(),
            asset: Asset {
                symbol: symbol.to_string(),
                name: String::new(),
                asset_type,
            },
            quantity: dec(quantity),
            price,
            position_date: date(2021, 1, 4),
            price_date: date(2021, 1, 4),
        }
    }

    // ------------------------------------------------------------------------
    // positions
    // ------------------------------------------------------------------------

    #[test]
    fn test_map_positions() {
        let ledger = test_ledger();
        let positions = vec![
            position("XGRO", AssetType::ExchangeTradedFund, "10", money("25.10", "CAD")),
            position("CAD", AssetType::Currency, "100.50", money("1", "CAD")),
        ];

        let (prices, balances) = mapper(&ledger).map_positions(&positions).unwrap();

        assert_eq!(
            prices,
            vec![Price {
                date: date(2021, 1, 4),
                commodity_symbol: "XGRO".to_string(),
                amount: amount("25.10", "CAD"),
            }]
        );
        assert_eq!(
            balances,
            vec![
                Balance {
                    date: date(2021, 1, 5),
                    account_name: name("Assets:Wealthsimple:TFSA:XGRO"),
                    amount: amount("10", "XGRO"),
                },
                Balance {
                    date: date(2021, 1, 5),
                    account_name: name("Assets:Wealthsimple:TFSA"),
                    amount: amount("100.50", "CAD"),
                },
            ]
        );
    }

    #[test]
    fn test_map_positions_skips_existing_entries() {
        let mut ledger = test_ledger();
        ledger.prices.push(Price {
            date: date(2021, 1, 4),
            commodity_symbol: "XGRO".to_string(),
            amount: amount("25.1", "CAD"),
        });
        ledger.balances.push(Balance {
            date: date(2021, 1, 5),
            account_name: name("Assets:Wealthsimple:TFSA:XGRO"),
            amount: amount("10.000", "XGRO"),
        });
        let positions = vec![position("XGRO", AssetType::ExchangeTradedFund, "10", money("25.10", "CAD"))];

        let (prices, balances) = mapper(&ledger).map_positions(&positions).unwrap();

        assert!(prices.is_empty());
        assert!(balances.is_empty());
    }

    #[test]
    fn test_map_positions_uses_commodity_mapping() {
        let mut ledger = test_ledger();
        ledger
            .commodities
            .push(Commodity::new("BTC").with_metadata("commodity-symbol", "XBT"));
        let positions = vec![position("XBT", AssetType::Cryptocurrency, "0.5", money("40000", "CAD"))];

        let (prices, balances) = mapper(&ledger).map_positions(&positions).unwrap();

        assert_eq!(prices[0].commodity_symbol, "BTC");
        assert_eq!(balances[0].account_name, name("Assets:Wealthsimple:TFSA:BTC"));
        assert_eq!(balances[0].amount, amount("0.5", "BTC"));
    }

    #[test]
    fn test_map_positions_errors() {
        let ledger = test_ledger();

        let mut unknown_account = position("XGRO", AssetType::ExchangeTradedFund, "10", money("25.10", "CAD"));
        unknown_account.account_id = "rrsp-9".to_string();
        assert_eq!(
            mapper(&ledger).map_positions(&[unknown_account]),
            Err(WealthsimpleConversionError::AccountNotFound("rrsp-9".to_string()))
        );

        let unknown_commodity = position("VEQT", AssetType::ExchangeTradedFund, "10", money("30", "CAD"));
        assert_eq!(
            mapper(&ledger).map_positions(&[unknown_commodity]),
            Err(WealthsimpleConversionError::MissingCommodity("VEQT".to_string()))
        );

        // accounts must be supplied before mapping
        let positions = vec![position("XGRO", AssetType::ExchangeTradedFund, "10", money("25.10", "CAD"))];
        assert_eq!(
            WealthsimpleLedgerMapper::<wealthsimple::Account>::new(&ledger).map_positions(&positions),
            Err(WealthsimpleConversionError::AccountNotFound(TFSA_ID.to_string()))
        );
    }

    // ------------------------------------------------------------------------
    // trades
    // ------------------------------------------------------------------------

    #[test]
    fn test_map_buy() {
        let ledger = test_ledger();
        let buy = create_test_transaction(
            "buy-1",
            TFSA_ID,
            TransactionType::Buy,
            "XGRO - iShares Core Growth ETF Portfolio: Bought 10.0000 shares",
            "XGRO",
            "10",
            money("25.10", "CAD"),
            money("-251.00", "CAD"),
        );

        let (prices, transactions) = mapper(&ledger).map_transactions(&[buy]).unwrap();

        assert_eq!(
            prices,
            vec![Price {
                date: date(2021, 1, 5),
                commodity_symbol: "XGRO".to_string(),
                amount: amount("25.10", "CAD"),
            }]
        );
        assert_eq!(transactions.len(), 1);

        let transaction = &transactions[0];
        assert_eq!(transaction.metadata.date, date(2021, 1, 5));
        assert_eq!(transaction.metadata.payee, "Wealthsimple");
        assert_eq!(transaction.meta("id"), Some("buy-1"));
        assert_eq!(
            transaction.postings,
            vec![
                Posting::new(name("Assets:Wealthsimple:TFSA:XGRO"), amount("10", "XGRO")).with_cost(Cost {
                    amount: Some(amount("25.10", "CAD")),
                }),
                Posting::new(name("Assets:Wealthsimple:TFSA"), amount("-251.00", "CAD")),
            ]
        );
    }

    #[test]
    fn test_map_buy_with_rounding() {
        let ledger = test_ledger();
        let buy = create_test_transaction(
            "buy-1",
            TFSA_ID,
            TransactionType::Buy,
            "XGRO: Bought 3.0000 shares",
            "XGRO",
            "3",
            money("25.333", "CAD"),
            money("-76.00", "CAD"),
        );

        let (_, transactions) = mapper(&ledger).map_transactions(&[buy]).unwrap();

        let postings = &transactions[0].postings;
        assert_eq!(postings.len(), 3);
        assert_eq!(postings[2], Posting::new(name("Expenses:Rounding"), amount("0.001", "CAD")));
    }

    #[test]
    fn test_map_buy_out_of_range_skips_rounding() {
        let ledger = test_ledger();
        let buy = create_test_transaction(
            "buy-1",
            TFSA_ID,
            TransactionType::Buy,
            "XGRO: Bought",
            "XGRO",
            "100000000000000000000",
            money("100000000000", "CAD"),
            money("-1", "CAD"),
        );

        let (_, transactions) = mapper(&ledger).map_transactions(&[buy]).unwrap();

        let postings = &transactions[0].postings;
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[1], Posting::new(name("Assets:Wealthsimple:TFSA"), amount("-1", "CAD")));
    }

    #[test]
    fn test_map_buy_with_fx() {
        let ledger = test_ledger();
        let mut buy = create_test_transaction(
            "buy-1",
            TFSA_ID,
            TransactionType::Buy,
            "VTI: Bought 1.0000 shares",
            "VTI",
            "1",
            money("200", "USD"),
            money("-250", "CAD"),
        );
        buy.fx_rate = dec("1.25");

        let (prices, transactions) = mapper(&ledger).map_transactions(&[buy]).unwrap();

        assert_eq!(prices[0].amount, amount("200", "USD"));
        let postings = &transactions[0].postings;
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[1].amount, amount("-250", "CAD"));
        assert_eq!(postings[1].price, Some(amount("0.8", "USD")));
    }

    #[test]
    fn test_map_sell() {
        let ledger = test_ledger();
        let sell = create_test_transaction(
            "sell-1",
            TFSA_ID,
            TransactionType::Sell,
            "XGRO: Sold 5.0000 shares",
            "XGRO",
            "-5",
            money("26", "CAD"),
            money("130", "CAD"),
        );

        let (prices, transactions) = mapper(&ledger).map_transactions(&[sell]).unwrap();

        assert_eq!(prices.len(), 1);
        assert_eq!(
            transactions[0].postings,
            vec![
                Posting::new(name("Assets:Wealthsimple:TFSA:XGRO"), amount("-5", "XGRO"))
                    .with_cost(Cost::default())
                    .with_price(amount("26", "CAD")),
                Posting::new(name("Assets:Wealthsimple:TFSA"), amount("130", "CAD")),
            ]
        );
    }

    #[test]
    fn test_map_trade_with_invalid_symbol() {
        let mut ledger = test_ledger();
        ledger.commodities.push(Commodity::new("XGRO:"));
        let buy = create_test_transaction(
            "buy-1",
            TFSA_ID,
            TransactionType::Buy,
            "XGRO: Bought",
            "XGRO:",
            "1",
            money("25", "CAD"),
            money("-25", "CAD"),
        );

        assert_eq!(
            mapper(&ledger).map_transactions(&[buy]),
            Err(WealthsimpleConversionError::InvalidCommoditySymbol("XGRO:".to_string()))
        );
    }

    // ------------------------------------------------------------------------
    // dividends & withholding tax
    // ------------------------------------------------------------------------

    #[test]
    fn test_map_dividend_with_withholding_tax() {
        let ledger = test_ledger();
        let transactions = vec![withholding_tax("nrwt-1", "-1.50"), dividend("div-1", "10.00")];

        let (prices, mapped) = mapper(&ledger).map_transactions(&transactions).unwrap();

        assert!(prices.is_empty());
        assert_eq!(mapped.len(), 1);

        let transaction = &mapped[0];
        assert_eq!(transaction.meta("id"), Some("div-1"));
        assert_eq!(transaction.meta("nrwt-id"), Some("nrwt-1"));
        assert_eq!(transaction.meta("record-date"), Some("2020-12-28"));
        assert_eq!(transaction.meta("shares"), Some("20.0000"));
        assert_eq!(
            transaction.postings,
            vec![
                Posting::new(name("Assets:Wealthsimple:Personal"), amount("8.50", "USD")),
                Posting::new(name("Income:Wealthsimple:Dividends"), amount("-10.00", "USD")),
                Posting::new(name("Expenses:Taxes:Withholding"), amount("1.50", "USD")),
            ]
        );
    }

    #[test]
    fn test_map_dividend_prefers_symbol_account() {
        let mut ledger = test_ledger();
        ledger
            .accounts
            .push(Account::new(name("Income:Dividends:VTI")).with_metadata("dividend-VTI", "C3D4"));

        let (_, mapped) = mapper(&ledger).map_transactions(&[dividend("div-1", "10.00")]).unwrap();

        assert_eq!(mapped[0].postings[1].account_name, name("Income:Dividends:VTI"));
        assert_eq!(mapped[0].meta("nrwt-id"), None);
    }

    #[test]
    fn test_map_dividend_unexpected_description() {
        let ledger = test_ledger();
        let mut transaction = dividend("div-1", "10.00");
        transaction.description = "Dividend VTI".to_string();

        assert_eq!(
            mapper(&ledger).map_transactions(&[transaction]),
            Err(WealthsimpleConversionError::UnexpectedDescription("Dividend VTI".to_string()))
        );
    }

    #[test]
    fn test_map_standalone_withholding_tax() {
        let ledger = test_ledger();

        let (_, mapped) = mapper(&ledger).map_transactions(&[withholding_tax("nrwt-1", "-1.50")]).unwrap();

        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].meta("id"), Some("nrwt-1"));
        assert_eq!(
            mapped[0].postings,
            vec![
                Posting::new(name("Assets:Wealthsimple:Personal"), amount("-1.50", "USD")),
                Posting::new(name("Expenses:Taxes:Withholding"), amount("1.50", "USD")),
            ]
        );
    }

    #[test]
    fn test_withholding_tax_already_merged_is_skipped() {
        let mut ledger = test_ledger();
        let (_, merged) = mapper(&ledger)
            .map_transactions(&[dividend("div-1", "10.00"), withholding_tax("nrwt-1", "-1.50")])
            .unwrap();
        ledger.transactions.extend(merged);

        // the tax arrives again on its own in a later download
        let (_, mapped) = mapper(&ledger).map_transactions(&[withholding_tax("nrwt-1", "-1.50")]).unwrap();

        assert!(mapped.is_empty());
    }

    #[test]
    fn test_withholding_tax_emitted_when_dividend_already_recorded() {
        let mut ledger = test_ledger();
        let (_, recorded) = mapper(&ledger).map_transactions(&[dividend("div-1", "10.00")]).unwrap();
        assert_eq!(recorded[0].meta("nrwt-id"), None);
        ledger.transactions.extend(recorded);

        let (_, mapped) = mapper(&ledger)
            .map_transactions(&[dividend("div-1", "10.00"), withholding_tax("nrwt-1", "-1.50")])
            .unwrap();

        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].meta("id"), Some("nrwt-1"));
        assert_eq!(
            mapped[0].postings,
            vec![
                Posting::new(name("Assets:Wealthsimple:Personal"), amount("-1.50", "USD")),
                Posting::new(name("Expenses:Taxes:Withholding"), amount("1.50", "USD")),
            ]
        );
    }

    #[test]
    fn test_merge_withholding_tax_out_of_range() {
        let ledger = test_ledger();
        let max = Decimal::MAX.to_string();
        let transactions = vec![dividend("div-1", &max), withholding_tax("nrwt-1", &max)];

        let (_, mapped) = mapper(&ledger).map_transactions(&transactions).unwrap();

        let postings = &mapped[0].postings;
        assert_eq!(postings.len(), 4);
        assert_eq!(postings[0], Posting::new(name("Assets:Wealthsimple:Personal"), Amount::new(Decimal::MAX, "USD")));
        assert_eq!(postings[2], Posting::new(name("Assets:Wealthsimple:Personal"), Amount::new(Decimal::MAX, "USD")));
        assert_eq!(mapped[0].meta("nrwt-id"), Some("nrwt-1"));
    }

    // ------------------------------------------------------------------------
    // simple transactions
    // ------------------------------------------------------------------------

    #[test]
    fn test_map_transactions_skips_repeated_id_in_batch() {
        let ledger = test_ledger();
        let deposit = cash_transaction("dep-1", NON_REGISTERED_ID, TransactionType::Deposit, money("500", "USD"));

        let (_, mapped) = mapper(&ledger).map_transactions(&[deposit.clone(), deposit]).unwrap();

        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].meta("id"), Some("dep-1"));
    }

    #[test]
    fn test_map_deposit() {
        let ledger = test_ledger();
        let deposit = cash_transaction("dep-1", NON_REGISTERED_ID, TransactionType::Deposit, money("500", "USD"));

        let (_, mapped) = mapper(&ledger).map_transactions(&[deposit]).unwrap();

        assert_eq!(
            mapped[0].postings,
            vec![
                Posting::new(name("Assets:Wealthsimple:Personal"), amount("500", "USD")),
                Posting::new(name("Assets:Bank:Chequing"), amount("-500", "USD")),
            ]
        );
    }

    #[test]
    fn test_map_deposit_with_contribution_room() {
        let mut ledger = test_ledger();
        ledger.accounts.push(
            Account::new(name("Assets:ContributionRoom:TFSA"))
                .with_commodity("TFSAROOM")
                .with_metadata("contribution-room", "A1B2"),
        );
        ledger
            .accounts
            .push(Account::new(name("Expenses:ContributionRoom:TFSA")).with_metadata("contribution-room", "A1B2"));

        // registered account without tracked room maps fine
        let deposit = cash_transaction("dep-1", TFSA_ID, TransactionType::Deposit, money("500", "CAD"));
        let (_, untracked) = mapper(&test_ledger()).map_transactions(&[deposit.clone()]).unwrap();
        assert_eq!(untracked[0].postings.len(), 2);

        let (_, mapped) = mapper(&ledger).map_transactions(&[deposit]).unwrap();

        assert_eq!(
            mapped[0].postings,
            vec![
                Posting::new(name("Assets:Wealthsimple:TFSA"), amount("500", "CAD")),
                Posting::new(name("Assets:Bank:Chequing"), amount("-500", "CAD")),
                Posting::new(name("Assets:ContributionRoom:TFSA"), amount("-500", "TFSAROOM")),
                Posting::new(name("Expenses:ContributionRoom:TFSA"), amount("500", "TFSAROOM")),
            ]
        );
    }

    #[test]
    fn test_map_giveaway_bonus() {
        let ledger = test_ledger();
        let bonus = cash_transaction("bonus-1", TFSA_ID, TransactionType::GiveawayBonus, money("10", "CAD"));

        let (_, mapped) = mapper(&ledger).map_transactions(&[bonus]).unwrap();

        assert_eq!(mapped[0].postings[1], Posting::new(name("Income:Wealthsimple:Bonus"), amount("-10", "CAD")));
    }

    #[test]
    fn test_map_payment_spend_fallback() {
        let ledger = test_ledger();
        let spend = cash_transaction("spend-1", TFSA_ID, TransactionType::PaymentSpend, money("-12.34", "CAD"));

        let (_, mapped) = mapper(&ledger).map_transactions(&[spend]).unwrap();

        assert_eq!(mapped[0].postings[1], Posting::new(name("Expenses:TODO"), amount("12.34", "CAD")));
    }

    #[test]
    fn test_map_fee_missing_account() {
        let ledger = test_ledger();
        let fee = cash_transaction("fee-1", NON_REGISTERED_ID, TransactionType::Fee, money("-5", "USD"));

        assert_eq!(
            mapper(&ledger).map_transactions(&[fee]),
            Err(WealthsimpleConversionError::MissingAccount {
                key: "type-fee".to_string(),
                number: "C3D4".to_string(),
                categories: "Expenses".to_string(),
            })
        );
    }

    #[test]
    fn test_unsupported_transaction_types() {
        let ledger = test_ledger();

        let journal = cash_transaction("j-1", TFSA_ID, TransactionType::Journal, money("1", "CAD"));
        assert_eq!(
            mapper(&ledger).map_transactions(&[journal]),
            Err(WealthsimpleConversionError::UnsupportedTransactionType("journal".to_string()))
        );

        let unknown = cash_transaction(
            "x-1",
            TFSA_ID,
            TransactionType::Other("crypto_swap".to_string()),
            money("1", "CAD"),
        );
        assert_eq!(
            mapper(&ledger).map_transactions(&[unknown]),
            Err(WealthsimpleConversionError::UnsupportedTransactionType("crypto_swap".to_string()))
        );
    }

    #[test]
    fn test_transaction_account_not_found() {
        let ledger = test_ledger();
        let deposit = cash_transaction("dep-1", "rrsp-9", TransactionType::Deposit, money("500", "CAD"));

        assert_eq!(
            mapper(&ledger).map_transactions(&[deposit]),
            Err(WealthsimpleConversionError::AccountNotFound("rrsp-9".to_string()))
        );
    }

    #[test]
    fn test_map_transactions_skips_existing() {
        let ledger = test_ledger();
        let transactions = vec![
            cash_transaction("dep-1", TFSA_ID, TransactionType::Deposit, money("500", "CAD")),
            create_test_transaction(
                "buy-1",
                TFSA_ID,
                TransactionType::Buy,
                "XGRO: Bought 10.0000 shares",
                "XGRO",
                "10",
                money("25", "CAD"),
                money("-250", "CAD"),
            ),
        ];

        let (prices, first_run) = mapper(&ledger).map_transactions(&transactions).unwrap();
        assert_eq!(first_run.len(), 2);

        let mut updated = ledger.clone();
        updated.transactions.extend(first_run);
        updated.prices.extend(prices);

        let (prices, second_run) = mapper(&updated).map_transactions(&transactions).unwrap();
        assert!(prices.is_empty());
        assert!(second_run.is_empty());
    }

    // ------------------------------------------------------------------------
    // stock splits
    // ------------------------------------------------------------------------

    #[test]
    fn test_map_stock_split() {
        let ledger = test_ledger();
        let transactions = vec![stock_distribution("split-add", "40"), stock_distribution("split-remove", "-10")];

        let (_, mapped) = mapper(&ledger).map_transactions(&transactions).unwrap();

        assert_eq!(mapped.len(), 1);
        let transaction = &mapped[0];
        assert_eq!(transaction.meta("id"), Some("split-remove"));
        assert_eq!(transaction.meta("split-ratio"), Some("4"));
        assert_eq!(
            transaction.postings,
            vec![
                Posting::new(name("Assets:Wealthsimple:TFSA:XGRO"), amount("-10", "XGRO")).with_cost(Cost::default()),
                Posting::new(name("Assets:Wealthsimple:TFSA:XGRO"), amount("40", "XGRO")).with_cost(Cost::default()),
            ]
        );
    }

    #[test]
    fn test_stock_split_needs_exactly_two_transactions() {
        let ledger = test_ledger();
        let description = "XGRO - iShares Core Growth ETF Portfolio: Subdivision 1 -> 4".to_string();

        assert_eq!(
            mapper(&ledger).map_transactions(&[stock_distribution("split-add", "40")]),
            Err(WealthsimpleConversionError::UnexpectedStockSplit(description.clone()))
        );

        let three = vec![
            stock_distribution("split-remove", "-10"),
            stock_distribution("split-add", "40"),
            stock_distribution("split-add-2", "40"),
        ];
        assert_eq!(
            mapper(&ledger).map_transactions(&three),
            Err(WealthsimpleConversionError::UnexpectedStockSplit(description.clone()))
        );

        let same_direction = vec![stock_distribution("split-add", "40"), stock_distribution("split-add-2", "40")];
        assert_eq!(
            mapper(&ledger).map_transactions(&same_direction),
            Err(WealthsimpleConversionError::UnexpectedStockSplit(description))
        );
    }

    #[test]
    fn test_group_stock_distributions() {
        let mut other = stock_distribution("other", "5");
        other.description = "VTI: Subdivision 1 -> 2".to_string();
        let first = stock_distribution("a", "-10");
        let second = stock_distribution("b", "40");

        let groups = group_stock_distributions(&[&first, &other, &second]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(groups[1][0].id, "other");
    }
}
