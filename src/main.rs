// 🧾 Wealthsimple → Ledger - map a downloaded batch against a ledger snapshot

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wealthsimple_ledger_mapper::{
    Balance, DownloadedData, Ledger, Price, Transaction, WealthsimpleLedgerMapper, VERSION,
};

#[derive(Parser, Debug)]
#[command(name = "wealthsimple-ledger-mapper", version = VERSION)]
#[command(about = "Map downloaded Wealthsimple data to ledger prices, balances and transactions")]
struct Cli {
    /// Ledger snapshot (JSON) used to resolve accounts and skip known entries
    #[arg(long, env = "WEALTHSIMPLE_LEDGER")]
    ledger: PathBuf,

    /// Downloaded accounts, positions and transactions (JSON)
    #[arg(long, env = "WEALTHSIMPLE_DOWNLOAD")]
    download: PathBuf,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// New ledger entries, ready to be appended
#[derive(Debug, Serialize)]
struct MappedEntries {
    prices: Vec<Price>,
    balances: Vec<Balance>,
    transactions: Vec<Transaction>,
}

fn main() -> Result<()> {
    // stdout carries the JSON result, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let ledger = Ledger::from_json_file(&cli.ledger)?;
    let download = DownloadedData::from_json_file(&cli.download)?;
    info!(
        accounts = download.accounts.len(),
        positions = download.positions.len(),
        transactions = download.transactions.len(),
        "loaded download"
    );

    let mapper = WealthsimpleLedgerMapper::new(&ledger).with_accounts(download.accounts);

    let (mut prices, balances) = mapper
        .map_positions(&download.positions)
        .context("Failed to map positions")?;
    let (transaction_prices, transactions) = mapper
        .map_transactions(&download.transactions)
        .context("Failed to map transactions")?;

    for price in transaction_prices {
        if !prices.contains(&price) {
            prices.push(price);
        }
    }

    let entries = MappedEntries {
        prices,
        balances,
        transactions,
    };
    let json = serde_json::to_string_pretty(&entries).context("Failed to serialize ledger entries")?;

    match &cli.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write output: {:?}", path))?;
            info!(output = ?path, "wrote ledger entries");
        }
        None => println!("{}", json),
    }

    Ok(())
}
