// 🔎 Description Parsing - Pull structured details out of provider descriptions
//
// Dividend example:
//   "XGRO - iShares Core Growth ETF Portfolio: 24-DEC-20 (record date) 8.0000 shares"

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

const RECORD_DATE_FORMAT: &str = "%d-%b-%y";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DividendDescription {
    pub record_date: NaiveDate,
    pub shares: Decimal,
}

/// Parse `<name>: <DD-MMM-YY> (record date) <shares> shares`
///
/// Returns `None` if the description has any other shape.
pub fn parse_dividend(description: &str) -> Option<DividendDescription> {
    // Security names can contain colons, the details follow the last one
    let colon_pos = description.rfind(':')?;
    let (name, details) = (&description[..colon_pos], &description[colon_pos + 1..]);
    if name.trim().is_empty() {
        return None;
    }

    let words: Vec<&str> = details.split_whitespace().collect();
    match words.as_slice() {
        [date, "(record", "date)", shares, "shares"] => {
            let record_date = NaiveDate::parse_from_str(date, RECORD_DATE_FORMAT).ok()?;
            let shares = Decimal::from_str(shares).ok()?;
            Some(DividendDescription { record_date, shares })
        }
        _ => None,
    }
}
