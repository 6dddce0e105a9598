use crate::error::Result;
use crate::schema::{LedgerRow, Transaction};
use crate::utils::{parse_amount, parse_int_or_zero, parse_leading_int, parse_ledger_date};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

/// Candidate header names for each canonical field of a ledger export.
/// For every field the first listed header that is present and non-empty in
/// a record wins, so fallback chains live here and nowhere else.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub document_id: Vec<String>,
    pub sort_code: Vec<String>,
    pub sort_code_name: Vec<String>,
    pub account_key: Vec<String>,
    pub account_name: Vec<String>,
    pub amount: Vec<String>,
    pub details: Vec<String>,
    pub date: Vec<String>,
    pub counter_account_number: Vec<String>,
    pub counter_account_name: Vec<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl ColumnMapping {
    /// Hebrew transaction export of the bookkeeping system.
    pub fn hashavshevet() -> Self {
        Self {
            document_id: names(&["כותרת"]),
            sort_code: names(&["קוד מיון"]),
            sort_code_name: names(&["שם קוד מיון"]),
            account_key: names(&["מפתח חשבון"]),
            account_name: names(&["שם חשבון"]),
            amount: names(&["חובה / זכות (שקל)"]),
            details: names(&["פרטים"]),
            date: names(&["ת.אסמכ", "ת.ערך", "תאריך 3"]),
            counter_account_number: names(&["ח-ן נגדי"]),
            counter_account_name: names(&["שם חשבון נגדי"]),
        }
    }

    pub fn english() -> Self {
        Self {
            document_id: names(&["document_id", "Document"]),
            sort_code: names(&["sort_code", "Sort Code"]),
            sort_code_name: names(&["sort_code_name", "Sort Code Name"]),
            account_key: names(&["account_key", "Account"]),
            account_name: names(&["account_name", "Account Name"]),
            amount: names(&["amount", "Amount"]),
            details: names(&["details", "Details", "Description"]),
            date: names(&["date", "Date", "Value Date"]),
            counter_account_number: names(&["counter_account_number", "Counter Account"]),
            counter_account_name: names(&["counter_account_name", "Counter Account Name"]),
        }
    }

    fn indices(&self, headers: &[String]) -> ColumnIndices {
        let lookup = |candidates: &[String]| -> Vec<usize> {
            candidates
                .iter()
                .filter_map(|c| headers.iter().position(|h| h == c))
                .collect()
        };

        ColumnIndices {
            document_id: lookup(&self.document_id),
            sort_code: lookup(&self.sort_code),
            sort_code_name: lookup(&self.sort_code_name),
            account_key: lookup(&self.account_key),
            account_name: lookup(&self.account_name),
            amount: lookup(&self.amount),
            details: lookup(&self.details),
            date: lookup(&self.date),
            counter_account_number: lookup(&self.counter_account_number),
            counter_account_name: lookup(&self.counter_account_name),
        }
    }

    /// Adapts one record given its header row.
    pub fn adapt(&self, headers: &[String], record: &[&str]) -> LedgerRow {
        self.indices(headers).row(record)
    }
}

struct ColumnIndices {
    document_id: Vec<usize>,
    sort_code: Vec<usize>,
    sort_code_name: Vec<usize>,
    account_key: Vec<usize>,
    account_name: Vec<usize>,
    amount: Vec<usize>,
    details: Vec<usize>,
    date: Vec<usize>,
    counter_account_number: Vec<usize>,
    counter_account_name: Vec<usize>,
}

impl ColumnIndices {
    fn row(&self, record: &[&str]) -> LedgerRow {
        let pick = |candidates: &[usize]| -> String {
            candidates
                .iter()
                .filter_map(|&i| record.get(i))
                .map(|v| v.trim())
                .find(|v| !v.is_empty())
                .unwrap_or("")
                .to_string()
        };

        LedgerRow {
            document_id: pick(&self.document_id),
            sort_code: pick(&self.sort_code),
            sort_code_name: pick(&self.sort_code_name),
            account_key: pick(&self.account_key),
            account_name: pick(&self.account_name),
            amount: pick(&self.amount),
            details: pick(&self.details),
            date: pick(&self.date),
            counter_account_number: pick(&self.counter_account_number),
            counter_account_name: pick(&self.counter_account_name),
        }
    }
}

/// Reads a header-ful ledger CSV into canonical rows. Blank lines are skipped;
/// a UTF-8 byte order mark on the first header is ignored.
pub fn read_ledger_csv<R: Read>(reader: R, mapping: &ColumnMapping) -> Result<Vec<LedgerRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    let indices = mapping.indices(&headers);

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let fields: Vec<&str> = record.iter().collect();
        rows.push(indices.row(&fields));
    }

    debug!("Read {} ledger rows from CSV", rows.len());
    Ok(rows)
}

/// Converts a canonical row into a `Transaction`.
///
/// Returns `None` when the account key resolves to zero or the date is
/// missing or not `DD/MM/YYYY`. Every other malformed field degrades to
/// zero/empty instead of rejecting the row.
pub fn normalize(row: &LedgerRow) -> Option<Transaction> {
    let account_key = parse_int_or_zero(&row.account_key);
    if account_key == 0 {
        return None;
    }

    let date = parse_ledger_date(&row.date)?;

    Some(Transaction {
        group_id: parse_int_or_zero(&row.document_id),
        sort_code: parse_leading_int(&row.sort_code),
        sort_code_name: row.sort_code_name.clone(),
        account_key,
        account_name: row.account_name.clone(),
        amount: parse_amount(&row.amount),
        date,
        counter_account_number: parse_int_or_zero(&row.counter_account_number),
        counter_account_name: row.counter_account_name.clone(),
        details: row.details.clone(),
    })
}

#[derive(Debug, Clone)]
pub struct NormalizedRows {
    pub transactions: Vec<Transaction>,
    pub discarded: usize,
}

pub fn normalize_rows(rows: &[LedgerRow]) -> NormalizedRows {
    let transactions: Vec<Transaction> = rows.iter().filter_map(normalize).collect();
    let discarded = rows.len() - transactions.len();

    if discarded > 0 {
        debug!(
            "Discarded {} of {} ledger rows without an account key or a valid date",
            discarded,
            rows.len()
        );
    }

    NormalizedRows {
        transactions,
        discarded,
    }
}

/// One account line of the monthly trial-balance export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalanceRecord {
    pub account_key: i64,
    pub account_name: String,
    /// The export carries no sort code; see [`assign_sort_codes`].
    pub sort_code: Option<i64>,
    pub sort_code_name: String,
    pub opening_balance: f64,
    /// Calendar month → movement for that month. All twelve months are present.
    pub months: BTreeMap<u32, f64>,
}

impl TrialBalanceRecord {
    pub fn month(&self, month: u32) -> f64 {
        self.months.get(&month).copied().unwrap_or(0.0)
    }

    pub fn has_balance(&self) -> bool {
        self.months.values().any(|amount| amount.abs() > 0.01)
    }

    pub fn total(&self) -> f64 {
        self.months.values().sum()
    }
}

/// Column positions of the trial-balance export. The header row carries
/// period labels, not field names, so the layout is positional.
const TB_ACCOUNT_KEY: usize = 4;
const TB_ACCOUNT_NAME: usize = 5;
const TB_OPENING: usize = 6;
const TB_FIRST_MONTH: usize = 7;

fn is_subtotal(account_name: &str) -> bool {
    account_name.contains("סה\"כ") || account_name.contains("סה״כ")
}

/// Reads the monthly trial-balance CSV. The first record is a header and is
/// skipped. Rows without an account key or name, and subtotal rows, are
/// dropped; unreadable amounts count as zero.
pub fn read_trial_balance_csv<R: Read>(reader: R) -> Result<Vec<TrialBalanceRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for result in rdr.records() {
        let record = result?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let field = |i: usize| record.get(i).map(str::trim).unwrap_or("");
        let account_key = parse_int_or_zero(field(TB_ACCOUNT_KEY));
        let account_name = field(TB_ACCOUNT_NAME);

        if account_key == 0 || account_name.is_empty() || is_subtotal(account_name) {
            skipped += 1;
            continue;
        }

        let months = (1..=12u32)
            .map(|m| (m, parse_amount(field(TB_FIRST_MONTH + m as usize - 1))))
            .collect();

        records.push(TrialBalanceRecord {
            account_key,
            account_name: account_name.to_string(),
            sort_code: None,
            sort_code_name: String::new(),
            opening_balance: parse_amount(field(TB_OPENING)),
            months,
        });
    }

    debug!(
        "Read {} trial-balance accounts, skipped {} rows",
        records.len(),
        skipped
    );
    Ok(records)
}

/// Copies each account's sort code from the first transaction posted to it.
/// Accounts without transactions keep no sort code.
pub fn assign_sort_codes(records: &mut [TrialBalanceRecord], transactions: &[Transaction]) {
    let mut by_account: HashMap<i64, &Transaction> = HashMap::new();
    for tx in transactions {
        by_account.entry(tx.account_key).or_insert(tx);
    }

    for record in records {
        if let Some(tx) = by_account.get(&record.account_key) {
            record.sort_code = tx.sort_code;
            record.sort_code_name = tx.sort_code_name.clone();
        }
    }
}
