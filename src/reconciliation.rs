use crate::ingestion::TrialBalanceRecord;
use crate::schema::Transaction;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Absolute difference below which ledger and trial balance agree.
pub const MATCH_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthComparison {
    pub from_transactions: f64,
    pub from_trial_balance: f64,
    pub diff: f64,
    pub matched: bool,
}

impl MonthComparison {
    fn new(from_transactions: f64, from_trial_balance: f64) -> Self {
        let diff = (from_transactions - from_trial_balance).abs();
        Self {
            from_transactions,
            from_trial_balance,
            diff,
            matched: diff < MATCH_TOLERANCE,
        }
    }
}

/// Ledger sums against trial-balance figures for one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountComparison {
    pub account_key: i64,
    pub account_name: String,
    pub sort_code: Option<i64>,
    pub sort_code_name: String,
    pub months: BTreeMap<u32, MonthComparison>,
    pub total_from_transactions: f64,
    pub total_from_trial_balance: f64,
    pub total_diff: f64,
    /// Decided on the totals; single months may still differ.
    pub matched: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ComparisonStats {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub total_diff: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrialBalanceComparison {
    /// Ordered by sort code, then account key. Accounts without a sort code
    /// come first.
    pub accounts: Vec<AccountComparison>,
    pub stats: ComparisonStats,
}

impl TrialBalanceComparison {
    pub fn unmatched(&self) -> impl Iterator<Item = &AccountComparison> {
        self.accounts.iter().filter(|a| !a.matched)
    }

    pub fn by_sort_code(&self) -> BTreeMap<Option<i64>, Vec<&AccountComparison>> {
        let mut groups: BTreeMap<Option<i64>, Vec<&AccountComparison>> = BTreeMap::new();
        for account in &self.accounts {
            groups.entry(account.sort_code).or_default().push(account);
        }
        groups
    }
}

struct LedgerAccount<'a> {
    first: &'a Transaction,
    months: BTreeMap<u32, f64>,
}

/// Compares per-account monthly ledger sums with the trial balance over
/// `months`. Every account present on either side gets a row.
pub fn compare_with_trial_balance(
    transactions: &[Transaction],
    trial_balance: &[TrialBalanceRecord],
    months: &[u32],
) -> TrialBalanceComparison {
    let mut ledger: BTreeMap<i64, LedgerAccount> = BTreeMap::new();
    for tx in transactions {
        let account = ledger.entry(tx.account_key).or_insert_with(|| LedgerAccount {
            first: tx,
            months: BTreeMap::new(),
        });
        *account.months.entry(tx.month()).or_insert(0.0) += tx.amount;
    }

    let mut trial: BTreeMap<i64, &TrialBalanceRecord> = BTreeMap::new();
    for record in trial_balance {
        trial.entry(record.account_key).or_insert(record);
    }

    let mut keys: Vec<i64> = ledger.keys().chain(trial.keys()).copied().collect();
    keys.sort_unstable();
    keys.dedup();

    let mut accounts: Vec<AccountComparison> = keys
        .into_iter()
        .map(|account_key| {
            let posted = ledger.get(&account_key);
            let record = trial.get(&account_key).copied();

            let mut per_month = BTreeMap::new();
            let mut total_from_transactions = 0.0;
            let mut total_from_trial_balance = 0.0;

            for &month in months {
                let from_transactions = posted
                    .and_then(|p| p.months.get(&month))
                    .copied()
                    .unwrap_or(0.0);
                let from_trial_balance = record.map_or(0.0, |r| r.month(month));

                per_month.insert(
                    month,
                    MonthComparison::new(from_transactions, from_trial_balance),
                );
                total_from_transactions += from_transactions;
                total_from_trial_balance += from_trial_balance;
            }

            let total_diff = (total_from_transactions - total_from_trial_balance).abs();
            let first = posted.map(|p| p.first);

            AccountComparison {
                account_key,
                account_name: first
                    .map(|tx| tx.account_name.clone())
                    .filter(|name| !name.is_empty())
                    .or_else(|| record.map(|r| r.account_name.clone()))
                    .unwrap_or_default(),
                sort_code: first
                    .and_then(|tx| tx.sort_code)
                    .or_else(|| record.and_then(|r| r.sort_code)),
                sort_code_name: first
                    .map(|tx| tx.sort_code_name.clone())
                    .filter(|name| !name.is_empty())
                    .or_else(|| record.map(|r| r.sort_code_name.clone()))
                    .unwrap_or_default(),
                months: per_month,
                total_from_transactions,
                total_from_trial_balance,
                total_diff,
                matched: total_diff < MATCH_TOLERANCE,
            }
        })
        .collect();

    accounts.sort_by_key(|a| (a.sort_code, a.account_key));

    let matched = accounts.iter().filter(|a| a.matched).count();
    let stats = ComparisonStats {
        total: accounts.len(),
        matched,
        unmatched: accounts.len() - matched,
        total_diff: accounts.iter().map(|a| a.total_diff).sum(),
    };

    debug!(
        "Trial balance comparison: {} accounts, {} unmatched, total difference {:.2}",
        stats.total, stats.unmatched, stats.total_diff
    );

    TrialBalanceComparison { accounts, stats }
}

/// A trial-balance account with a balance but no ledger lines at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnpostedAccount {
    pub account_key: i64,
    pub account_name: String,
    pub sort_code: Option<i64>,
    pub sort_code_name: String,
    pub total_balance: f64,
    pub months: BTreeMap<u32, f64>,
}

/// Accounts that carry a balance in some month of the trial balance while no
/// transaction is posted to them. Ordered by sort code, input order otherwise.
pub fn accounts_missing_transactions(
    transactions: &[Transaction],
    trial_balance: &[TrialBalanceRecord],
) -> Vec<UnpostedAccount> {
    let posted: HashSet<i64> = transactions.iter().map(|tx| tx.account_key).collect();

    let mut missing: Vec<UnpostedAccount> = trial_balance
        .iter()
        .filter(|record| record.has_balance() && !posted.contains(&record.account_key))
        .map(|record| UnpostedAccount {
            account_key: record.account_key,
            account_name: record.account_name.clone(),
            sort_code: record.sort_code,
            sort_code_name: record.sort_code_name.clone(),
            total_balance: record.total(),
            months: record.months.clone(),
        })
        .collect();

    missing.sort_by_key(|a| a.sort_code);
    missing
}
