//! # Ledger Rollup
//!
//! A library for turning a raw general-ledger export into a monthly profit and
//! loss report with drill-down.
//!
//! ## Core Concepts
//!
//! - **Normalization**: ledger rows arrive as text in one canonical shape
//!   ([`LedgerRow`]); rows without an account key or a valid date are dropped
//! - **Vendor Resolution**: lines posted against the suspense account (37999)
//!   get their real supplier back from keywords in the details text
//! - **Cancellation**: small clusters of lines in the same month, sort code and
//!   account that net to zero through the suspense account are removed
//! - **Aggregation**: category → account → vendor → transaction, with monthly
//!   totals on every node
//! - **Roll-up**: revenue, COGS, operating and financial expenses combined with
//!   inventory and manual adjustments into gross, operating and net profit
//! - **Reconciliation**: per-account monthly ledger sums checked against the
//!   trial-balance export
//! - **Recurring expenses**: suppliers seen in three or more months, with alerts
//!   for missing invoices and unusual amounts
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledger_rollup::*;
//! use std::fs::File;
//!
//! let config = ReportConfig {
//!     organization_name: "Modi".to_string(),
//!     year: Some(2024),
//!     ..ReportConfig::default()
//! };
//!
//! let rows = read_ledger_csv(File::open("ledger.csv")?, &ColumnMapping::hashavshevet())?;
//!
//! let mut book = AdjustmentBook::new();
//! book.set_inventory(2024, 1, InventoryKind::Opening, 5_000.0);
//! book.set_adjustment("800", 2024, 1, -2_000.0);
//!
//! let processed = process_report(&rows, &config, &book)?;
//! println!("Net profit: {}", format_currency(processed.summary.total.net_profit));
//! ```

pub mod adjustments;
pub mod analysis;
pub mod cancellation;
pub mod chart_of_accounts;
pub mod engine;
pub mod error;
pub mod export;
pub mod ingestion;
pub mod reconciliation;
pub mod rollup;
pub mod schema;
pub mod utils;
pub mod vendors;

pub use adjustments::{
    aggregate_adjustments, carry_forward_inventory, parse_period, read_adjustments_csv,
    AdjustmentBook, AdjustmentRecord, AdjustmentSource, InventoryKind, NoAdjustments,
    StoredValue,
};
pub use analysis::{
    analyze_recurring_expenses, recurring_stats, AlertKind, RecurringStats, Severity,
    VendorActivity, VendorAlert,
};
pub use cancellation::{CancellationCluster, CancellationFilter, FilterStats};
pub use chart_of_accounts::{
    default_categories, CategoryDefinition, CategoryKind, CategorySelector, ChartOfAccounts,
};
pub use engine::{
    aggregate, AccountNode, CategoryNode, HierarchicalReport, MonthlyData, VendorNode,
};
pub use error::{ReportError, Result};
pub use export::{report_to_csv, report_to_json, summary_to_csv};
pub use ingestion::{
    assign_sort_codes, normalize, normalize_rows, read_ledger_csv, read_trial_balance_csv,
    ColumnMapping, NormalizedRows, TrialBalanceRecord,
};
pub use reconciliation::{
    accounts_missing_transactions, compare_with_trial_balance, AccountComparison,
    ComparisonStats, MonthComparison, TrialBalanceComparison, UnpostedAccount,
};
pub use rollup::{roll_up, ProfitLine, ProfitSummary, RollupInputs};
pub use schema::*;
pub use utils::*;
pub use vendors::{
    default_vendor_mappings, ResolvedVendor, VendorMapping, VendorResolver, SUSPENSE_ACCOUNT,
};

use log::{debug, info};
use serde::Serialize;

/// Everything one pipeline pass produces.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedReport {
    /// Transactions that fed the report, after the year filter and cancellation.
    pub transactions: Vec<Transaction>,
    /// Lines removed as self-cancelling, for the "show cancelled" audit view.
    pub cancelled: Vec<Transaction>,
    pub discarded_rows: usize,
    pub filter_stats: FilterStats,
    pub report: HierarchicalReport,
    pub summary: ProfitSummary,
}

pub struct ReportProcessor;

impl ReportProcessor {
    pub fn process_rows(
        rows: &[LedgerRow],
        config: &ReportConfig,
        filter: &mut CancellationFilter,
        source: &dyn AdjustmentSource,
    ) -> Result<ProcessedReport> {
        let normalized = normalize_rows(rows);
        let mut processed = Self::process(&normalized.transactions, config, filter, source)?;
        processed.discarded_rows = normalized.discarded;
        Ok(processed)
    }

    /// Runs cancellation, aggregation and roll-up over already normalized
    /// transactions. The filter is passed in so its memo can outlive one pass.
    pub fn process(
        transactions: &[Transaction],
        config: &ReportConfig,
        filter: &mut CancellationFilter,
        source: &dyn AdjustmentSource,
    ) -> Result<ProcessedReport> {
        config.validate()?;

        info!(
            "Processing ledger report for organization: {}",
            config.organization_name
        );
        debug!(
            "Input contains {} transactions, {} categories and {} vendor mappings",
            transactions.len(),
            config.categories.len(),
            config.vendor_mappings.len()
        );

        let in_scope: Vec<Transaction> = match config.year {
            Some(year) => transactions
                .iter()
                .filter(|tx| tx.year() == year)
                .cloned()
                .collect(),
            None => transactions.to_vec(),
        };

        let cancelled_ids = filter.find_cancelled_group_ids(&in_scope);
        let (cancelled, kept): (Vec<Transaction>, Vec<Transaction>) = in_scope
            .into_iter()
            .partition(|tx| cancelled_ids.contains(&tx.group_id));

        if !cancelled.is_empty() {
            debug!(
                "Removed {} self-cancelling transactions ({} documents)",
                cancelled.len(),
                cancelled_ids.len()
            );
        }

        let resolver = VendorResolver::from_config(config);
        let report = aggregate(&kept, &config.categories, &resolver);

        let inputs = match config.year.or_else(|| kept.first().map(Transaction::year)) {
            Some(year) => RollupInputs::from_source(source, &report, year),
            None => RollupInputs::default(),
        };
        let summary = roll_up(&report, &inputs, None)?;

        info!(
            "Report ready: {} months, {} transactions kept, net profit {}",
            report.months.len(),
            kept.len(),
            format_currency(summary.total.net_profit)
        );

        Ok(ProcessedReport {
            transactions: kept,
            cancelled,
            discarded_rows: 0,
            filter_stats: filter.stats(),
            report,
            summary,
        })
    }
}

/// One-shot pipeline with a fresh cancellation filter built from `config`.
pub fn process_report(
    rows: &[LedgerRow],
    config: &ReportConfig,
    source: &dyn AdjustmentSource,
) -> Result<ProcessedReport> {
    let mut filter = CancellationFilter::from_config(config)?;
    ReportProcessor::process_rows(rows, config, &mut filter, source)
}
