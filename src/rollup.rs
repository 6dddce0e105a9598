use crate::adjustments::{carry_forward_inventory, AdjustmentSource, InventoryKind};
use crate::chart_of_accounts::CategoryKind;
use crate::engine::HierarchicalReport;
use crate::error::Result;
use crate::utils::{percent_of, quarter_of_month, validate_month};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of the inventory and adjustment values one roll-up consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollupInputs {
    pub opening_inventory: BTreeMap<u32, f64>,
    pub closing_inventory: BTreeMap<u32, f64>,
    /// Category code → month → adjustment.
    pub adjustments: BTreeMap<String, BTreeMap<u32, f64>>,
}

impl RollupInputs {
    /// Reads every (category, month) and inventory cell for the report's
    /// months. A month with no transactions is not in `report.months`; use
    /// [`RollupInputs::from_source_for_months`] to roll such a month up.
    pub fn from_source(
        source: &dyn AdjustmentSource,
        report: &HierarchicalReport,
        year: i32,
    ) -> Self {
        Self::from_source_for_months(source, report, year, &report.months)
    }

    /// Like [`RollupInputs::from_source`], for an explicit list of months.
    pub fn from_source_for_months(
        source: &dyn AdjustmentSource,
        report: &HierarchicalReport,
        year: i32,
        months: &[u32],
    ) -> Self {
        let mut inputs = Self::default();

        for &month in months {
            inputs.opening_inventory.insert(
                month,
                source.inventory(year, month, InventoryKind::Opening),
            );
            inputs.closing_inventory.insert(
                month,
                source.inventory(year, month, InventoryKind::Closing),
            );

            for category in &report.categories {
                let value = source.category_adjustment(&category.code, year, month);
                if value != 0.0 {
                    inputs.set_adjustment(&category.code, month, value);
                }
            }
        }

        inputs
    }

    pub fn set_adjustment(&mut self, category_code: &str, month: u32, amount: f64) {
        self.adjustments
            .entry(category_code.to_string())
            .or_default()
            .insert(month, amount);
    }

    /// Applies [`carry_forward_inventory`] to the opening inventory.
    pub fn with_carried_inventory(mut self, months: &[u32]) -> Self {
        self.opening_inventory =
            carry_forward_inventory(&self.opening_inventory, &self.closing_inventory, months);
        self
    }

    fn adjustment(&self, category_code: &str, month: u32) -> f64 {
        self.adjustments
            .get(category_code)
            .and_then(|months| months.get(&month))
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    fn inventory(map: &BTreeMap<u32, f64>, month: u32) -> f64 {
        map.get(&month).copied().filter(|v| v.is_finite()).unwrap_or(0.0)
    }
}

/// Every figure of the profit cascade for one period.
///
/// `*_raw` fields are signed category sums as posted. Adjusted expense
/// figures are `|raw| - adjustment` (plus the inventory change for COGS);
/// the `original_*` profits use the raw absolute values only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfitLine {
    pub revenue: f64,
    pub cogs_raw: f64,
    pub operating_raw: f64,
    pub financial_raw: f64,

    pub opening_inventory: f64,
    pub closing_inventory: f64,
    pub cogs_adjustment: f64,
    pub operating_adjustment: f64,
    pub financial_adjustment: f64,

    pub cogs_adjusted: f64,
    pub gross_profit: f64,
    pub operating_adjusted: f64,
    pub operating_profit: f64,
    pub financial_adjusted: f64,
    pub net_profit: f64,

    pub original_gross_profit: f64,
    pub original_operating_profit: f64,
    pub original_net_profit: f64,
}

impl ProfitLine {
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        revenue: f64,
        cogs_raw: f64,
        operating_raw: f64,
        financial_raw: f64,
        opening_inventory: f64,
        closing_inventory: f64,
        cogs_adjustment: f64,
        operating_adjustment: f64,
        financial_adjustment: f64,
    ) -> Self {
        let cogs_adjusted =
            cogs_raw.abs() - cogs_adjustment + opening_inventory - closing_inventory;
        let gross_profit = revenue - cogs_adjusted;
        let operating_adjusted = operating_raw.abs() - operating_adjustment;
        let operating_profit = gross_profit - operating_adjusted;
        let financial_adjusted = financial_raw.abs() - financial_adjustment;
        let net_profit = operating_profit - financial_adjusted;

        let original_gross_profit = revenue - cogs_raw.abs();
        let original_operating_profit = original_gross_profit - operating_raw.abs();
        let original_net_profit = original_operating_profit - financial_raw.abs();

        Self {
            revenue,
            cogs_raw,
            operating_raw,
            financial_raw,
            opening_inventory,
            closing_inventory,
            cogs_adjustment,
            operating_adjustment,
            financial_adjustment,
            cogs_adjusted,
            gross_profit,
            operating_adjusted,
            operating_profit,
            financial_adjusted,
            net_profit,
            original_gross_profit,
            original_operating_profit,
            original_net_profit,
        }
    }

    /// Field-wise sum. Period totals are built this way, never recomputed.
    pub fn accumulate(&mut self, other: &ProfitLine) {
        self.revenue += other.revenue;
        self.cogs_raw += other.cogs_raw;
        self.operating_raw += other.operating_raw;
        self.financial_raw += other.financial_raw;
        self.opening_inventory += other.opening_inventory;
        self.closing_inventory += other.closing_inventory;
        self.cogs_adjustment += other.cogs_adjustment;
        self.operating_adjustment += other.operating_adjustment;
        self.financial_adjustment += other.financial_adjustment;
        self.cogs_adjusted += other.cogs_adjusted;
        self.gross_profit += other.gross_profit;
        self.operating_adjusted += other.operating_adjusted;
        self.operating_profit += other.operating_profit;
        self.financial_adjusted += other.financial_adjusted;
        self.net_profit += other.net_profit;
        self.original_gross_profit += other.original_gross_profit;
        self.original_operating_profit += other.original_operating_profit;
        self.original_net_profit += other.original_net_profit;
    }

    pub fn gross_margin(&self) -> f64 {
        percent_of(self.gross_profit, self.revenue)
    }

    pub fn operating_margin(&self) -> f64 {
        percent_of(self.operating_profit, self.revenue)
    }

    pub fn net_margin(&self) -> f64 {
        percent_of(self.net_profit, self.revenue)
    }

    pub fn cogs_ratio(&self) -> f64 {
        percent_of(self.cogs_adjusted, self.revenue)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfitSummary {
    pub months: Vec<u32>,
    pub per_month: BTreeMap<u32, ProfitLine>,
    pub total: ProfitLine,
}

impl ProfitSummary {
    pub fn month(&self, month: u32) -> Option<&ProfitLine> {
        self.per_month.get(&month)
    }

    /// Lines per quarter (1..=4), summed from the months present.
    pub fn quarterly(&self) -> BTreeMap<u32, ProfitLine> {
        let mut quarters: BTreeMap<u32, ProfitLine> = BTreeMap::new();
        for (&month, line) in &self.per_month {
            quarters
                .entry(quarter_of_month(month))
                .or_default()
                .accumulate(line);
        }
        quarters
    }
}

/// Rolls category totals up into the profit cascade, either for every report
/// month or for the one `month` given.
pub fn roll_up(
    report: &HierarchicalReport,
    inputs: &RollupInputs,
    month: Option<u32>,
) -> Result<ProfitSummary> {
    let months = match month {
        Some(m) => {
            validate_month(m)?;
            vec![m]
        }
        None => report.months.clone(),
    };

    let revenue = report.kind_totals(CategoryKind::Income);
    let cogs = report.kind_totals(CategoryKind::Cogs);
    let operating = report.kind_totals(CategoryKind::Operating);
    let financial = report.kind_totals(CategoryKind::Financial);

    let codes_of = |kind: CategoryKind| {
        report
            .categories
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.code.as_str())
            .collect::<Vec<&str>>()
    };
    let cogs_codes = codes_of(CategoryKind::Cogs);
    let operating_codes = codes_of(CategoryKind::Operating);
    let financial_codes = codes_of(CategoryKind::Financial);

    let adjustment_for = |codes: &[&str], m: u32| -> f64 {
        codes.iter().map(|code| inputs.adjustment(code, m)).sum()
    };

    let mut per_month = BTreeMap::new();
    let mut total = ProfitLine::default();

    for &m in &months {
        let line = ProfitLine::compute(
            revenue.get(m),
            cogs.get(m),
            operating.get(m),
            financial.get(m),
            RollupInputs::inventory(&inputs.opening_inventory, m),
            RollupInputs::inventory(&inputs.closing_inventory, m),
            adjustment_for(&cogs_codes, m),
            adjustment_for(&operating_codes, m),
            adjustment_for(&financial_codes, m),
        );
        total.accumulate(&line);
        per_month.insert(m, line);
    }

    Ok(ProfitSummary {
        months,
        per_month,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjustments::AdjustmentBook;
    use crate::chart_of_accounts::default_categories;
    use crate::engine::aggregate;
    use crate::schema::Transaction;
    use crate::vendors::VendorResolver;
    use chrono::NaiveDate;

    fn tx(sort_code: i64, account_key: i64, amount: f64, month: u32) -> Transaction {
        Transaction {
            group_id: 1,
            sort_code: Some(sort_code),
            sort_code_name: String::new(),
            account_key,
            account_name: String::new(),
            amount,
            date: NaiveDate::from_ymd_opt(2024, month, 1).unwrap(),
            counter_account_number: 20000,
            counter_account_name: String::new(),
            details: String::new(),
        }
    }

    fn sample_report() -> HierarchicalReport {
        let txs = vec![
            tx(600, 40001, 100_000.0, 1),
            tx(800, 60000, -40_000.0, 1),
            tx(801, 70000, -20_000.0, 1),
            tx(990, 90000, -1_000.0, 1),
            tx(600, 40001, 50_000.0, 2),
            tx(806, 60100, -10_000.0, 2),
            tx(813, 91000, -500.0, 2),
            tx(600, 40030, 30_000.0, 4),
        ];
        aggregate(&txs, &default_categories(), &VendorResolver::default())
    }

    #[test]
    fn test_cogs_adjustment_is_subtracted() {
        let line = ProfitLine::compute(
            100_000.0, -40_000.0, 0.0, 0.0, 5_000.0, 8_000.0, -2_000.0, 0.0, 0.0,
        );
        assert_eq!(line.cogs_adjusted, 39_000.0);
        assert_eq!(line.gross_profit, 61_000.0);
        assert_eq!(line.original_gross_profit, 60_000.0);
    }

    #[test]
    fn test_roll_up_per_month() {
        let report = sample_report();
        let mut inputs = RollupInputs::default();
        inputs.opening_inventory.insert(1, 5_000.0);
        inputs.closing_inventory.insert(1, 8_000.0);
        inputs.set_adjustment("800", 1, -2_000.0);
        inputs.set_adjustment("801", 1, 1_000.0);

        let summary = roll_up(&report, &inputs, None).unwrap();
        assert_eq!(summary.months, vec![1, 2, 4]);

        let jan = summary.month(1).unwrap();
        assert_eq!(jan.cogs_adjusted, 39_000.0);
        assert_eq!(jan.operating_adjusted, 19_000.0);
        assert_eq!(jan.operating_profit, 42_000.0);
        assert_eq!(jan.net_profit, 41_000.0);
        assert_eq!(jan.original_net_profit, 39_000.0);

        let feb = summary.month(2).unwrap();
        assert_eq!(feb.net_profit, 39_500.0);
    }

    #[test]
    fn test_totals_reconcile_with_months() {
        let report = sample_report();
        let summary = roll_up(&report, &RollupInputs::default(), None).unwrap();

        let net: f64 = summary.per_month.values().map(|l| l.net_profit).sum();
        assert!((summary.total.net_profit - net).abs() < 1e-9);

        let quarters = summary.quarterly();
        assert_eq!(quarters.len(), 2);
        assert!((quarters[&1].revenue - 150_000.0).abs() < 1e-9);
        assert!((quarters[&2].net_profit - 30_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_month_and_invalid_month() {
        let report = sample_report();
        let summary = roll_up(&report, &RollupInputs::default(), Some(2)).unwrap();
        assert_eq!(summary.months, vec![2]);
        assert_eq!(summary.total, *summary.month(2).unwrap());

        assert!(roll_up(&report, &RollupInputs::default(), Some(13)).is_err());
    }

    #[test]
    fn test_zero_revenue_margins() {
        let line = ProfitLine::compute(0.0, -100.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(line.gross_margin(), 0.0);
        assert_eq!(line.net_margin(), 0.0);
        assert!(line.cogs_ratio().is_finite());
    }

    #[test]
    fn test_inputs_from_source() {
        let report = sample_report();
        let mut book = AdjustmentBook::new();
        book.set_adjustment("802", 2024, 2, 700.0);
        book.set_adjustment_text("800", 2024, 1, "-");
        book.set_inventory(2024, 1, InventoryKind::Closing, 1_200.0);

        let inputs = RollupInputs::from_source(&book, &report, 2024)
            .with_carried_inventory(&report.months);
        assert_eq!(inputs.adjustment("802", 2), 700.0);
        assert_eq!(inputs.adjustment("800", 1), 0.0);
        assert_eq!(inputs.opening_inventory.get(&2), Some(&1_200.0));

        let summary = roll_up(&report, &inputs, Some(2)).unwrap();
        // No COGS in February, so only the carried opening 1,200 remains.
        assert_eq!(summary.total.cogs_adjusted, 1_200.0);
        assert_eq!(summary.total.operating_adjusted, 9_300.0);
    }

    #[test]
    fn test_806_is_an_operating_expense() {
        let report = sample_report();
        let summary = roll_up(&report, &RollupInputs::default(), Some(2)).unwrap();
        let feb = summary.total;

        assert_eq!(feb.cogs_adjusted, 0.0);
        assert_eq!(feb.gross_profit, 50_000.0);
        assert_eq!(feb.operating_adjusted, 10_000.0);
        assert_eq!(feb.operating_profit, 40_000.0);
    }

    #[test]
    fn test_inputs_for_month_without_transactions() {
        let report = sample_report();
        let mut book = AdjustmentBook::new();
        book.set_inventory(2024, 3, InventoryKind::Opening, 4_000.0);
        book.set_inventory(2024, 3, InventoryKind::Closing, 3_000.0);
        book.set_adjustment("801", 2024, 3, 250.0);

        let from_report = RollupInputs::from_source(&book, &report, 2024);
        assert!(!from_report.opening_inventory.contains_key(&3));

        let inputs = RollupInputs::from_source_for_months(&book, &report, 2024, &[3]);
        let summary = roll_up(&report, &inputs, Some(3)).unwrap();
        assert_eq!(summary.total.opening_inventory, 4_000.0);
        assert_eq!(summary.total.cogs_adjusted, 1_000.0);
        assert_eq!(summary.total.operating_adjusted, -250.0);
        assert_eq!(summary.total.net_profit, -750.0);
    }
}
