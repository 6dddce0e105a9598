use crate::chart_of_accounts::CategoryKind;
use crate::engine::{HierarchicalReport, MonthlyData};
use crate::error::{ReportError, Result};
use crate::rollup::{ProfitLine, ProfitSummary};
use crate::utils::month_name;
use serde::Serialize;

const BOM: &str = "\u{feff}";

fn month_headers(months: &[u32]) -> Vec<String> {
    months
        .iter()
        .map(|&m| month_name(m).map_or_else(|| m.to_string(), str::to_string))
        .collect()
}

fn amount_cell(value: f64) -> String {
    format!("{value:.2}")
}

fn finish(writer: csv::Writer<Vec<u8>>, with_bom: bool) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::IoError(e.into_error()))?;
    let body = String::from_utf8(bytes).map_err(|e| ReportError::ExportError(e.to_string()))?;

    Ok(if with_bom {
        format!("{BOM}{body}")
    } else {
        body
    })
}

fn node_record(
    level: usize,
    code: String,
    name: &str,
    data: &MonthlyData,
    kind: CategoryKind,
    months: &[u32],
) -> Vec<String> {
    let shown = data.display(kind);
    let mut record = vec![level.to_string(), code, name.to_string()];
    record.extend(months.iter().map(|&m| amount_cell(shown.get(m))));
    record.push(amount_cell(shown.total));
    record
}

/// The drill-down tree flattened to one row per category, account and vendor.
/// Zero-total accounts and vendors are left out; every category is written.
/// Expense values are shown as absolute amounts.
pub fn report_to_csv(report: &HierarchicalReport, with_bom: bool) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["Level".to_string(), "Code".to_string(), "Name".to_string()];
    header.extend(month_headers(&report.months));
    header.push("Total".to_string());
    writer.write_record(&header)?;

    for category in &report.categories {
        writer.write_record(node_record(
            0,
            category.code.clone(),
            &category.name,
            &category.data,
            category.kind,
            &report.months,
        ))?;

        for account in category.visible_accounts() {
            writer.write_record(node_record(
                1,
                account.account_key.to_string(),
                &account.account_name,
                &account.data,
                category.kind,
                &report.months,
            ))?;

            for vendor in account.visible_vendors() {
                writer.write_record(node_record(
                    2,
                    vendor.vendor_key.to_string(),
                    &vendor.vendor_name,
                    &vendor.data,
                    category.kind,
                    &report.months,
                ))?;
            }
        }
    }

    finish(writer, with_bom)
}

type LineField = (&'static str, fn(&ProfitLine) -> f64);

const SUMMARY_LINES: [LineField; 15] = [
    ("Revenue", |l| l.revenue),
    ("Cost of goods sold", |l| l.cogs_raw.abs()),
    ("COGS adjustment", |l| l.cogs_adjustment),
    ("Opening inventory", |l| l.opening_inventory),
    ("Closing inventory", |l| l.closing_inventory),
    ("Adjusted cost of goods sold", |l| l.cogs_adjusted),
    ("Gross profit", |l| l.gross_profit),
    ("Gross margin %", |l| l.gross_margin()),
    ("Operating expenses", |l| l.operating_adjusted),
    ("Operating profit", |l| l.operating_profit),
    ("Operating margin %", |l| l.operating_margin()),
    ("Financial expenses", |l| l.financial_adjusted),
    ("Net profit", |l| l.net_profit),
    ("Net margin %", |l| l.net_margin()),
    ("Net profit before adjustments", |l| l.original_net_profit),
];

/// Profit cascade with one column per month and a total column.
pub fn summary_to_csv(summary: &ProfitSummary, with_bom: bool) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["Line".to_string()];
    header.extend(month_headers(&summary.months));
    header.push("Total".to_string());
    writer.write_record(&header)?;

    for (label, field) in SUMMARY_LINES {
        let mut record = vec![label.to_string()];
        for month in &summary.months {
            let value = summary.month(*month).map_or(0.0, field);
            record.push(amount_cell(value));
        }
        record.push(amount_cell(field(&summary.total)));
        writer.write_record(&record)?;
    }

    finish(writer, with_bom)
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    organization_name: &'a str,
    report: &'a HierarchicalReport,
    summary: &'a ProfitSummary,
}

pub fn report_to_json(
    organization_name: &str,
    report: &HierarchicalReport,
    summary: &ProfitSummary,
) -> Result<String> {
    let document = ReportDocument {
        organization_name,
        report,
        summary,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart_of_accounts::default_categories;
    use crate::engine::aggregate;
    use crate::rollup::{roll_up, RollupInputs};
    use crate::schema::Transaction;
    use crate::vendors::VendorResolver;
    use chrono::NaiveDate;

    fn sample() -> HierarchicalReport {
        let tx = |sort_code: i64, account_key: i64, amount: f64, month: u32| Transaction {
            group_id: 1,
            sort_code: Some(sort_code),
            sort_code_name: "שם".to_string(),
            account_key,
            account_name: "חשבון, ראשי".to_string(),
            amount,
            date: NaiveDate::from_ymd_opt(2024, month, 1).unwrap(),
            counter_account_number: 20013,
            counter_account_name: "תפוז".to_string(),
            details: String::new(),
        };
        let txs = vec![
            tx(600, 40001, 1_000.0, 1),
            tx(800, 60000, -400.0, 1),
            tx(800, 60000, -100.0, 2),
        ];
        aggregate(&txs, &default_categories(), &VendorResolver::default())
    }

    #[test]
    fn test_report_csv_layout() {
        let csv = report_to_csv(&sample(), false).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "Level,Code,Name,ינואר,פברואר,Total");
        assert!(lines.contains(&"0,800,שם,400.00,100.00,500.00"));
        assert!(lines.contains(&"1,60000,\"חשבון, ראשי\",400.00,100.00,500.00"));
        assert!(lines.contains(&"2,20013,תפוז,400.00,100.00,500.00"));
        // Header plus 12 categories plus 2 accounts and 2 vendors.
        assert_eq!(lines.len(), 1 + 12 + 4);
    }

    #[test]
    fn test_bom_prefix() {
        let csv = report_to_csv(&sample(), true).unwrap();
        assert!(csv.starts_with('\u{feff}'));
    }

    #[test]
    fn test_summary_csv_and_json() {
        let report = sample();
        let summary = roll_up(&report, &RollupInputs::default(), None).unwrap();

        let csv = summary_to_csv(&summary, false).unwrap();
        assert!(csv.contains("Gross profit,600.00,-100.00,500.00"));
        assert!(csv.contains("Gross margin %,60.00,0.00,50.00"));

        let json = report_to_json("Modi", &report, &summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["organization_name"], "Modi");
        assert_eq!(value["summary"]["total"]["net_profit"], 500.0);
    }
}
