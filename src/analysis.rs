use crate::schema::Transaction;
use crate::utils::{format_currency, month_name};
use crate::vendors::VendorResolver;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Expense sort codes start here; revenue (600) and balance-sheet codes are
/// below it.
pub const EXPENSE_SORT_CODE_FROM: i64 = 800;
/// A vendor active in at least this many months is a recurring supplier.
pub const RECURRING_MIN_MONTHS: usize = 3;
/// A recurring vendor must have been active this many months before it can
/// be reported as stopped.
pub const STOPPED_MIN_MONTHS: usize = 4;
pub const DEVIATION_RATIO: f64 = 0.5;
/// Averages at or below this are too small for deviation alerts.
pub const DEVIATION_MIN_AVERAGE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    /// A recurring vendor has no invoice in a month after it first appeared.
    Missing { month: u32 },
    LowAmount { month: u32, amount: f64, average: f64 },
    HighAmount { month: u32, amount: f64, average: f64 },
    /// Seen only in the last analysed month.
    FirstTime,
    Stopped { last_active: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VendorAlert {
    pub kind: AlertKind,
    pub severity: Severity,
}

impl VendorAlert {
    pub fn month(&self) -> Option<u32> {
        match self.kind {
            AlertKind::Missing { month }
            | AlertKind::LowAmount { month, .. }
            | AlertKind::HighAmount { month, .. } => Some(month),
            AlertKind::FirstTime | AlertKind::Stopped { .. } => None,
        }
    }
}

fn month_label(month: u32) -> String {
    month_name(month).map_or_else(|| month.to_string(), str::to_string)
}

impl fmt::Display for VendorAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AlertKind::Missing { month } => {
                write!(f, "missing invoice in {}", month_label(month))
            }
            AlertKind::LowAmount {
                month,
                amount,
                average,
            } => write!(
                f,
                "low amount in {}: {} (average {})",
                month_label(month),
                format_currency(amount),
                format_currency(average)
            ),
            AlertKind::HighAmount {
                month,
                amount,
                average,
            } => write!(
                f,
                "high amount in {}: {} (average {})",
                month_label(month),
                format_currency(amount),
                format_currency(average)
            ),
            AlertKind::FirstTime => write!(f, "new vendor this month"),
            AlertKind::Stopped { last_active } => {
                write!(f, "no activity since {}", month_label(last_active))
            }
        }
    }
}

/// Monthly spend pattern of one resolved vendor over the analysed months.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorActivity {
    pub vendor_key: i64,
    pub vendor_name: String,
    /// Sort code of the first line seen for the vendor.
    pub sort_code: Option<i64>,
    pub sort_code_name: String,
    /// Month → sum of absolute amounts.
    pub monthly_amounts: BTreeMap<u32, f64>,
    pub months_active: Vec<u32>,
    pub months_missing: Vec<u32>,
    pub total_months: usize,
    /// Share of analysed months with activity, in percent.
    pub frequency: f64,
    pub average_amount: f64,
    pub is_recurring: bool,
    pub alerts: Vec<VendorAlert>,
}

impl VendorActivity {
    pub fn count_of(&self, severity: Severity) -> usize {
        self.alerts.iter().filter(|a| a.severity == severity).count()
    }

    fn detect_alerts(&mut self, months: &[u32], last_month: u32) {
        if self.is_recurring {
            let first_active = self.months_active.first().copied().unwrap_or(last_month);
            let last_active = self.months_active.last().copied().unwrap_or(last_month);

            for month in first_active..=last_month {
                if months.contains(&month) && !self.monthly_amounts.contains_key(&month) {
                    self.months_missing.push(month);
                    self.alerts.push(VendorAlert {
                        kind: AlertKind::Missing { month },
                        severity: if month == last_month {
                            Severity::Error
                        } else {
                            Severity::Warning
                        },
                    });
                }
            }

            let average = self.average_amount;
            if average > DEVIATION_MIN_AVERAGE {
                for (&month, &amount) in &self.monthly_amounts {
                    if (amount - average).abs() / average <= DEVIATION_RATIO {
                        continue;
                    }
                    let kind = if amount < average {
                        AlertKind::LowAmount {
                            month,
                            amount,
                            average,
                        }
                    } else {
                        AlertKind::HighAmount {
                            month,
                            amount,
                            average,
                        }
                    };
                    self.alerts.push(VendorAlert {
                        kind,
                        severity: Severity::Info,
                    });
                }
            }

            if last_active + 1 < last_month && self.months_active.len() >= STOPPED_MIN_MONTHS {
                self.alerts.push(VendorAlert {
                    kind: AlertKind::Stopped { last_active },
                    severity: Severity::Warning,
                });
            }
        }

        if self.months_active == [last_month] {
            self.alerts.push(VendorAlert {
                kind: AlertKind::FirstTime,
                severity: Severity::Info,
            });
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecurringStats {
    pub total_alerts: usize,
    pub missing_alerts: usize,
    pub recurring_vendors: usize,
}

/// Finds recurring suppliers among expense lines (sort code 800 and up) and
/// flags gaps, unusual amounts, vendors that stopped and first-time vendors.
///
/// Suspense-account lines are attributed through `resolver` first. Only
/// vendors that are recurring or carry an alert are returned, ordered by
/// error count, then warning count (both descending), then frequency.
pub fn analyze_recurring_expenses(
    transactions: &[Transaction],
    months: &[u32],
    resolver: &VendorResolver,
) -> Vec<VendorActivity> {
    let Some(&last_month) = months.iter().max() else {
        return Vec::new();
    };

    let mut vendors: Vec<VendorActivity> = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();

    for tx in transactions {
        if !tx.sort_code.is_some_and(|code| code >= EXPENSE_SORT_CODE_FROM) {
            continue;
        }

        let month = tx.month();
        if !months.contains(&month) {
            continue;
        }

        let resolved = resolver.resolve_transaction(tx);
        let vendor_key = if resolved.vendor_key != 0 {
            resolved.vendor_key
        } else {
            tx.counter_account_number
        };
        if vendor_key == 0 {
            continue;
        }

        let slot = *index.entry(vendor_key).or_insert_with(|| {
            let vendor_name = if resolved.vendor_name.is_empty() {
                "unknown".to_string()
            } else {
                resolved.vendor_name.clone()
            };
            vendors.push(VendorActivity {
                vendor_key,
                vendor_name,
                sort_code: tx.sort_code,
                sort_code_name: tx.sort_code_name.clone(),
                monthly_amounts: BTreeMap::new(),
                months_active: Vec::new(),
                months_missing: Vec::new(),
                total_months: months.len(),
                frequency: 0.0,
                average_amount: 0.0,
                is_recurring: false,
                alerts: Vec::new(),
            });
            vendors.len() - 1
        });

        *vendors[slot].monthly_amounts.entry(month).or_insert(0.0) += tx.amount.abs();
    }

    for vendor in &mut vendors {
        vendor.months_active = vendor.monthly_amounts.keys().copied().collect();
        vendor.frequency = vendor.months_active.len() as f64 / months.len() as f64 * 100.0;
        vendor.average_amount =
            vendor.monthly_amounts.values().sum::<f64>() / vendor.monthly_amounts.len() as f64;
        vendor.is_recurring = vendor.months_active.len() >= RECURRING_MIN_MONTHS;
        vendor.detect_alerts(months, last_month);
    }

    vendors.retain(|v| v.is_recurring || !v.alerts.is_empty());
    vendors.sort_by(|a, b| {
        b.count_of(Severity::Error)
            .cmp(&a.count_of(Severity::Error))
            .then_with(|| b.count_of(Severity::Warning).cmp(&a.count_of(Severity::Warning)))
            .then_with(|| b.frequency.total_cmp(&a.frequency))
    });

    debug!(
        "Recurring expense analysis: {} vendors reported over {} months",
        vendors.len(),
        months.len()
    );

    vendors
}

pub fn recurring_stats(vendors: &[VendorActivity]) -> RecurringStats {
    RecurringStats {
        total_alerts: vendors.iter().map(|v| v.alerts.len()).sum(),
        missing_alerts: vendors
            .iter()
            .flat_map(|v| &v.alerts)
            .filter(|a| matches!(a.kind, AlertKind::Missing { .. }))
            .count(),
        recurring_vendors: vendors.iter().filter(|v| v.is_recurring).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendors::SUSPENSE_ACCOUNT;
    use chrono::NaiveDate;

    fn tx(sort_code: i64, counter: i64, amount: f64, month: u32) -> Transaction {
        Transaction {
            group_id: 1,
            sort_code: Some(sort_code),
            sort_code_name: format!("קוד {sort_code}"),
            account_key: 70000,
            account_name: String::new(),
            amount,
            date: NaiveDate::from_ymd_opt(2024, month, 10).unwrap(),
            counter_account_number: counter,
            counter_account_name: format!("ספק {counter}"),
            details: String::new(),
        }
    }

    fn monthly(counter: i64, amount: f64, months: &[u32]) -> Vec<Transaction> {
        months.iter().map(|&m| tx(802, counter, amount, m)).collect()
    }

    fn analyze(txs: &[Transaction], months: &[u32]) -> Vec<VendorActivity> {
        analyze_recurring_expenses(txs, months, &VendorResolver::default())
    }

    fn find(vendors: &[VendorActivity], key: i64) -> &VendorActivity {
        vendors.iter().find(|v| v.vendor_key == key).unwrap()
    }

    #[test]
    fn test_steady_vendor_has_no_alerts() {
        let txs = monthly(20100, -1_000.0, &[1, 2, 3, 4]);
        let vendors = analyze(&txs, &[1, 2, 3, 4]);

        assert_eq!(vendors.len(), 1);
        let vendor = &vendors[0];
        assert!(vendor.is_recurring);
        assert_eq!(vendor.months_active, vec![1, 2, 3, 4]);
        assert_eq!(vendor.frequency, 100.0);
        assert_eq!(vendor.average_amount, 1_000.0);
        assert!(vendor.alerts.is_empty());
    }

    #[test]
    fn test_missing_months_after_first_activity() {
        let txs = monthly(20100, -1_000.0, &[2, 3, 5]);
        let vendors = analyze(&txs, &[1, 2, 3, 4, 5, 6]);
        let vendor = find(&vendors, 20100);

        assert_eq!(vendor.months_missing, vec![4, 6]);
        let missing: Vec<(Option<u32>, Severity)> =
            vendor.alerts.iter().map(|a| (a.month(), a.severity)).collect();
        assert_eq!(
            missing,
            vec![(Some(4), Severity::Warning), (Some(6), Severity::Error)]
        );
    }

    #[test]
    fn test_amount_deviation_alerts() {
        let mut txs = monthly(20100, -1_000.0, &[1, 2, 3]);
        txs.push(tx(802, 20100, -3_000.0, 4));
        txs.push(tx(802, 20100, -200.0, 5));
        let vendors = analyze(&txs, &[1, 2, 3, 4, 5]);
        let vendor = find(&vendors, 20100);

        // Average is 6,200 / 5 = 1,240.
        assert_eq!(vendor.alerts.len(), 2);
        assert!(matches!(
            vendor.alerts[0].kind,
            AlertKind::HighAmount { month: 4, .. }
        ));
        assert!(matches!(
            vendor.alerts[1].kind,
            AlertKind::LowAmount { month: 5, .. }
        ));
        assert!(vendor.alerts.iter().all(|a| a.severity == Severity::Info));
    }

    #[test]
    fn test_small_averages_never_deviate() {
        let mut txs = monthly(20100, -10.0, &[1, 2]);
        txs.push(tx(802, 20100, -90.0, 3));
        let vendors = analyze(&txs, &[1, 2, 3]);
        assert!(find(&vendors, 20100).alerts.is_empty());
    }

    #[test]
    fn test_stopped_vendor() {
        let txs = monthly(20100, -500.0, &[1, 2, 3, 4]);
        let vendors = analyze(&txs, &[1, 2, 3, 4, 5, 6]);
        let vendor = find(&vendors, 20100);

        assert!(vendor
            .alerts
            .iter()
            .any(|a| a.kind == AlertKind::Stopped { last_active: 4 }));
        // Months 5 and 6 are missing as well.
        assert_eq!(vendor.months_missing, vec![5, 6]);

        let three = monthly(20200, -500.0, &[1, 2, 3]);
        let vendors = analyze(&three, &[1, 2, 3, 4, 5, 6]);
        assert!(!find(&vendors, 20200)
            .alerts
            .iter()
            .any(|a| matches!(a.kind, AlertKind::Stopped { .. })));
    }

    #[test]
    fn test_first_time_vendor() {
        let txs = vec![tx(805, 20300, -700.0, 6), tx(805, 20400, -700.0, 5)];
        let vendors = analyze(&txs, &[4, 5, 6]);

        assert_eq!(vendors.len(), 1);
        assert_eq!(vendors[0].vendor_key, 20300);
        assert!(!vendors[0].is_recurring);
        assert_eq!(vendors[0].alerts[0].kind, AlertKind::FirstTime);
        assert_eq!(vendors[0].alerts[0].to_string(), "new vendor this month");
    }

    #[test]
    fn test_revenue_and_out_of_range_months_are_ignored() {
        let mut txs = monthly(20100, -1_000.0, &[1, 2, 3]);
        txs.extend((1..=3).map(|m| tx(600, 20500, 5_000.0, m)));
        txs.push(tx(802, 20100, -50_000.0, 9));

        let vendors = analyze(&txs, &[1, 2, 3]);
        assert_eq!(vendors.len(), 1);
        assert_eq!(vendors[0].monthly_amounts.len(), 3);
        assert!(analyze(&txs, &[]).is_empty());
    }

    #[test]
    fn test_suspense_lines_resolve_to_vendors() {
        let txs: Vec<Transaction> = (1..=3)
            .map(|m| {
                let mut line = tx(802, SUSPENSE_ACCOUNT, -400.0, m);
                line.details = "GOOGLE ADS".to_string();
                line
            })
            .collect();

        let vendors = analyze(&txs, &[1, 2, 3]);
        assert_eq!(vendors.len(), 1);
        assert_ne!(vendors[0].vendor_key, SUSPENSE_ACCOUNT);
        assert!(vendors[0].is_recurring);
    }

    #[test]
    fn test_ordering_and_stats() {
        let mut txs = monthly(20100, -1_000.0, &[1, 2, 3, 4]);
        txs.extend(monthly(20200, -1_000.0, &[1, 2, 3]));
        txs.extend(monthly(20300, -1_000.0, &[1, 2, 3]));
        txs.push(tx(802, 20300, -1_000.0, 2));

        let vendors = analyze(&txs, &[1, 2, 3, 4]);
        let keys: Vec<i64> = vendors.iter().map(|v| v.vendor_key).collect();
        // 20200 and 20300 both miss April (an error); 20100 is steady.
        assert_eq!(keys, vec![20200, 20300, 20100]);

        let stats = recurring_stats(&vendors);
        assert_eq!(stats.recurring_vendors, 3);
        assert_eq!(stats.missing_alerts, 2);
    }
}
