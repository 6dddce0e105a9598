use crate::error::Result;
use crate::utils::{parse_amount, parse_amount_opt, parse_leading_int};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryKind {
    Opening,
    Closing,
}

/// Read side of the externally owned adjustment and inventory store.
/// Missing values read as zero; implementations never fail.
pub trait AdjustmentSource {
    fn category_adjustment(&self, category_code: &str, year: i32, month: u32) -> f64;

    fn inventory(&self, year: i32, month: u32, kind: InventoryKind) -> f64;
}

/// A store with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdjustments;

impl AdjustmentSource for NoAdjustments {
    fn category_adjustment(&self, _category_code: &str, _year: i32, _month: u32) -> f64 {
        0.0
    }

    fn inventory(&self, _year: i32, _month: u32, _kind: InventoryKind) -> f64 {
        0.0
    }
}

/// Value as it was entered. Free text keeps the user's input for display and
/// reads as zero unless it parses as an amount.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Amount(f64),
    Text(String),
}

impl StoredValue {
    pub fn amount(&self) -> f64 {
        match self {
            StoredValue::Amount(v) if v.is_finite() => *v,
            StoredValue::Amount(_) => 0.0,
            StoredValue::Text(raw) => parse_amount(raw),
        }
    }
}

/// In-memory adjustment and inventory store.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentBook {
    adjustments: HashMap<(String, i32, u32), StoredValue>,
    inventory: HashMap<(i32, u32, InventoryKind), StoredValue>,
}

impl AdjustmentBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_adjustment(&mut self, category_code: &str, year: i32, month: u32, amount: f64) {
        self.adjustments.insert(
            (category_code.to_string(), year, month),
            StoredValue::Amount(amount),
        );
    }

    pub fn set_adjustment_text(
        &mut self,
        category_code: &str,
        year: i32,
        month: u32,
        raw: impl Into<String>,
    ) {
        self.adjustments.insert(
            (category_code.to_string(), year, month),
            StoredValue::Text(raw.into()),
        );
    }

    /// Adds to whatever is already stored for the cell.
    pub fn add_adjustment(&mut self, category_code: &str, year: i32, month: u32, amount: f64) {
        let key = (category_code.to_string(), year, month);
        let current = self.adjustments.get(&key).map_or(0.0, StoredValue::amount);
        self.adjustments
            .insert(key, StoredValue::Amount(current + amount));
    }

    pub fn set_inventory(&mut self, year: i32, month: u32, kind: InventoryKind, amount: f64) {
        self.inventory
            .insert((year, month, kind), StoredValue::Amount(amount));
    }

    pub fn set_inventory_text(
        &mut self,
        year: i32,
        month: u32,
        kind: InventoryKind,
        raw: impl Into<String>,
    ) {
        self.inventory
            .insert((year, month, kind), StoredValue::Text(raw.into()));
    }

    pub fn stored_adjustment(
        &self,
        category_code: &str,
        year: i32,
        month: u32,
    ) -> Option<&StoredValue> {
        self.adjustments.get(&(category_code.to_string(), year, month))
    }

    pub fn clear_adjustment(&mut self, category_code: &str, year: i32, month: u32) {
        self.adjustments
            .remove(&(category_code.to_string(), year, month));
    }

    pub fn is_empty(&self) -> bool {
        self.adjustments.is_empty() && self.inventory.is_empty()
    }

    pub fn from_records(records: &[AdjustmentRecord]) -> Self {
        let mut book = Self::new();
        for record in records {
            book.add_adjustment(
                &record.sort_code.to_string(),
                record.year,
                record.month,
                record.amount,
            );
        }
        book
    }

    /// Imports an adjustments export, summing into existing cells. Returns the
    /// number of rows accepted.
    pub fn import_csv<R: Read>(&mut self, reader: R) -> Result<usize> {
        let records = read_adjustments_csv(reader)?;
        for record in &records {
            self.add_adjustment(
                &record.sort_code.to_string(),
                record.year,
                record.month,
                record.amount,
            );
        }
        Ok(records.len())
    }
}

impl AdjustmentSource for AdjustmentBook {
    fn category_adjustment(&self, category_code: &str, year: i32, month: u32) -> f64 {
        self.stored_adjustment(category_code, year, month)
            .map_or(0.0, StoredValue::amount)
    }

    fn inventory(&self, year: i32, month: u32, kind: InventoryKind) -> f64 {
        self.inventory
            .get(&(year, month, kind))
            .map_or(0.0, StoredValue::amount)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    pub sort_code: i64,
    pub year: i32,
    pub month: u32,
    pub amount: f64,
}

const SORT_CODE_COLUMN: &str = "קוד מיון";
const PERIOD_COLUMN: &str = "תקופה";
const AMOUNT_COLUMN: &str = "סכום הוצאה נטו";

const HEBREW_MONTHS: [(&str, u32); 22] = [
    ("ינו", 1),
    ("ינואר", 1),
    ("פבר", 2),
    ("פברואר", 2),
    ("מרץ", 3),
    ("אפר", 4),
    ("אפריל", 4),
    ("מאי", 5),
    ("יונ", 6),
    ("יוני", 6),
    ("יול", 7),
    ("יולי", 7),
    ("אוג", 8),
    ("אוגוסט", 8),
    ("ספט", 9),
    ("ספטמבר", 9),
    ("אוק", 10),
    ("אוקטובר", 10),
    ("נוב", 11),
    ("נובמבר", 11),
    ("דצמ", 12),
    ("דצמבר", 12),
];

/// Parses an export period such as `נוב-24` or `ינואר-2025` into (year, month).
pub fn parse_period(raw: &str) -> Option<(i32, u32)> {
    let (month_part, year_part) = raw.trim().split_once('-')?;
    if year_part.contains('-') {
        return None;
    }

    let month = HEBREW_MONTHS
        .iter()
        .find(|(name, _)| *name == month_part.trim())
        .map(|(_, number)| *number)?;

    let year = parse_leading_int(year_part)?;
    let year = if (0..100).contains(&year) { 2000 + year } else { year };

    Some((i32::try_from(year).ok()?, month))
}

/// Reads the adjustments export. Rows with no sort code are summary lines
/// and are skipped silently; rows with a bad period or amount are skipped
/// with a warning.
pub fn read_adjustments_csv<R: Read>(reader: R) -> Result<Vec<AdjustmentRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let (sort_col, period_col, amount_col) =
        (column(SORT_CODE_COLUMN), column(PERIOD_COLUMN), column(AMOUNT_COLUMN));

    let mut records = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result?;
        let line = idx + 2;
        let field = |col: Option<usize>| col.and_then(|c| record.get(c)).unwrap_or("").trim();

        let Some(sort_code) = parse_leading_int(field(sort_col)) else {
            continue;
        };

        let period = field(period_col);
        let Some((year, month)) = parse_period(period) else {
            warn!("Adjustments line {}: invalid period '{}'", line, period);
            continue;
        };

        let amount_raw = field(amount_col);
        let Some(amount) = parse_amount_opt(amount_raw) else {
            warn!("Adjustments line {}: invalid amount '{}'", line, amount_raw);
            continue;
        };

        records.push(AdjustmentRecord {
            sort_code,
            year,
            month,
            amount,
        });
    }

    debug!("Parsed {} adjustment rows", records.len());
    Ok(records)
}

/// Sums records sharing (sort code, year, month); first-seen order.
pub fn aggregate_adjustments(records: &[AdjustmentRecord]) -> Vec<AdjustmentRecord> {
    let mut merged: Vec<AdjustmentRecord> = Vec::new();
    let mut index: HashMap<(i64, i32, u32), usize> = HashMap::new();

    for record in records {
        let key = (record.sort_code, record.year, record.month);
        match index.get(&key).copied() {
            Some(slot) => merged[slot].amount += record.amount,
            None => {
                index.insert(key, merged.len());
                merged.push(record.clone());
            }
        }
    }

    merged
}

/// Fills the opening inventory of month m from the closing inventory of
/// m - 1 wherever the opening is absent or zero. Explicit openings win.
pub fn carry_forward_inventory(
    opening: &BTreeMap<u32, f64>,
    closing: &BTreeMap<u32, f64>,
    months: &[u32],
) -> BTreeMap<u32, f64> {
    let mut filled = opening.clone();

    for &month in months {
        let explicit = opening.get(&month).copied().unwrap_or(0.0);
        if explicit != 0.0 || month <= 1 {
            continue;
        }
        if let Some(&previous_close) = closing.get(&(month - 1)) {
            filled.insert(month, previous_close);
        }
    }

    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_textual_values_read_as_zero() {
        let mut book = AdjustmentBook::new();
        book.set_adjustment_text("800", 2024, 1, "");
        book.set_adjustment_text("801", 2024, 1, "-");
        book.set_adjustment_text("802", 2024, 1, "לבדוק");
        book.set_adjustment_text("804", 2024, 1, "1,250.5");

        assert_eq!(book.category_adjustment("800", 2024, 1), 0.0);
        assert_eq!(book.category_adjustment("801", 2024, 1), 0.0);
        assert_eq!(book.category_adjustment("802", 2024, 1), 0.0);
        assert_eq!(book.category_adjustment("804", 2024, 1), 1250.5);
        assert_eq!(book.category_adjustment("805", 2024, 1), 0.0);
        assert_eq!(book.inventory(2024, 1, InventoryKind::Opening), 0.0);
    }

    #[test]
    fn test_inventory_by_kind() {
        let mut book = AdjustmentBook::new();
        book.set_inventory(2024, 3, InventoryKind::Opening, 5000.0);
        book.set_inventory_text(2024, 3, InventoryKind::Closing, "8,000");

        assert_eq!(book.inventory(2024, 3, InventoryKind::Opening), 5000.0);
        assert_eq!(book.inventory(2024, 3, InventoryKind::Closing), 8000.0);
        assert_eq!(book.inventory(2023, 3, InventoryKind::Closing), 0.0);
    }

    #[test]
    fn test_parse_period() {
        assert_eq!(parse_period("נוב-24"), Some((2024, 11)));
        assert_eq!(parse_period(" דצמ-2024 "), Some((2024, 12)));
        assert_eq!(parse_period("ינואר-25"), Some((2025, 1)));
        assert_eq!(parse_period("nov-24"), None);
        assert_eq!(parse_period("נוב"), None);
        assert_eq!(parse_period(""), None);
    }

    #[test]
    fn test_read_adjustments_csv() {
        let csv = "כרטיס הוצאה,קוד מיון,תקופה,נרשם ב,ספק,סכום הוצאה נטו\n\
                   60010,800,נוב-24,דצמ-24,פלאנט,\" ₪ -102,515.70 \"\n\
                   60011,800,נוב-24,דצמ-24,תפוז,\" ₪ 2,515.70 \"\n\
                   70001,801,xx-24,דצמ-24,שכר,100\n\
                   ,,,,סה\"כ,\"-100,000\"\n\
                   70002,802,דצמ-24,ינו-25,גוגל,abc\n";

        let records = read_adjustments_csv(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].month, 11);
        assert_eq!(records[0].year, 2024);
        assert!((records[0].amount + 102515.70).abs() < 1e-9);

        let merged = aggregate_adjustments(&records);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].amount + 100000.0).abs() < 1e-6);

        let mut book = AdjustmentBook::new();
        assert_eq!(book.import_csv(csv.as_bytes()).unwrap(), 2);
        assert!((book.category_adjustment("800", 2024, 11) + 100000.0).abs() < 1e-6);
    }

    #[test]
    fn test_carry_forward_inventory() {
        let opening = BTreeMap::from([(1, 1000.0), (3, 4000.0)]);
        let closing = BTreeMap::from([(1, 1500.0), (2, 2500.0), (3, 3000.0)]);

        let filled = carry_forward_inventory(&opening, &closing, &[1, 2, 3, 4]);
        assert_eq!(filled.get(&1), Some(&1000.0));
        assert_eq!(filled.get(&2), Some(&1500.0));
        assert_eq!(filled.get(&3), Some(&4000.0));
        assert_eq!(filled.get(&4), Some(&3000.0));
    }
}
