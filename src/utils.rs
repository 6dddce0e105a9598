use crate::error::{ReportError, Result};
use chrono::NaiveDate;

pub const MONTH_NAMES: [&str; 12] = [
    "ינואר",
    "פברואר",
    "מרץ",
    "אפריל",
    "מאי",
    "יוני",
    "יולי",
    "אוגוסט",
    "ספטמבר",
    "אוקטובר",
    "נובמבר",
    "דצמבר",
];

/// Parses a ledger posting date in `DD/MM/YYYY` form.
///
/// Single-digit day/month components are accepted, and a two-digit year is
/// read as 20YY. Anything else yields `None`.
pub fn parse_ledger_date(raw: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.trim().split('/').collect();
    if parts.len() != 3 {
        return None;
    }

    let day: u32 = parts[0].trim().parse().ok()?;
    let month: u32 = parts[1].trim().parse().ok()?;
    let year: i32 = parts[2].trim().parse().ok()?;
    let year = if (0..100).contains(&year) { 2000 + year } else { year };

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Converts a locale formatted amount ("1,234.50", " ₪ -102,515.70 ") to a number.
/// Empty or non-numeric input degrades to zero.
pub fn parse_amount(raw: &str) -> f64 {
    parse_amount_opt(raw).unwrap_or(0.0)
}

pub fn parse_amount_opt(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && *c != '₪' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reads the leading integer of a field, the way spreadsheet exports are
/// usually consumed: `"40010 "` is 40010 and `"12abc"` is 12.
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let mut end = 0;
    for (idx, c) in trimmed.char_indices() {
        let is_sign = idx == 0 && (c == '-' || c == '+');
        if c.is_ascii_digit() || is_sign {
            end = idx + c.len_utf8();
        } else {
            break;
        }
    }

    trimmed[..end].parse().ok()
}

pub fn parse_int_or_zero(raw: &str) -> i64 {
    parse_leading_int(raw).unwrap_or(0)
}

pub fn validate_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(ReportError::InvalidMonth(month));
    }
    Ok(())
}

/// Quarter (1..=4) that a calendar month belongs to.
pub fn quarter_of_month(month: u32) -> u32 {
    (month.clamp(1, 12) - 1) / 3 + 1
}

pub fn month_name(month: u32) -> Option<&'static str> {
    MONTH_NAMES.get((month as usize).checked_sub(1)?).copied()
}

/// `value` as a percentage of `base`. A zero base yields 0 rather than NaN/inf.
pub fn percent_of(value: f64, base: f64) -> f64 {
    if base == 0.0 {
        return 0.0;
    }
    value / base * 100.0
}

pub fn format_percent(value: f64, base: f64) -> String {
    format!("{:.1}%", percent_of(value, base))
}

/// Format a float as a shekel amount with thousands separators: ₪1,234.56
pub fn format_currency(value: f64) -> String {
    let negative = value < 0.0;
    let cents = format!("{:.2}", value.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    if negative {
        format!("-₪{grouped}.{dec_part}")
    } else {
        format!("₪{grouped}.{dec_part}")
    }
}

/// Truncates to `max_chars` characters (not bytes), appending "..." when cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ledger_date() {
        assert_eq!(
            parse_ledger_date("15/03/2024"),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(
            parse_ledger_date(" 1/2/2024 "),
            NaiveDate::from_ymd_opt(2024, 2, 1)
        );
        assert_eq!(
            parse_ledger_date("01/12/24"),
            NaiveDate::from_ymd_opt(2024, 12, 1)
        );
        assert_eq!(parse_ledger_date(""), None);
        assert_eq!(parse_ledger_date("2024-03-15"), None);
        assert_eq!(parse_ledger_date("31/02/2024"), None);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.50"), 1234.5);
        assert_eq!(parse_amount(" ₪ -102,515.70 "), -102515.7);
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("abc"), 0.0);
        assert_eq!(parse_amount_opt("  "), None);
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("40010 "), Some(40010));
        assert_eq!(parse_leading_int("12abc"), Some(12));
        assert_eq!(parse_leading_int("-7"), Some(-7));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_int_or_zero(""), 0);
    }

    #[test]
    fn test_quarters_and_month_names() {
        assert_eq!(quarter_of_month(1), 1);
        assert_eq!(quarter_of_month(3), 1);
        assert_eq!(quarter_of_month(4), 2);
        assert_eq!(quarter_of_month(12), 4);
        assert_eq!(month_name(1), Some("ינואר"));
        assert_eq!(month_name(0), None);
        assert_eq!(month_name(13), None);
        assert!(validate_month(13).is_err());
    }

    #[test]
    fn test_percent_of_zero_base() {
        assert_eq!(percent_of(50.0, 0.0), 0.0);
        assert_eq!(percent_of(25.0, 200.0), 12.5);
        assert_eq!(format_percent(1.0, 0.0), "0.0%");
    }

    #[test]
    fn test_currency_formatting() {
        assert_eq!(format_currency(1234.56), "₪1,234.56");
        assert_eq!(format_currency(-500.0), "-₪500.00");
        assert_eq!(format_currency(0.0), "₪0.00");
        assert_eq!(format_currency(1_000_000.99), "₪1,000,000.99");
    }

    #[test]
    fn test_truncate_counts_characters() {
        let hebrew = "תשלום לספק עבור שירותי שילוח והובלה";
        let short = truncate_with_ellipsis(hebrew, 30);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), 33);
        assert_eq!(truncate_with_ellipsis("short", 30), "short");
    }
}
