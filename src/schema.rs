use crate::chart_of_accounts::{default_categories, validate_categories, CategoryDefinition};
use crate::error::{ReportError, Result};
use crate::vendors::{default_vendor_mappings, VendorMapping, SUSPENSE_ACCOUNT};
use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One ledger line after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Source document id. Lines posted by the same accounting document share it.
    pub group_id: i64,
    pub sort_code: Option<i64>,
    pub sort_code_name: String,
    pub account_key: i64,
    pub account_name: String,
    /// Signed amount, credit/debit already netted by the source system.
    pub amount: f64,
    pub date: NaiveDate,
    pub counter_account_number: i64,
    pub counter_account_name: String,
    pub details: String,
}

impl Transaction {
    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn year_month(&self) -> (i32, u32) {
        (self.date.year(), self.date.month())
    }
}

/// The canonical raw record every source adapter produces. All fields are kept
/// as the exported text; `ingestion::normalize` turns them into a `Transaction`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub document_id: String,
    pub sort_code: String,
    pub sort_code_name: String,
    pub account_key: String,
    pub account_name: String,
    pub amount: String,
    pub details: String,
    pub date: String,
    pub counter_account_number: String,
    pub counter_account_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "PascalCase")]
pub enum CacheKeying {
    /// Reuse the cached result whenever the input has the same number of
    /// transactions. Two different datasets of equal length share an entry.
    #[default]
    #[schemars(description = "Cache keyed by transaction count only")]
    Length,

    #[schemars(description = "Cache keyed by a fingerprint of every transaction")]
    Content,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CancellationSettings {
    #[schemars(
        description = "Maximum absolute sum (currency units) for a cluster to count as self-cancelling"
    )]
    pub tolerance: f64,

    #[schemars(description = "Smallest cluster size searched. Must be at least 2.")]
    pub min_cluster_size: usize,

    #[schemars(
        description = "Largest cluster size searched. Clusters with more legs go undetected."
    )]
    pub max_cluster_size: usize,

    #[schemars(
        description = "Groups with more members than this are skipped and reported instead of enumerated. None disables the cap."
    )]
    pub max_group_size: Option<usize>,

    #[serde(default)]
    pub cache_keying: CacheKeying,
}

impl Default for CancellationSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.5,
            min_cluster_size: 2,
            max_cluster_size: 5,
            max_group_size: Some(64),
            cache_keying: CacheKeying::Length,
        }
    }
}

impl CancellationSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ReportError::InvalidCancellationSettings(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.min_cluster_size < 2 {
            return Err(ReportError::InvalidCancellationSettings(format!(
                "min_cluster_size must be at least 2, got {}",
                self.min_cluster_size
            )));
        }
        if self.max_cluster_size < self.min_cluster_size {
            return Err(ReportError::InvalidCancellationSettings(format!(
                "max_cluster_size ({}) is smaller than min_cluster_size ({})",
                self.max_cluster_size, self.min_cluster_size
            )));
        }
        if let Some(cap) = self.max_group_size {
            if cap < self.min_cluster_size {
                return Err(ReportError::InvalidCancellationSettings(format!(
                    "max_group_size ({}) is smaller than min_cluster_size ({})",
                    cap, self.min_cluster_size
                )));
            }
        }
        Ok(())
    }
}

fn default_suspense_account() -> i64 {
    SUSPENSE_ACCOUNT
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReportConfig {
    #[schemars(description = "Name of the client business the report is prepared for")]
    pub organization_name: String,

    #[serde(default)]
    #[schemars(
        description = "Restrict the report to transactions dated in this calendar year. Omit to fold all years into month buckets."
    )]
    pub year: Option<i32>,

    #[serde(default = "default_suspense_account")]
    #[schemars(
        description = "Counter-account number used as a placeholder when the real supplier is not yet known"
    )]
    pub suspense_account: i64,

    #[serde(default)]
    pub cancellation: CancellationSettings,

    #[serde(default = "default_categories")]
    #[schemars(description = "Ordered report categories. Order is preserved in the output.")]
    pub categories: Vec<CategoryDefinition>,

    #[serde(default = "default_vendor_mappings")]
    #[schemars(
        description = "Keyword table used to recover the supplier of suspense-account lines. First match in table order wins."
    )]
    pub vendor_mappings: Vec<VendorMapping>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            organization_name: String::new(),
            year: None,
            suspense_account: SUSPENSE_ACCOUNT,
            cancellation: CancellationSettings::default(),
            categories: default_categories(),
            vendor_mappings: default_vendor_mappings(),
        }
    }
}

impl ReportConfig {
    pub fn validate(&self) -> Result<()> {
        validate_categories(&self.categories)?;
        self.cancellation.validate()?;
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: ReportConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReportConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = ReportConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("organization_name"));
        assert!(schema_json.contains("suspense_account"));
        assert!(schema_json.contains("max_cluster_size"));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ReportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.suspense_account, 37999);
        assert_eq!(config.categories.len(), 12);
        assert_eq!(config.cancellation.max_cluster_size, 5);
    }

    #[test]
    fn test_config_json_round_trip_keeps_categories() {
        let config = ReportConfig {
            organization_name: "Modi".to_string(),
            year: Some(2024),
            ..ReportConfig::default()
        };

        let json = config.to_json().unwrap();
        let parsed = ReportConfig::from_json(&json).unwrap();
        assert_eq!(parsed.organization_name, "Modi");
        assert_eq!(parsed.year, Some(2024));
        assert_eq!(parsed.categories, config.categories);
    }

    #[test]
    fn test_invalid_cancellation_settings() {
        let mut settings = CancellationSettings::default();
        settings.min_cluster_size = 1;
        assert!(settings.validate().is_err());

        let mut settings = CancellationSettings::default();
        settings.max_cluster_size = 1;
        assert!(settings.validate().is_err());

        let mut settings = CancellationSettings::default();
        settings.tolerance = -0.1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_transaction_month_accessors() {
        let tx = Transaction {
            group_id: 1,
            sort_code: Some(800),
            sort_code_name: String::new(),
            account_key: 60000,
            account_name: String::new(),
            amount: -10.0,
            date: NaiveDate::from_ymd_opt(2024, 7, 9).unwrap(),
            counter_account_number: 0,
            counter_account_name: String::new(),
            details: String::new(),
        };
        assert_eq!(tx.month(), 7);
        assert_eq!(tx.year(), 2024);
        assert_eq!(tx.year_month(), (2024, 7));
    }
}
