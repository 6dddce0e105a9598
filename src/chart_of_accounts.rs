use crate::error::{ReportError, Result};
use crate::schema::{ReportConfig, Transaction};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    #[schemars(description = "Sales revenue, reported signed (conventionally positive)")]
    Income,

    #[schemars(description = "Cost of goods sold, adjusted by opening/closing inventory")]
    Cogs,

    #[schemars(description = "Operating expenses")]
    Operating,

    #[schemars(description = "Financing expenses, below operating profit")]
    Financial,
}

impl CategoryKind {
    pub const ALL: [CategoryKind; 4] = [
        CategoryKind::Income,
        CategoryKind::Cogs,
        CategoryKind::Operating,
        CategoryKind::Financial,
    ];

    pub fn is_expense(&self) -> bool {
        !matches!(self, CategoryKind::Income)
    }

    /// Revenue is shown signed; expenses are shown as the absolute value of
    /// their signed total. The signed value stays on the node for roll-up math.
    pub fn display_value(&self, signed: f64) -> f64 {
        if self.is_expense() {
            signed.abs()
        } else {
            signed
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CategoryKind::Income => "Revenue",
            CategoryKind::Cogs => "Cost of Goods Sold",
            CategoryKind::Operating => "Operating Expenses",
            CategoryKind::Financial => "Financial Expenses",
        }
    }
}

/// Which ledger lines belong to a category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum CategorySelector {
    /// Every line carrying this sort code.
    SortCode { sort_code: i64 },

    /// Lines with this sort code whose account key falls in `[account_from, account_to)`.
    /// A missing bound is open.
    SortCodeAccountRange {
        sort_code: i64,
        #[serde(default)]
        account_from: Option<i64>,
        #[serde(default)]
        account_to: Option<i64>,
    },
}

impl CategorySelector {
    pub fn matches(&self, tx: &Transaction) -> bool {
        match self {
            CategorySelector::SortCode { sort_code } => tx.sort_code == Some(*sort_code),
            CategorySelector::SortCodeAccountRange {
                sort_code,
                account_from,
                account_to,
            } => {
                tx.sort_code == Some(*sort_code)
                    && account_from.map_or(true, |from| tx.account_key >= from)
                    && account_to.map_or(true, |to| tx.account_key < to)
            }
        }
    }

    pub fn sort_code(&self) -> i64 {
        match self {
            CategorySelector::SortCode { sort_code }
            | CategorySelector::SortCodeAccountRange { sort_code, .. } => *sort_code,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CategoryDefinition {
    #[schemars(
        description = "Stable code of the category. Also the key manual adjustments are stored under."
    )]
    pub code: String,

    #[schemars(
        description = "Display name used when no transaction supplies a sort code name"
    )]
    pub fallback_name: String,

    pub kind: CategoryKind,

    pub selector: CategorySelector,
}

impl CategoryDefinition {
    pub fn by_sort_code(sort_code: i64, kind: CategoryKind) -> Self {
        Self {
            code: sort_code.to_string(),
            fallback_name: format!("Code {sort_code}"),
            kind,
            selector: CategorySelector::SortCode { sort_code },
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.selector.matches(tx)
    }
}

/// The firm's standard profit and loss layout. Sort code 600 is split by sales
/// channel on the account key: website accounts are 40000..40020, Super-Pharm
/// accounts start at 40020.
pub fn default_categories() -> Vec<CategoryDefinition> {
    let mut categories = vec![
        CategoryDefinition {
            code: "income_site".to_string(),
            fallback_name: "הכנסות מכירות - אתר".to_string(),
            kind: CategoryKind::Income,
            selector: CategorySelector::SortCodeAccountRange {
                sort_code: 600,
                account_from: Some(40000),
                account_to: Some(40020),
            },
        },
        CategoryDefinition {
            code: "income_superpharm".to_string(),
            fallback_name: "הכנסות מכירות - סופרפארם".to_string(),
            kind: CategoryKind::Income,
            selector: CategorySelector::SortCodeAccountRange {
                sort_code: 600,
                account_from: Some(40020),
                account_to: None,
            },
        },
    ];

    categories.extend(
        [800]
            .into_iter()
            .map(|code| CategoryDefinition::by_sort_code(code, CategoryKind::Cogs)),
    );
    categories.extend(
        [801, 802, 804, 805, 806, 811]
            .into_iter()
            .map(|code| CategoryDefinition::by_sort_code(code, CategoryKind::Operating)),
    );
    categories.extend(
        [813, 990, 991]
            .into_iter()
            .map(|code| CategoryDefinition::by_sort_code(code, CategoryKind::Financial)),
    );

    categories
}

pub fn validate_categories(categories: &[CategoryDefinition]) -> Result<()> {
    let mut seen = HashSet::new();

    for category in categories {
        if category.code.trim().is_empty() {
            return Err(ReportError::InvalidCategory {
                code: category.code.clone(),
                details: "category code must not be empty".to_string(),
            });
        }

        if !seen.insert(category.code.as_str()) {
            return Err(ReportError::DuplicateCategory(category.code.clone()));
        }

        if let CategorySelector::SortCodeAccountRange {
            account_from: Some(from),
            account_to: Some(to),
            ..
        } = category.selector
        {
            if to <= from {
                return Err(ReportError::InvalidCategory {
                    code: category.code.clone(),
                    details: format!("account range [{from}, {to}) is empty"),
                });
            }
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub code: String,
    pub name: String,
    pub sort_code: i64,
    pub selector: CategorySelector,
}

/// The configured categories grouped by report section, for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartOfAccounts {
    pub organization_name: String,
    pub income: Vec<CategoryEntry>,
    pub cogs: Vec<CategoryEntry>,
    pub operating: Vec<CategoryEntry>,
    pub financial: Vec<CategoryEntry>,
}

impl ChartOfAccounts {
    pub fn from_config(config: &ReportConfig) -> Self {
        let mut income = Vec::new();
        let mut cogs = Vec::new();
        let mut operating = Vec::new();
        let mut financial = Vec::new();

        for category in &config.categories {
            let entry = CategoryEntry {
                code: category.code.clone(),
                name: category.fallback_name.clone(),
                sort_code: category.selector.sort_code(),
                selector: category.selector.clone(),
            };

            match category.kind {
                CategoryKind::Income => income.push(entry),
                CategoryKind::Cogs => cogs.push(entry),
                CategoryKind::Operating => operating.push(entry),
                CategoryKind::Financial => financial.push(entry),
            }
        }

        Self {
            organization_name: config.organization_name.clone(),
            income,
            cogs,
            operating,
            financial,
        }
    }

    pub fn section(&self, kind: CategoryKind) -> &[CategoryEntry] {
        match kind {
            CategoryKind::Income => &self.income,
            CategoryKind::Cogs => &self.cogs,
            CategoryKind::Operating => &self.operating,
            CategoryKind::Financial => &self.financial,
        }
    }

    pub fn codes_of(&self, kind: CategoryKind) -> Vec<String> {
        self.section(kind).iter().map(|e| e.code.clone()).collect()
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("Section,Code,Sort Code,Name\n");

        for kind in CategoryKind::ALL {
            for entry in self.section(kind) {
                output.push_str(&format!(
                    "{},{},{},{}\n",
                    kind.label(),
                    entry.code,
                    entry.sort_code,
                    entry.name
                ));
            }
        }

        output
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("# Report Categories - {}\n\n", self.organization_name));

        for kind in CategoryKind::ALL {
            output.push_str(&format!("## {}\n\n", kind.label()));
            for entry in self.section(kind) {
                let range = match entry.selector {
                    CategorySelector::SortCodeAccountRange {
                        account_from,
                        account_to,
                        ..
                    } => format!(
                        " (accounts {}..{})",
                        account_from.map(|v| v.to_string()).unwrap_or_default(),
                        account_to.map(|v| v.to_string()).unwrap_or_default()
                    ),
                    CategorySelector::SortCode { .. } => String::new(),
                };
                output.push_str(&format!(
                    "- `{}` sort code {}{}: {}\n",
                    entry.code, entry.sort_code, range, entry.name
                ));
            }
            output.push('\n');
        }

        output
    }

    pub fn total_categories(&self) -> usize {
        self.income.len() + self.cogs.len() + self.operating.len() + self.financial.len()
    }
}
