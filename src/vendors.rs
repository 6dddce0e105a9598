use crate::schema::{ReportConfig, Transaction};
use crate::utils::truncate_with_ellipsis;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Counter account used for "suppliers payable, invoice pending" postings.
pub const SUSPENSE_ACCOUNT: i64 = 37999;

const FALLBACK_DETAILS_LABEL: &str = "ספקים לשלם";
const FALLBACK_DETAILS_CHARS: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct VendorMapping {
    #[schemars(description = "Case-insensitive substrings searched for in the details text")]
    pub keywords: Vec<String>,
    pub vendor_key: i64,
    pub vendor_name: String,
}

impl VendorMapping {
    fn new(keywords: &[&str], vendor_key: i64, vendor_name: &str) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            vendor_key,
            vendor_name: vendor_name.to_string(),
        }
    }

    fn matches(&self, normalized_details: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| normalized_details.contains(&keyword.to_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedVendor {
    pub vendor_key: i64,
    pub vendor_name: String,
}

pub fn is_suspense_account(counter_account_number: i64) -> bool {
    counter_account_number == SUSPENSE_ACCOUNT
}

/// Recovers the real supplier behind suspense-account postings from the
/// free-text details column. Holds no state besides its table.
#[derive(Debug, Clone)]
pub struct VendorResolver {
    suspense_account: i64,
    mappings: Vec<VendorMapping>,
}

impl Default for VendorResolver {
    fn default() -> Self {
        Self::new(SUSPENSE_ACCOUNT, default_vendor_mappings())
    }
}

impl VendorResolver {
    pub fn new(suspense_account: i64, mappings: Vec<VendorMapping>) -> Self {
        Self {
            suspense_account,
            mappings,
        }
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(config.suspense_account, config.vendor_mappings.clone())
    }

    pub fn suspense_account(&self) -> i64 {
        self.suspense_account
    }

    pub fn mappings(&self) -> &[VendorMapping] {
        &self.mappings
    }

    /// First mapping in table order with a keyword contained in `details`.
    pub fn find_vendor_from_details(&self, details: &str) -> Option<&VendorMapping> {
        let normalized = details.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        self.mappings.iter().find(|m| m.matches(&normalized))
    }

    pub fn resolve(
        &self,
        counter_account_number: i64,
        counter_account_name: &str,
        details: &str,
    ) -> ResolvedVendor {
        if counter_account_number != self.suspense_account {
            return ResolvedVendor {
                vendor_key: counter_account_number,
                vendor_name: counter_account_name.to_string(),
            };
        }

        if let Some(mapping) = self.find_vendor_from_details(details) {
            return ResolvedVendor {
                vendor_key: mapping.vendor_key,
                vendor_name: mapping.vendor_name.clone(),
            };
        }

        let short_details = truncate_with_ellipsis(details, FALLBACK_DETAILS_CHARS);
        let label = if short_details.is_empty() {
            FALLBACK_DETAILS_LABEL.to_string()
        } else {
            short_details
        };

        ResolvedVendor {
            vendor_key: self.suspense_account,
            vendor_name: format!("{} - {}", self.suspense_account, label),
        }
    }

    pub fn resolve_transaction(&self, tx: &Transaction) -> ResolvedVendor {
        self.resolve(
            tx.counter_account_number,
            &tx.counter_account_name,
            &tx.details,
        )
    }
}

/// The firm's keyword table, grouped by line of business.
pub fn default_vendor_mappings() -> Vec<VendorMapping> {
    vec![
        // Telecom and roads
        VendorMapping::new(&["בזק", "BEZEQ"], 20000, "בזק"),
        VendorMapping::new(&["פנגו", "PANGO"], 20010, "פנגו"),
        VendorMapping::new(&["כביש 6"], 20011, "כביש 6"),
        // Shipping and logistics
        VendorMapping::new(&["תפוז"], 20013, "תפוז שליחויות בע\"מ"),
        VendorMapping::new(
            &["פלאנט", "PLANET", "MODI"],
            20035,
            "פלאנט שילוח ולוגיסטיקה בע\"מ",
        ),
        // Marketing
        VendorMapping::new(&["GOOGLE", "גוגל"], 20042, "Google"),
        VendorMapping::new(&["שנטי גדרון"], 20044, "שנטי גדרון"),
        VendorMapping::new(&["ZENDESK"], 20082, "zendesk שירות לקוחות 80010"),
        VendorMapping::new(
            &["META", "FACEBK", "פייסבוק", "FACEBOOK"],
            30068,
            "META/ פייסבוק",
        ),
        VendorMapping::new(&["KLAVIYO"], 20142, "Klaviyo Inc אימייל מרק 50012"),
        // Payments and clearing
        VendorMapping::new(
            &["פייפלוס", "פאיפלוס", "פאי פלוס", "PAY PLUS"],
            20097,
            "פיי פלוס בע\"מ",
        ),
        VendorMapping::new(
            &["שופיפיי", "SHOPIFY"],
            20104,
            "Shopify International Limited",
        ),
        VendorMapping::new(
            &["ביימי", "ביי מי", "BUYME"],
            20105,
            "ביימי טכנולוגיות בע\"מ",
        ),
        // Professional services
        VendorMapping::new(&["עומר להט"], 20122, "עומר להט"),
        VendorMapping::new(&["שביט וזהו"], 20128, "שביט וזהו בע\"מ"),
        VendorMapping::new(&["רעות תקני"], 20145, "רעות תקני לי"),
        // Vehicles and leasing
        VendorMapping::new(&["ליסקאר", "LISCAR", "מנהרות", "מוקד"], 30677, "ליסקאר"),
        VendorMapping::new(&["תדלק", "סולר", "דלק"], 30697, "תדלק וסע בע\"מ"),
        // Retail chains
        VendorMapping::new(&["וויסל"], 30345, "וויסל סחר בע\"מ"),
        VendorMapping::new(&["סטודנט גרופ"], 30452, "סטודנט גרופ ס.ג בע\"מ"),
        VendorMapping::new(&["סופרפארם", "SUPERPHARM"], 30696, "סופר פארם בע\"מ"),
        // Software
        VendorMapping::new(
            &["גולדנטק", "GOODS"],
            30710,
            "גולדנטק מערכות מידע בע\"מ - goods",
        ),
        VendorMapping::new(&["ADOBE", "אדובי"], 37095, "ADOBE- ספקי אינטרנט 80038"),
        VendorMapping::new(&["FIGMA", "פיגמה"], 37140, "80021 -FIGMA"),
        // Bookkeeping and business consulting
        VendorMapping::new(&["ליתאי"], 30782, "ליתאי ניהול שירותים בע\"מ"),
        VendorMapping::new(&["להב"], 30787, "להב פיתוח מנהלים בע\"מ"),
        VendorMapping::new(&["פזמ"], 30789, "פזמ שיווק ופרסום בע\"מ"),
        VendorMapping::new(&["קרני", "אוריקס"], 30761, "קרני ראם- אוריקס פאונדס בע\"מ"),
        // Other suppliers
        VendorMapping::new(&["לובה שרגא"], 37013, "לובה שרגא בע\"מ"),
        VendorMapping::new(&["יעקבס גבינות"], 37014, "יעקבס גבינות ולחמים בע\"מ"),
        VendorMapping::new(&["יובל רשף"], 37015, "יובל רשף"),
        VendorMapping::new(&["אלי אדרי"], 37044, "אלי אדרי"),
        VendorMapping::new(
            &["פולסים"],
            37068,
            "פולסים בע\"מ -50012-הוצ' אימייל מרקטינג",
        ),
        VendorMapping::new(
            &["מיכל אוליברו", "ח.ח.ח"],
            37093,
            "ח.ח.ח טכנולוגיות בעמ (מיכל אוליברו)",
        ),
        VendorMapping::new(&["ד.מ פוסט", "דמ פוסט"], 37099, "ד.מ פוסט בע\"מ"),
        VendorMapping::new(&["מאיה מושל"], 37119, "מאיה מושל רומנו"),
        VendorMapping::new(
            &["טריגלו", "TRIGALO", "B.M.A"],
            37148,
            "טריגלו-B.M.A TRIGALO-הובלות",
        ),
        VendorMapping::new(&["לורן מיריאל", "לורן שטרן"], 37149, "לורן מיריאל שטרן"),
    ]
}
