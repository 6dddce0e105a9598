use crate::chart_of_accounts::{CategoryDefinition, CategoryKind};
use crate::schema::Transaction;
use crate::utils::quarter_of_month;
use crate::vendors::{ResolvedVendor, VendorResolver};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;

/// Per-month signed amounts plus their total. Months are calendar months 1..=12.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyData {
    pub months: BTreeMap<u32, f64>,
    pub total: f64,
}

impl MonthlyData {
    /// Zero entries for every report month, so sparse nodes still line up.
    pub fn seeded(months: &[u32]) -> Self {
        Self {
            months: months.iter().map(|&m| (m, 0.0)).collect(),
            total: 0.0,
        }
    }

    pub fn add(&mut self, month: u32, amount: f64) {
        *self.months.entry(month).or_insert(0.0) += amount;
        self.total += amount;
    }

    pub fn absorb(&mut self, other: &MonthlyData) {
        for (&month, &amount) in &other.months {
            *self.months.entry(month).or_insert(0.0) += amount;
        }
        self.total += other.total;
    }

    pub fn get(&self, month: u32) -> f64 {
        self.months.get(&month).copied().unwrap_or(0.0)
    }

    /// Quarter (1..=4) sums of the monthly values.
    pub fn quarters(&self) -> BTreeMap<u32, f64> {
        let mut quarters = BTreeMap::new();
        for (&month, &amount) in &self.months {
            *quarters.entry(quarter_of_month(month)).or_insert(0.0) += amount;
        }
        quarters
    }

    /// The presentation view: absolute values for expense kinds, signed for income.
    pub fn display(&self, kind: CategoryKind) -> MonthlyData {
        MonthlyData {
            months: self
                .months
                .iter()
                .map(|(&m, &v)| (m, kind.display_value(v)))
                .collect(),
            total: kind.display_value(self.total),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorNode {
    pub vendor_key: i64,
    pub vendor_name: String,
    pub data: MonthlyData,
    pub transactions: Vec<Transaction>,
}

impl VendorNode {
    pub fn identity(&self) -> ResolvedVendor {
        ResolvedVendor {
            vendor_key: self.vendor_key,
            vendor_name: self.vendor_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountNode {
    pub account_key: i64,
    pub account_name: String,
    pub data: MonthlyData,
    pub vendors: Vec<VendorNode>,
}

impl AccountNode {
    /// Vendors whose total is not exactly zero.
    pub fn visible_vendors(&self) -> impl Iterator<Item = &VendorNode> {
        self.vendors.iter().filter(|v| v.data.total != 0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryNode {
    pub code: String,
    pub name: String,
    pub kind: CategoryKind,
    /// Signed amounts. Use [`CategoryNode::display_data`] for presentation.
    pub data: MonthlyData,
    pub accounts: Vec<AccountNode>,
}

impl CategoryNode {
    pub fn visible_accounts(&self) -> impl Iterator<Item = &AccountNode> {
        self.accounts.iter().filter(|a| a.data.total != 0.0)
    }

    pub fn display_data(&self) -> MonthlyData {
        self.data.display(self.kind)
    }

    pub fn transaction_count(&self) -> usize {
        self.accounts
            .iter()
            .flat_map(|a| &a.vendors)
            .map(|v| v.transactions.len())
            .sum()
    }
}

/// The category → account → vendor → transaction tree of one aggregation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchicalReport {
    /// Distinct months present in the input, ascending.
    pub months: Vec<u32>,
    pub categories: Vec<CategoryNode>,
}

impl HierarchicalReport {
    pub fn category(&self, code: &str) -> Option<&CategoryNode> {
        self.categories.iter().find(|c| c.code == code)
    }

    /// Signed sum over every category of `kind`.
    pub fn kind_totals(&self, kind: CategoryKind) -> MonthlyData {
        let mut totals = MonthlyData::seeded(&self.months);
        for category in self.categories.iter().filter(|c| c.kind == kind) {
            totals.absorb(&category.data);
        }
        totals
    }

    /// Drill-down list behind one report cell. `month` and `vendor` narrow the
    /// selection when given; an unknown category code yields nothing.
    pub fn transactions_for(
        &self,
        code: &str,
        month: Option<u32>,
        vendor: Option<&ResolvedVendor>,
    ) -> Vec<&Transaction> {
        let Some(category) = self.category(code) else {
            return Vec::new();
        };

        category
            .accounts
            .iter()
            .flat_map(|a| &a.vendors)
            .filter(|v| {
                vendor.map_or(true, |wanted| {
                    v.vendor_key == wanted.vendor_key && v.vendor_name == wanted.vendor_name
                })
            })
            .flat_map(|v| &v.transactions)
            .filter(|tx| month.map_or(true, |m| tx.month() == m))
            .collect()
    }
}

/// Vec of buckets in first-seen order plus an index for lookups.
struct OrderedGroups<K, V> {
    index: HashMap<K, usize>,
    items: Vec<V>,
}

impl<K: Eq + Hash, V> OrderedGroups<K, V> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            items: Vec::new(),
        }
    }

    fn entry_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        let slot = match self.index.get(&key).copied() {
            Some(slot) => slot,
            None => {
                self.items.push(make());
                self.index.insert(key, self.items.len() - 1);
                self.items.len() - 1
            }
        };
        &mut self.items[slot]
    }

    fn into_items(self) -> Vec<V> {
        self.items
    }
}

/// Largest absolute total first. The sort is stable so ties keep encounter order.
fn sort_by_abs_total<T>(nodes: &mut [T], total: impl Fn(&T) -> f64) {
    nodes.sort_by(|a, b| total(b).abs().total_cmp(&total(a).abs()));
}

/// Distinct calendar months of the input, ascending.
pub fn report_months(transactions: &[Transaction]) -> Vec<u32> {
    transactions
        .iter()
        .map(|tx| tx.month())
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect()
}

/// Builds the drill-down tree. Categories keep definition order; accounts and
/// vendors are ordered by descending absolute total. Parent totals are summed
/// from their children after sorting.
pub fn aggregate(
    transactions: &[Transaction],
    categories: &[CategoryDefinition],
    resolver: &VendorResolver,
) -> HierarchicalReport {
    let months = report_months(transactions);

    let nodes: Vec<CategoryNode> = categories
        .iter()
        .map(|definition| build_category(definition, transactions, resolver, &months))
        .collect();

    debug!(
        "Aggregated {} transactions into {} categories over {} months",
        transactions.len(),
        nodes.len(),
        months.len()
    );

    HierarchicalReport {
        months,
        categories: nodes,
    }
}

fn build_category(
    definition: &CategoryDefinition,
    transactions: &[Transaction],
    resolver: &VendorResolver,
    months: &[u32],
) -> CategoryNode {
    let matching: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| definition.matches(tx))
        .collect();

    let name = matching
        .first()
        .map(|tx| tx.sort_code_name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| definition.fallback_name.clone());

    let mut accounts: OrderedGroups<i64, (AccountNode, OrderedGroups<ResolvedVendor, VendorNode>)> =
        OrderedGroups::new();

    for tx in matching {
        let (_, vendors) = accounts.entry_or_insert_with(tx.account_key, || {
            (
                AccountNode {
                    account_key: tx.account_key,
                    account_name: tx.account_name.clone(),
                    data: MonthlyData::seeded(months),
                    vendors: Vec::new(),
                },
                OrderedGroups::new(),
            )
        });

        let resolved = resolver.resolve_transaction(tx);
        let vendor = vendors.entry_or_insert_with(resolved.clone(), || VendorNode {
            vendor_key: resolved.vendor_key,
            vendor_name: resolved.vendor_name.clone(),
            data: MonthlyData::seeded(months),
            transactions: Vec::new(),
        });
        vendor.data.add(tx.month(), tx.amount);
        vendor.transactions.push(tx.clone());
    }

    let mut account_nodes: Vec<AccountNode> = accounts
        .into_items()
        .into_iter()
        .map(|(mut account, vendors)| {
            let mut vendor_nodes = vendors.into_items();
            sort_by_abs_total(&mut vendor_nodes, |v| v.data.total);
            for vendor in &vendor_nodes {
                account.data.absorb(&vendor.data);
            }
            account.vendors = vendor_nodes;
            account
        })
        .collect();
    sort_by_abs_total(&mut account_nodes, |a| a.data.total);

    let mut data = MonthlyData::seeded(months);
    for account in &account_nodes {
        data.absorb(&account.data);
    }

    CategoryNode {
        code: definition.code.clone(),
        name,
        kind: definition.kind,
        data,
        accounts: account_nodes,
    }
}
