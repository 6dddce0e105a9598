use crate::error::Result;
use crate::schema::{CacheKeying, CancellationSettings, ReportConfig, Transaction};
use crate::vendors::SUSPENSE_ACCOUNT;
use chrono::Datelike;
use log::{debug, warn};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// A set of transactions that nets to (almost) zero and carries at least one
/// suspense-account leg.
#[derive(Debug, Clone, Serialize)]
pub struct CancellationCluster {
    pub members: Vec<Transaction>,
    pub sum: f64,
}

impl CancellationCluster {
    pub fn group_ids(&self) -> BTreeSet<i64> {
        self.members.iter().map(|tx| tx.group_id).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub groups_total: usize,
    pub groups_scanned: usize,
    pub groups_without_suspense: usize,
    pub groups_too_large: usize,
    pub clusters_found: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheKey {
    Length(usize),
    Content(u64),
}

#[derive(Debug, Clone)]
struct CachedResult {
    key: CacheKey,
    group_ids: BTreeSet<i64>,
}

type GroupKey = (u32, Option<i64>, i64);

/// Detects and removes self-cancelling clusters of ledger lines.
///
/// The filter owns its memo of the last computed result. With
/// [`CacheKeying::Length`] two inputs of the same length share that memo
/// even if their contents differ; call [`CancellationFilter::invalidate`]
/// when the data changes, or use [`CacheKeying::Content`].
#[derive(Debug, Clone)]
pub struct CancellationFilter {
    settings: CancellationSettings,
    suspense_account: i64,
    cache: Option<CachedResult>,
    stats: FilterStats,
}

impl Default for CancellationFilter {
    fn default() -> Self {
        Self {
            settings: CancellationSettings::default(),
            suspense_account: SUSPENSE_ACCOUNT,
            cache: None,
            stats: FilterStats::default(),
        }
    }
}

impl CancellationFilter {
    pub fn new(settings: CancellationSettings, suspense_account: i64) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            suspense_account,
            cache: None,
            stats: FilterStats::default(),
        })
    }

    pub fn from_config(config: &ReportConfig) -> Result<Self> {
        Self::new(config.cancellation.clone(), config.suspense_account)
    }

    pub fn settings(&self) -> &CancellationSettings {
        &self.settings
    }

    /// Statistics of the last computation that was not served from the memo.
    pub fn stats(&self) -> FilterStats {
        self.stats
    }

    pub fn has_cached_result(&self) -> bool {
        self.cache.is_some()
    }

    pub fn invalidate(&mut self) {
        if self.cache.take().is_some() {
            debug!("Cancellation cache cleared");
        }
    }

    /// Group ids of every transaction that belongs to a cancelling cluster.
    pub fn find_cancelled_group_ids(&mut self, transactions: &[Transaction]) -> BTreeSet<i64> {
        let key = self.cache_key(transactions);

        if let Some(cached) = &self.cache {
            if cached.key == key {
                debug!(
                    "Cancellation cache hit ({} transactions, {} cancelled group ids)",
                    transactions.len(),
                    cached.group_ids.len()
                );
                return cached.group_ids.clone();
            }
        }

        let (clusters, stats) = self.detect(transactions);
        let group_ids: BTreeSet<i64> = clusters
            .iter()
            .flatten()
            .map(|&idx| transactions[idx].group_id)
            .collect();

        debug!(
            "Cancellation scan: {} groups, {} scanned, {} clusters, {} cancelled group ids",
            stats.groups_total,
            stats.groups_scanned,
            stats.clusters_found,
            group_ids.len()
        );

        self.stats = stats;
        self.cache = Some(CachedResult {
            key,
            group_ids: group_ids.clone(),
        });
        group_ids
    }

    /// The input minus every transaction whose group id was cancelled, in
    /// original order.
    pub fn filter_cancelling(&mut self, transactions: &[Transaction]) -> Vec<Transaction> {
        let cancelled = self.find_cancelled_group_ids(transactions);
        transactions
            .iter()
            .filter(|tx| !cancelled.contains(&tx.group_id))
            .cloned()
            .collect()
    }

    /// The complement of [`Self::filter_cancelling`], for audit views.
    pub fn cancelled_transactions(&mut self, transactions: &[Transaction]) -> Vec<Transaction> {
        let cancelled = self.find_cancelled_group_ids(transactions);
        transactions
            .iter()
            .filter(|tx| cancelled.contains(&tx.group_id))
            .cloned()
            .collect()
    }

    /// Recomputes the clusters themselves. Never consults or updates the memo.
    pub fn find_clusters(&self, transactions: &[Transaction]) -> Vec<CancellationCluster> {
        let (clusters, _) = self.detect(transactions);
        clusters
            .into_iter()
            .map(|indices| {
                let members: Vec<Transaction> =
                    indices.iter().map(|&i| transactions[i].clone()).collect();
                let sum = members.iter().map(|tx| tx.amount).sum();
                CancellationCluster { members, sum }
            })
            .collect()
    }

    fn cache_key(&self, transactions: &[Transaction]) -> CacheKey {
        match self.settings.cache_keying {
            CacheKeying::Length => CacheKey::Length(transactions.len()),
            CacheKeying::Content => CacheKey::Content(fingerprint(transactions)),
        }
    }

    fn is_suspense(&self, tx: &Transaction) -> bool {
        tx.counter_account_number == self.suspense_account
    }

    fn detect(&self, transactions: &[Transaction]) -> (Vec<Vec<usize>>, FilterStats) {
        let mut stats = FilterStats::default();
        let mut clusters = Vec::new();

        for (key, members) in group_transactions(transactions) {
            stats.groups_total += 1;
            if members.len() < self.settings.min_cluster_size {
                continue;
            }
            if !members.iter().any(|&i| self.is_suspense(&transactions[i])) {
                stats.groups_without_suspense += 1;
                continue;
            }
            if let Some(cap) = self.settings.max_group_size {
                if members.len() > cap {
                    let (month, sort_code, account_key) = key;
                    warn!(
                        "Skipping cancellation scan for month {} sort code {:?} account {}: \
                         {} transactions exceed the group cap of {}",
                        month,
                        sort_code,
                        account_key,
                        members.len(),
                        cap
                    );
                    stats.groups_too_large += 1;
                    continue;
                }
            }

            stats.groups_scanned += 1;
            let found = self.scan_group(transactions, &members);
            stats.clusters_found += found.len();
            clusters.extend(found);
        }

        (clusters, stats)
    }

    /// Smallest clusters first; a transaction's group id can be claimed by
    /// at most one cluster of this group.
    fn scan_group(&self, transactions: &[Transaction], members: &[usize]) -> Vec<Vec<usize>> {
        let mut claimed: HashSet<i64> = HashSet::new();
        let mut clusters = Vec::new();
        let largest = self.settings.max_cluster_size.min(members.len());

        for size in self.settings.min_cluster_size..=largest {
            let available: Vec<usize> = members
                .iter()
                .copied()
                .filter(|&i| !claimed.contains(&transactions[i].group_id))
                .collect();
            if available.len() < size {
                continue;
            }

            for picks in Combinations::new(available.len(), size) {
                let combo: Vec<usize> = picks.iter().map(|&p| available[p]).collect();

                if combo
                    .iter()
                    .any(|&i| claimed.contains(&transactions[i].group_id))
                {
                    continue;
                }
                if !combo.iter().any(|&i| self.is_suspense(&transactions[i])) {
                    continue;
                }

                let sum: f64 = combo.iter().map(|&i| transactions[i].amount).sum();
                if sum.abs() <= self.settings.tolerance {
                    for &i in &combo {
                        claimed.insert(transactions[i].group_id);
                    }
                    clusters.push(combo);
                }
            }
        }

        clusters
    }
}

/// Partitions by (calendar month, sort code, account key), keeping first-seen
/// group order and input order inside each group. The year is not part of the
/// key, matching the month buckets the aggregator folds years into.
fn group_transactions(transactions: &[Transaction]) -> Vec<(GroupKey, Vec<usize>)> {
    let mut groups: Vec<(GroupKey, Vec<usize>)> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for (i, tx) in transactions.iter().enumerate() {
        let key = (tx.date.month(), tx.sort_code, tx.account_key);
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(i);
    }

    groups
}

fn fingerprint(transactions: &[Transaction]) -> u64 {
    let mut hasher = DefaultHasher::new();
    transactions.len().hash(&mut hasher);
    for tx in transactions {
        tx.group_id.hash(&mut hasher);
        tx.sort_code.hash(&mut hasher);
        tx.account_key.hash(&mut hasher);
        tx.amount.to_bits().hash(&mut hasher);
        tx.date.hash(&mut hasher);
        tx.counter_account_number.hash(&mut hasher);
    }
    hasher.finish()
}

/// k-of-n index combinations in lexicographic order.
struct Combinations {
    n: usize,
    indices: Vec<usize>,
    first: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            first: true,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let k = self.indices.len();
        if k == 0 || k > self.n {
            return None;
        }
        if self.first {
            self.first = false;
            return Some(self.indices.clone());
        }

        let mut i = k;
        while i > 0 {
            i -= 1;
            if self.indices[i] < self.n - k + i {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                return Some(self.indices.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(group_id: i64, amount: f64, counter: i64, day: u32, month: u32) -> Transaction {
        Transaction {
            group_id,
            sort_code: Some(800),
            sort_code_name: "עלות המכר".to_string(),
            account_key: 60010,
            account_name: "קניות".to_string(),
            amount,
            date: NaiveDate::from_ymd_opt(2024, month, day).unwrap(),
            counter_account_number: counter,
            counter_account_name: String::new(),
            details: String::new(),
        }
    }

    #[test]
    fn test_combinations_order() {
        let combos: Vec<Vec<usize>> = Combinations::new(4, 2).collect();
        assert_eq!(
            combos,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert_eq!(Combinations::new(5, 5).count(), 1);
        assert_eq!(Combinations::new(2, 3).count(), 0);
        assert_eq!(Combinations::new(6, 3).count(), 20);
    }

    #[test]
    fn test_pair_with_suspense_leg_cancels() {
        let txs = vec![
            tx(1, 1200.0, SUSPENSE_ACCOUNT, 3, 5),
            tx(2, -1200.0, 20035, 20, 5),
            tx(3, -310.0, 20035, 21, 5),
        ];
        let mut filter = CancellationFilter::default();
        let kept = filter.filter_cancelling(&txs);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].group_id, 3);
        assert_eq!(filter.stats().clusters_found, 1);
    }

    #[test]
    fn test_months_are_grouped_separately() {
        let txs = vec![
            tx(1, 500.0, SUSPENSE_ACCOUNT, 28, 4),
            tx(2, -500.0, 20035, 2, 5),
        ];
        let mut filter = CancellationFilter::default();
        assert!(filter.find_cancelled_group_ids(&txs).is_empty());
    }

    #[test]
    fn test_same_month_of_different_years_share_a_group() {
        let mut earlier = tx(1, 500.0, SUSPENSE_ACCOUNT, 10, 3);
        earlier.date = NaiveDate::from_ymd_opt(2023, 3, 10).unwrap();
        let txs = vec![earlier, tx(2, -500.0, 20035, 10, 3)];

        let mut filter = CancellationFilter::default();
        let ids: Vec<i64> = filter.find_cancelled_group_ids(&txs).into_iter().collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_tolerance_boundary() {
        let within = vec![
            tx(1, 100.0, SUSPENSE_ACCOUNT, 1, 1),
            tx(2, -100.5, 20000, 2, 1),
        ];
        let outside = vec![
            tx(1, 100.0, SUSPENSE_ACCOUNT, 1, 1),
            tx(2, -100.51, 20000, 2, 1),
        ];
        assert_eq!(CancellationFilter::default().find_clusters(&within).len(), 1);
        assert!(CancellationFilter::default().find_clusters(&outside).is_empty());
    }

    #[test]
    fn test_transaction_claimed_once() {
        // Both 2 and 3 would cancel against 1; only the first pair is taken.
        let txs = vec![
            tx(1, 250.0, SUSPENSE_ACCOUNT, 1, 6),
            tx(2, -250.0, 20000, 2, 6),
            tx(3, -250.0, 20000, 3, 6),
        ];
        let clusters = CancellationFilter::default().find_clusters(&txs);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].group_ids(), BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_shared_group_id_is_claimed_together() {
        let txs = vec![
            tx(7, 80.0, SUSPENSE_ACCOUNT, 1, 2),
            tx(8, -80.0, 20000, 2, 2),
            tx(7, 15.0, 20000, 3, 2),
        ];
        let mut filter = CancellationFilter::default();
        let kept = filter.filter_cancelling(&txs);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_cluster_size_cap() {
        let mut txs: Vec<Transaction> = (1..=5).map(|i| tx(i, -100.0, 20000, 1, 3)).collect();
        txs.push(tx(6, 500.0, SUSPENSE_ACCOUNT, 1, 3));

        assert!(CancellationFilter::default().find_clusters(&txs).is_empty());

        let settings = CancellationSettings {
            max_cluster_size: 6,
            ..CancellationSettings::default()
        };
        let filter = CancellationFilter::new(settings, SUSPENSE_ACCOUNT).unwrap();
        let clusters = filter.find_clusters(&txs);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 6);
    }

    #[test]
    fn test_oversized_group_is_skipped() {
        let settings = CancellationSettings {
            max_group_size: Some(3),
            ..CancellationSettings::default()
        };
        let mut filter = CancellationFilter::new(settings, SUSPENSE_ACCOUNT).unwrap();
        let txs = vec![
            tx(1, 10.0, SUSPENSE_ACCOUNT, 1, 1),
            tx(2, -10.0, 20000, 1, 1),
            tx(3, 4.0, 20000, 1, 1),
            tx(4, 9.0, 20000, 1, 1),
        ];

        assert!(filter.find_cancelled_group_ids(&txs).is_empty());
        assert_eq!(filter.stats().groups_too_large, 1);
        assert_eq!(filter.stats().groups_scanned, 0);
    }

    #[test]
    fn test_length_cache_reuses_result() {
        let cancelling = vec![
            tx(1, 40.0, SUSPENSE_ACCOUNT, 1, 1),
            tx(2, -40.0, 20000, 1, 1),
        ];
        let unrelated = vec![tx(3, 40.0, 20000, 1, 1), tx(4, 12.0, 20000, 1, 1)];

        let mut filter = CancellationFilter::default();
        assert_eq!(filter.find_cancelled_group_ids(&cancelling).len(), 2);
        // Same length, different content: the memo answers.
        assert_eq!(filter.find_cancelled_group_ids(&unrelated).len(), 2);

        filter.invalidate();
        assert!(!filter.has_cached_result());
        assert!(filter.find_cancelled_group_ids(&unrelated).is_empty());
    }

    #[test]
    fn test_content_cache_detects_changes() {
        let settings = CancellationSettings {
            cache_keying: CacheKeying::Content,
            ..CancellationSettings::default()
        };
        let mut filter = CancellationFilter::new(settings, SUSPENSE_ACCOUNT).unwrap();
        let cancelling = vec![
            tx(1, 40.0, SUSPENSE_ACCOUNT, 1, 1),
            tx(2, -40.0, 20000, 1, 1),
        ];
        let unrelated = vec![tx(3, 40.0, 20000, 1, 1), tx(4, 12.0, 20000, 1, 1)];

        assert_eq!(filter.find_cancelled_group_ids(&cancelling).len(), 2);
        assert!(filter.find_cancelled_group_ids(&unrelated).is_empty());
    }

    #[test]
    fn test_cancelled_transactions_complement() {
        let txs = vec![
            tx(1, 75.0, SUSPENSE_ACCOUNT, 1, 9),
            tx(2, -75.2, 20000, 5, 9),
            tx(3, -18.0, 20000, 6, 9),
        ];
        let mut filter = CancellationFilter::default();
        let cancelled = filter.cancelled_transactions(&txs);
        let kept = filter.filter_cancelling(&txs);
        assert_eq!(cancelled.len() + kept.len(), txs.len());
        assert_eq!(kept[0].group_id, 3);
    }
}
