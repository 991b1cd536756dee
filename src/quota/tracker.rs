use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::identity::IdentityKey;
use super::limits::{Ceiling, LimitTable};

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Counted against today's budget; `remaining` is `None` when unlimited.
    Allowed { remaining: Option<u64> },
    /// Budget exhausted; nothing was counted.
    Denied { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { reason } => Some(reason),
        }
    }
}

/// Per-identity counters for the current quota day.
#[derive(Debug, Clone)]
struct UsageRecord {
    last_reset: Option<NaiveDate>,
    /// Indexed like `LimitTable::categories`.
    counts: Vec<u64>,
}

impl UsageRecord {
    fn new(categories: usize) -> Self {
        Self {
            last_reset: None,
            counts: vec![0; categories],
        }
    }

    fn is_current(&self, today: NaiveDate) -> bool {
        self.last_reset == Some(today)
    }

    /// Zero every counter if the record was last reset on an earlier day.
    /// A record already reset for a later day is left alone.
    fn reset_if_stale(&mut self, today: NaiveDate) {
        if self.last_reset.is_some_and(|last| last >= today) {
            return;
        }
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.last_reset = Some(today);
    }
}

/// Read-only view of one category in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryUsage {
    pub category: String,
    pub used: u64,
}

/// Usage of one identity as of today, without touching the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub day: NaiveDate,
    pub categories: Vec<CategoryUsage>,
}

impl UsageSnapshot {
    pub fn used(&self, category: &str) -> Option<u64> {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.used)
    }
}

/// Daily per-identity, per-category admission gate.
///
/// One mutex guards the whole ledger. Reset, check and increment for an
/// identity happen under a single acquisition, so concurrent callers can never
/// push a counter past its ceiling.
pub struct QuotaTracker {
    limits: LimitTable,
    clock: Arc<dyn Clock>,
    ledger: Mutex<HashMap<IdentityKey, UsageRecord>>,
}

impl QuotaTracker {
    pub fn new(limits: LimitTable) -> Self {
        Self::with_clock(limits, Arc::new(SystemClock::utc()))
    }

    pub fn with_clock(limits: LimitTable, clock: Arc<dyn Clock>) -> Self {
        Self {
            limits,
            clock,
            ledger: Mutex::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> &LimitTable {
        &self.limits
    }

    /// Current quota day according to the tracker's clock
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Decide whether `identity` may perform one more `category` operation
    /// today under `plan`, counting it if so.
    ///
    /// Absent or unknown plans are evaluated as the default plan.
    ///
    /// # Panics
    ///
    /// Panics if `category` is not configured in the limit table. Categories
    /// come from calling code, so an unknown one is an integration bug.
    pub fn admit(&self, identity: &IdentityKey, plan: Option<&str>, category: &str) -> Decision {
        let Some(index) = self.limits.category_index(category) else {
            panic!(
                "admit called with unknown quota category {category:?} (configured: {:?})",
                self.limits.categories()
            );
        };
        let plan = self.limits.resolve_plan(plan);
        let ceiling = self.limits.ceiling(plan, index);

        // The day is read under the lock so resets for one identity never
        // interleave with a caller holding an older date.
        let mut ledger = self.ledger.lock();
        let today = self.clock.today();
        let record = ledger
            .entry(identity.clone())
            .or_insert_with(|| UsageRecord::new(self.limits.categories().len()));
        record.reset_if_stale(today);

        let used = record.counts[index];
        if !ceiling.permits(used) {
            drop(ledger);
            info!(
                "Quota denied: {} {} ({}/{} on {} plan)",
                identity, category, used, ceiling, plan
            );
            return Decision::Denied {
                reason: format!("daily {category} limit reached for {plan} plan"),
            };
        }

        record.counts[index] = used.saturating_add(1);
        let remaining = ceiling.remaining(record.counts[index]);
        drop(ledger);

        debug!(
            "Quota admitted: {} {} ({}/{} on {} plan)",
            identity,
            category,
            used + 1,
            ceiling,
            plan
        );
        Decision::Allowed { remaining }
    }

    /// Today's usage for `identity`. Counters from an earlier day read as
    /// zero; the stored record is left as is.
    pub fn usage(&self, identity: &IdentityKey) -> Option<UsageSnapshot> {
        let ledger = self.ledger.lock();
        let today = self.clock.today();
        let record = ledger.get(identity)?;
        let current = record.is_current(today);

        let categories = self
            .limits
            .categories()
            .iter()
            .zip(&record.counts)
            .map(|(category, &count)| CategoryUsage {
                category: category.clone(),
                used: if current { count } else { 0 },
            })
            .collect();

        Some(UsageSnapshot {
            day: today,
            categories,
        })
    }

    /// Drop records last reset more than `retention_days` days ago.
    /// Records touched today are always kept. Returns how many were removed.
    pub fn evict_stale(&self, retention_days: u64) -> usize {
        let mut ledger = self.ledger.lock();
        let cutoff = self
            .clock
            .today()
            .checked_sub_days(chrono::Days::new(retention_days))
            .unwrap_or(NaiveDate::MIN);
        let before = ledger.len();
        ledger.retain(|_, record| record.last_reset.is_some_and(|day| day >= cutoff));
        before - ledger.len()
    }

    /// Number of identities currently held in the ledger
    pub fn tracked_identities(&self) -> usize {
        self.ledger.lock().len()
    }

    /// Ceiling that applies to `plan`/`category`, `None` for unknown categories
    pub fn ceiling_for(&self, plan: Option<&str>, category: &str) -> Option<Ceiling> {
        let index = self.limits.category_index(category)?;
        Some(self.limits.ceiling(self.limits.resolve_plan(plan), index))
    }
}
