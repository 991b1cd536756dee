//! Daily per-identity quota enforcement.
//!
//! [`QuotaTracker::admit`] is the single decision point: it lazily resets an
//! identity's counters when the quota day changes, compares the category's
//! count with the plan's [`Ceiling`], and counts the operation if allowed.

pub mod clock;
pub mod identity;
pub mod limits;
pub mod tracker;

pub use clock::{Clock, SystemClock, parse_utc_offset};
pub use identity::IdentityKey;
pub use limits::{Ceiling, LimitTable, LimitsError};
pub use tracker::{Decision, QuotaTracker, UsageSnapshot};
