//! Daily request-quota gate.
//!
//! The [`quota::QuotaTracker`] decides, per caller identity and operation
//! category, whether another billable operation fits in today's plan budget.
//! [`routes`] exposes it over HTTP for request layers that run out of process.

pub mod config;
pub mod constants;
pub mod error;
pub mod quota;
pub mod routes;

use std::sync::Arc;

use quota::QuotaTracker;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIME: &str = env!("BUILD_TIME");

pub struct AppState {
    pub tracker: Arc<QuotaTracker>,
    /// Key anonymous callers by the first x-forwarded-for hop
    pub trust_forwarded_for: bool,
}
