/// Header carrying an already-authenticated user identifier
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the caller's plan token (guest, free, premium, ...)
pub const USER_PLAN_HEADER: &str = "x-user-plan";

/// Header consulted for the client address when running behind a proxy
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Response header reporting admissions left today for the category
pub const QUOTA_REMAINING_HEADER: &str = "x-quota-remaining";

/// Most restrictive plan, used when the caller's plan is absent or unknown
pub const DEFAULT_PLAN: &str = "guest";

/// Categories of the built-in limit table
pub static DEFAULT_CATEGORIES: &[&str] = &["code", "chat", "error"];

/// Default listening port
pub const DEFAULT_PORT: u16 = 4100;
