use axum::{
    Json,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

use crate::AppState;
use crate::constants::{
    FORWARDED_FOR_HEADER, QUOTA_REMAINING_HEADER, USER_ID_HEADER, USER_PLAN_HEADER,
};
use crate::error::GateError;
use crate::quota::{Decision, IdentityKey};

// --- Types ---

#[derive(Serialize, ToSchema)]
pub struct AdmitResponse {
    pub allowed: bool,
    pub category: String,
    /// Plan the ceiling was taken from, after fallback
    pub plan: String,
    /// Admissions left today; null when the plan is unlimited
    pub remaining: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct CategoryUsageEntry {
    pub category: String,
    pub used: u64,
    /// Daily ceiling; null when unlimited
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct UsageResponse {
    pub identity: String,
    pub plan: String,
    /// Quota day the counts belong to (YYYY-MM-DD)
    pub day: String,
    pub categories: Vec<CategoryUsageEntry>,
}

#[derive(Serialize, ToSchema)]
pub struct PlansResponse {
    pub default_plan: String,
    pub categories: Vec<String>,
    /// plan -> category -> daily ceiling (null = unlimited)
    pub plans: BTreeMap<String, BTreeMap<String, Option<u64>>>,
}

/// Body of every non-2xx response
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub code: u16,
    pub detail: String,
}

/// Caller identity and plan token as seen on the wire
struct Caller {
    identity: IdentityKey,
    plan: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Resolve the ledger key: `x-user-id` when present, otherwise the client
/// address (first `x-forwarded-for` hop when trusted, else the socket peer).
/// A user id that is not visible ASCII is rejected rather than ignored, so a
/// malformed id never lands on the shared address quota.
fn resolve_caller(
    state: &AppState,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> Result<Caller, GateError> {
    let user_id = match headers.get(USER_ID_HEADER).map(HeaderValue::to_str) {
        Some(Err(_)) => {
            debug!("Rejecting non-text {} header from {}", USER_ID_HEADER, peer);
            return Err(GateError::MissingIdentity);
        }
        Some(Ok(id)) => Some(id),
        None => None,
    };

    let forwarded = state
        .trust_forwarded_for
        .then(|| header_str(headers, FORWARDED_FOR_HEADER))
        .flatten()
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let address = forwarded
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string());

    let identity =
        IdentityKey::resolve(user_id, Some(address.as_str()))
            .ok_or(GateError::MissingIdentity)?;

    Ok(Caller {
        identity,
        plan: header_str(headers, USER_PLAN_HEADER).map(str::to_string),
    })
}

// --- Handlers ---

/// Count one operation of `category` against the caller's daily quota
#[utoipa::path(
    post,
    path = "/quota/{category}",
    tag = "quota",
    params(
        ("category" = String, Path, description = "Operation category, e.g. code, chat, error"),
        ("x-user-id" = Option<String>, Header, description = "Authenticated user id; the client address is used when absent"),
        ("x-user-plan" = Option<String>, Header, description = "Plan tier; unknown or absent means the default plan"),
    ),
    responses(
        (status = 200, body = AdmitResponse),
        (status = 404, body = ErrorBody),
        (status = 429, body = ErrorBody),
    )
)]
pub async fn admit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(category): Path<String>,
    headers: HeaderMap,
) -> Result<Response, GateError> {
    let category = category.trim().to_ascii_lowercase();
    let limits = state.tracker.limits();
    if limits.category_index(&category).is_none() {
        return Err(GateError::UnknownCategory(category));
    }

    let caller = resolve_caller(&state, &headers, peer)?;
    let plan = limits.resolve_plan(caller.plan.as_deref()).to_string();

    match state
        .tracker
        .admit(&caller.identity, caller.plan.as_deref(), &category)
    {
        Decision::Allowed { remaining } => {
            let mut response = Json(AdmitResponse {
                allowed: true,
                category,
                plan,
                remaining,
            })
            .into_response();
            if let Some(remaining) = remaining {
                response
                    .headers_mut()
                    .insert(QUOTA_REMAINING_HEADER, HeaderValue::from(remaining));
            }
            Ok(response)
        }
        Decision::Denied { reason } => Err(GateError::QuotaExceeded(reason)),
    }
}

/// Today's usage and remaining budget for the caller
#[utoipa::path(
    get,
    path = "/usage",
    tag = "quota",
    params(
        ("x-user-id" = Option<String>, Header, description = "Authenticated user id; the client address is used when absent"),
        ("x-user-plan" = Option<String>, Header, description = "Plan tier used to report ceilings"),
    ),
    responses(
        (status = 200, body = UsageResponse),
        (status = 400, body = ErrorBody),
    )
)]
pub async fn usage(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<UsageResponse>, GateError> {
    let caller = resolve_caller(&state, &headers, peer)?;
    let tracker = &state.tracker;
    let limits = tracker.limits();
    let plan = limits.resolve_plan(caller.plan.as_deref());
    let snapshot = tracker.usage(&caller.identity);

    let categories = limits
        .categories()
        .iter()
        .enumerate()
        .map(|(index, category)| {
            let used = snapshot
                .as_ref()
                .and_then(|s| s.used(category))
                .unwrap_or(0);
            let ceiling = limits.ceiling(plan, index);
            CategoryUsageEntry {
                category: category.clone(),
                used,
                limit: ceiling.as_option(),
                remaining: ceiling.remaining(used),
            }
        })
        .collect();

    let day = snapshot
        .map(|s| s.day)
        .unwrap_or_else(|| tracker.today());

    Ok(Json(UsageResponse {
        identity: caller.identity.to_string(),
        plan: plan.to_string(),
        day: day.format("%Y-%m-%d").to_string(),
        categories,
    }))
}

/// Configured plans and their daily ceilings
#[utoipa::path(
    get,
    path = "/plans",
    tag = "quota",
    responses((status = 200, body = PlansResponse))
)]
pub async fn plans(State(state): State<Arc<AppState>>) -> Json<PlansResponse> {
    let limits = state.tracker.limits();
    let plans = limits
        .rows()
        .into_iter()
        .map(|(plan, row)| {
            let row = row
                .into_iter()
                .map(|(category, ceiling)| (category.to_string(), ceiling.as_option()))
                .collect();
            (plan.to_string(), row)
        })
        .collect();

    Json(PlansResponse {
        default_plan: limits.default_plan().to_string(),
        categories: limits.categories().to_vec(),
        plans,
    })
}
