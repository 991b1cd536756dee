pub mod health;
pub mod quota;

use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::AppState;
use crate::config::CorsMode;
use crate::constants::{QUOTA_REMAINING_HEADER, USER_ID_HEADER, USER_PLAN_HEADER};

/// Assemble the service routes: health, the quota API under `/v1` and its
/// OpenAPI document with Swagger UI.
pub fn build_router(state: Arc<AppState>) -> Router {
    let (api_router, openapi) = OpenApiRouter::with_openapi(Default::default())
        .routes(routes!(quota::admit))
        .routes(routes!(quota::usage))
        .routes(routes!(quota::plans))
        .split_for_parts();

    // Swagger UI + OpenAPI spec
    let swagger_routes = Router::new().merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger").url("/api-docs/openapi.json", openapi),
    );

    Router::new()
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .nest("/v1", api_router)
        .merge(swagger_routes)
        .with_state(state)
}

/// Browser access policy. Origins are matched per `mode`; the remaining-quota
/// header is exposed so pages can read it from cross-origin responses.
pub fn cors_layer(mode: &CorsMode) -> CorsLayer {
    let cors_origins = mode.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let Ok(origin_str) = origin.to_str() else {
                return false;
            };

            match &cors_origins {
                CorsMode::AllowAll => true,
                CorsMode::LocalhostOnly => {
                    let Ok(url) = url::Url::parse(origin_str) else {
                        return false;
                    };
                    matches!(
                        url.host_str(),
                        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
                    )
                }
                CorsMode::AllowList(allowed) => allowed.iter().any(|a| a == origin_str),
            }
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USER_PLAN_HEADER),
        ])
        .expose_headers([HeaderName::from_static(QUOTA_REMAINING_HEADER)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::{LimitTable, QuotaTracker};
    use axum::body::{Body, to_bytes};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            tracker: Arc::new(QuotaTracker::new(LimitTable::default())),
            trust_forwarded_for: false,
        })
    }

    #[tokio::test]
    async fn test_health() {
        let response = build_router(state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["tracked_identities"], 0);
    }

    #[tokio::test]
    async fn test_openapi_document_lists_quota_paths() {
        let response = build_router(state())
            .oneshot(
                Request::get("/api-docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(doc["paths"].get("/quota/{category}").is_some());
        assert!(doc["paths"].get("/plans").is_some());
    }

    fn cross_origin_post(origin: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/quota/code")
            .header(header::ORIGIN, origin)
            .header(USER_ID_HEADER, "u1")
            .body(Body::empty())
            .unwrap()
    }

    fn cors_app(mode: CorsMode) -> Router {
        build_router(state())
            .layer(cors_layer(&mode))
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 5000))))
    }

    #[tokio::test]
    async fn test_cors_exposes_remaining_header() {
        let response = cors_app(CorsMode::LocalhostOnly)
            .oneshot(cross_origin_post("http://localhost:3000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        let exposed = headers[header::ACCESS_CONTROL_EXPOSE_HEADERS]
            .to_str()
            .unwrap();
        assert!(exposed.contains(QUOTA_REMAINING_HEADER));
        assert!(headers.contains_key(QUOTA_REMAINING_HEADER));
    }

    #[tokio::test]
    async fn test_cors_rejects_foreign_origin() {
        let response = cors_app(CorsMode::LocalhostOnly)
            .oneshot(cross_origin_post("https://evil.example"))
            .await
            .unwrap();
        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }
}
