//! HTTP surface of the session aggregation service.

pub mod auth;
pub mod handlers;
pub mod types;

use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use log::{info, warn};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::aggregation::SessionAggregationService;
use crate::identity::IdentityProvider;
use crate::settings::ServerSettings;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub service: SessionAggregationService,
    pub identity: Arc<dyn IdentityProvider>,
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the axum router with all API routes.
pub fn build_router(state: ApiState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route(
            "/api/sessions",
            get(handlers::list_sessions)
                .post(handlers::create_session)
                .delete(handlers::clear_sessions),
        )
        .route("/api/sessions/latest", get(handlers::latest_session))
        .route("/api/health", get(handlers::health))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

/// Serves the API until Ctrl-C.
pub async fn start_server(settings: &ServerSettings, state: ApiState) -> anyhow::Result<()> {
    let router = build_router(state, &settings.allowed_origins);

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind))?;
    info!("API server listening on http://{}", settings.bind);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down API server");
            }
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::identity::StaticTokenIdentity;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state(dir: &tempfile::TempDir) -> ApiState {
        let db = Database::new(dir.path().join("sessions.sqlite3")).unwrap();
        ApiState {
            service: SessionAggregationService::new(db),
            identity: Arc::new(StaticTokenIdentity::new([("secret", "alice")]).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_health_endpoint_needs_no_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir), &[]);
        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized_before_body_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir), &[]);
        let req = Request::builder()
            .method("POST")
            .uri("/api/sessions")
            .header("content-type", "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir), &[]);
        let req = Request::builder()
            .method("POST")
            .uri("/api/sessions")
            .header("authorization", "Bearer secret")
            .body(Body::from("not json"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_cors_tolerates_bad_origins() {
        let _ = cors_layer(&["http://localhost:3000".into(), "bad\norigin".into()]);
    }
}
