//! Admin HTTP surface.
//!
//! # Data Flow
//! ```text
//! ring-cli / UI / cron
//!     → auth.rs (optional bearer key)
//!     → handlers.rs
//!     → ServiceController (start/stop/toggle/restart/ensure_running/snapshot)
//! ```

pub mod auth;
pub mod handlers;

use std::future::Future;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::lifecycle::ServiceController;

pub fn setup_admin_router(controller: ServiceController) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/start", post(post_start))
        .route("/admin/stop", post(post_stop))
        .route("/admin/toggle", post(post_toggle))
        .route("/admin/restart", post(post_restart))
        .route("/admin/ensure", post(post_ensure))
        .layer(middleware::from_fn_with_state(
            controller.clone(),
            admin_auth_middleware,
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .layer(TraceLayer::new_for_http())
        .with_state(controller)
}

/// Serve the admin router until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    controller: ServiceController,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let address = listener.local_addr()?;
    tracing::info!(address = %address, "Admin surface listening");
    axum::serve(listener, setup_admin_router(controller))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("Admin surface stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::MonitorConfig;
    use crate::lifecycle::ControllerParts;
    use crate::net::PollResult;
    use crate::poller::DeviceIdentity;
    use crate::testing::{FakeAudio, FakeVibrator, FakeWakeLock, ScriptedSource};

    fn controller(api_key: &str) -> ServiceController {
        let mut config = MonitorConfig::default();
        config.admin.api_key = api_key.to_string();
        ServiceController::with_parts(
            config,
            DeviceIdentity::new("dev-admin"),
            ControllerParts {
                source: Arc::new(ScriptedSource::new(PollResult::success(None, Some(200)))),
                endpoints: None,
                probe_hint: None,
                audio: Arc::new(FakeAudio::default()),
                vibrator: Arc::new(FakeVibrator::default()),
                wake_lock: Arc::new(FakeWakeLock::default()),
                watchdog: None,
            },
        )
    }

    async fn call(router: Router, method: &str, path: &str, key: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(path);
        if let Some(key) = key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let response = router.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_over_http() {
        let controller = controller("");
        let router = setup_admin_router(controller.clone());

        let (status, body) = call(router.clone(), "POST", "/admin/ensure", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "started");
        assert_eq!(body["state"], "monitoring");

        let (_, body) = call(router.clone(), "GET", "/admin/status", None).await;
        assert_eq!(body["state"], "monitoring");
        assert_eq!(body["device_id"], "dev-admin");
        assert_eq!(body["wake_sources"].as_array().map(Vec::len), Some(5));

        let (_, body) = call(router.clone(), "POST", "/admin/stop", None).await;
        assert_eq!(body["changed"], true);
        let (_, body) = call(router, "POST", "/admin/stop", None).await;
        assert_eq!(body["changed"], false);
        assert_eq!(body["state"], "idle");
    }

    #[tokio::test]
    async fn test_bearer_key_required_when_configured() {
        let router = setup_admin_router(controller("s3cret"));

        let (status, _) = call(router.clone(), "GET", "/admin/status", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(router.clone(), "GET", "/admin/status", Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = call(router, "GET", "/admin/status", Some("s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "idle");
    }
}
