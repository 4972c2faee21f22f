//! HTTP API for the release gateway.
//!
//! Successful responses are `{"status": "success", ...}` with the operation's
//! fields alongside. `/status` answers with the readiness verdict itself.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use chartgate_core::{ReadinessVerdict, Release};
use chartgate_kube::{ConnectionBundle, DeployOutcome, DeployedState, ReleaseManager, ServiceEntry};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ApiError;

/// Shared application state.
pub struct AppState {
    pub manager: ReleaseManager,
}

impl AppState {
    pub fn new(manager: ReleaseManager) -> Self {
        Self { manager }
    }
}

/// Creates the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Release lifecycle
        .route("/install", post(install))
        .route("/upgrade", put(upgrade).post(upgrade))
        .route("/delete", delete(uninstall).post(uninstall))
        .route("/uninstall", delete(uninstall).post(uninstall))
        // Release inspection
        .route("/status", get(release_status))
        .route("/deployed", get(deployed))
        .route("/connectionDetails", get(connection_details))
        .route("/services", get(services))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `releaseName` from the query string
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseQuery {
    #[serde(default)]
    pub release_name: String,
}

#[derive(Debug, Serialize)]
struct Success<T> {
    status: &'static str,
    #[serde(flatten)]
    body: T,
}

fn success<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        status: "success",
        body,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Removed {
    release_name: String,
}

#[derive(Debug, Serialize)]
struct Services {
    services: Vec<ServiceEntry>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "healthy" })
}

/// Ready once the helm client has been initialized.
async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.manager.is_ready() {
        (StatusCode::OK, Json(HealthResponse { status: "ready" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "initializing" }),
        )
    }
}

async fn install(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Release>, JsonRejection>,
) -> Result<Json<Success<DeployOutcome>>, ApiError> {
    let Json(release) = body?;
    let outcome = state.manager.install(&release).await?;
    info!(release = %outcome.release_name, "release installed via API");
    Ok(success(outcome))
}

async fn upgrade(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Release>, JsonRejection>,
) -> Result<Json<Success<DeployOutcome>>, ApiError> {
    let Json(release) = body?;
    let outcome = state.manager.upgrade(&release).await?;
    info!(release = %outcome.release_name, "release upgraded via API");
    Ok(success(outcome))
}

async fn uninstall(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReleaseQuery>, QueryRejection>,
) -> Result<Json<Success<Removed>>, ApiError> {
    let Query(query) = query?;
    state.manager.uninstall(&query.release_name).await?;
    info!(release = %query.release_name, "release removed via API");
    Ok(success(Removed {
        release_name: query.release_name,
    }))
}

async fn release_status(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReleaseQuery>, QueryRejection>,
) -> Result<Json<ReadinessVerdict>, ApiError> {
    let Query(query) = query?;
    let verdict = state.manager.release_status(&query.release_name).await?;
    Ok(Json(verdict))
}

async fn deployed(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReleaseQuery>, QueryRejection>,
) -> Result<Json<Success<DeployedState>>, ApiError> {
    let Query(query) = query?;
    let deployed = state.manager.deployed(&query.release_name).await?;
    Ok(success(deployed))
}

async fn connection_details(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReleaseQuery>, QueryRejection>,
) -> Result<Json<Success<ConnectionBundle>>, ApiError> {
    let Query(query) = query?;
    let bundle = state.manager.connection_details(&query.release_name).await?;
    Ok(success(bundle))
}

async fn services(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReleaseQuery>, QueryRejection>,
) -> Result<Json<Success<Services>>, ApiError> {
    let Query(query) = query?;
    let services = state.manager.services(&query.release_name).await?;
    Ok(success(Services { services }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use chartgate_core::{ClusterConfig, Verb};
    use chartgate_kube::mock::{MockClusterApi, MockPackageManager, StaticResolver, fixtures};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct TestApp {
        state: Arc<AppState>,
        helm: MockPackageManager,
        cluster: MockClusterApi,
    }

    fn make_app() -> TestApp {
        let helm = MockPackageManager::new();
        let cluster = MockClusterApi::new();
        let resolver = StaticResolver::new(ClusterConfig::new("prod", "https://10.0.0.1:6443", "tok"));
        let manager = ReleaseManager::new(
            Arc::new(resolver),
            Arc::new(helm.clone()),
            Arc::new(cluster.clone()),
        );
        TestApp {
            state: Arc::new(AppState::new(manager)),
            helm,
            cluster,
        }
    }

    async fn send(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = router(app.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = make_app();
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn ready_endpoint_waits_for_initialization() {
        let app = make_app();
        let (status, _) = send(&app, Method::GET, "/ready", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        app.state.manager.initialize().await.unwrap();
        let (status, _) = send(&app, Method::GET, "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn install_endpoint() {
        let app = make_app();
        app.helm.respond(
            Verb::Install,
            json!({
                "info": {"status": "deployed", "description": "Install complete"},
                "resources": [{"name": "v1/Service", "resources": ["acme-app"]}]
            })
            .to_string(),
        );

        let (status, body) = send(
            &app,
            Method::POST,
            "/install",
            Some(json!({"releaseName": "tenant-42", "chartName": "acme/app", "values": {"replicas": 3}})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["releaseName"], "tenant-42");
        assert_eq!(body["serviceName"], "acme-app");
    }

    #[tokio::test]
    async fn install_without_chart_fails() {
        let app = make_app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/install",
            Some(json!({"releaseName": "tenant-42"})),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"status": "failed", "reason": "chartName is required"}));
        assert_eq!(app.helm.command_count(), 0);
    }

    #[tokio::test]
    async fn install_with_null_fields_reports_missing_name() {
        let app = make_app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/install",
            Some(json!({"releaseName": null, "chartName": "acme/app", "values": null, "flags": null})),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"status": "failed", "reason": "releaseName is required"}));
        assert_eq!(app.helm.command_count(), 0);
    }

    #[tokio::test]
    async fn install_with_malformed_body_fails() {
        let app = make_app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/install")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = router(app.state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn upgrade_endpoint_accepts_put() {
        let app = make_app();
        app.helm.respond_release(Verb::Upgrade, "deployed", "Upgrade complete");

        let (status, body) = send(
            &app,
            Method::PUT,
            "/upgrade",
            Some(json!({"releaseName": "tenant-42", "chartName": "acme/app", "reuseValue": true})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert!(app.helm.commands().last().unwrap().has_flag("reuse-values"));
    }

    #[tokio::test]
    async fn status_endpoint_returns_verdict() {
        let app = make_app();
        app.helm.respond_release(Verb::Status, "pending-install", "");

        let (status, body) = send(&app, Method::GET, "/status?releaseName=tenant-42", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "inprogress", "message": "deploy in progress"}));
    }

    #[tokio::test]
    async fn status_endpoint_reports_helm_errors() {
        let app = make_app();
        app.helm.fail(Verb::Status, "Error: release: not found");

        let (status, body) = send(&app, Method::GET, "/status?releaseName=tenant-42", None).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["reason"], "Error: release: not found");
    }

    #[tokio::test]
    async fn delete_endpoint() {
        let app = make_app();

        for (method, uri) in [(Method::DELETE, "/delete"), (Method::POST, "/uninstall")] {
            let (status, body) = send(&app, method, &format!("{uri}?releaseName=tenant-42"), None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({"status": "success", "releaseName": "tenant-42"}));
        }

        assert_eq!(app.cluster.deleted_namespaces().len(), 2);
    }

    #[tokio::test]
    async fn delete_without_release_name() {
        let app = make_app();
        let (status, body) = send(&app, Method::DELETE, "/delete", None).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "failed");
        assert_eq!(body["reason"], "releaseName is required");
    }

    #[tokio::test]
    async fn deployed_endpoint() {
        let app = make_app();
        app.helm.respond_release(Verb::Status, "superseded", "Upgraded since");

        let (status, body) = send(&app, Method::GET, "/deployed?releaseName=tenant-42", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "status": "success",
                "releaseName": "tenant-42",
                "state": "failed",
                "rawStatus": "superseded",
                "description": "Upgraded since"
            })
        );
    }

    #[tokio::test]
    async fn connection_details_endpoint() {
        let app = make_app();
        app.cluster.add_secret("tenant-42", fixtures::secret("db", "Opaque", &[("user", "admin")]));
        app.cluster.add_service("tenant-42", fixtures::service("db", "ClusterIP", None));

        let (status, body) =
            send(&app, Method::GET, "/connectionDetails?releaseName=tenant-42", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["secrets"][0]["name"], "db");
        assert_eq!(body["secrets"][0]["data"]["user"], "YWRtaW4=");
        assert_eq!(body["services"][0]["name"], "db");
    }

    #[tokio::test]
    async fn services_endpoint() {
        let app = make_app();
        app.cluster.add_service("tenant-42", fixtures::service("web", "LoadBalancer", Some("34.1.2.3")));

        let (status, body) = send(&app, Method::GET, "/services?releaseName=tenant-42", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["services"][0]["spec"]["type"], "LoadBalancer");
    }
}
