//! The cluster state server process.
//!
//! Owns the one document store and State Handle of the process and serves
//! liveness and readiness probes over HTTP.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State as Extract;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use cluster_state::{State, StateConfig};
use cluster_state_store::DocStore;
use serde::Serialize;

/// Command line arguments, each with an environment fallback.
#[derive(Debug, Clone, Parser)]
#[command(name = "cluster-stated", version, about = "Cluster state server")]
pub struct Args {
    /// Directory holding the document store.
    #[arg(long, env = "DATA_DIR", default_value = "/var/lib/cluster-state")]
    pub data_dir: PathBuf,

    /// Address to serve health probes on.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Agent configuration directory to upgrade at startup.
    #[arg(long, env = "AGENT_DIR")]
    pub agent_dir: Option<PathBuf>,

    /// Attempts at an operation that keeps losing write races.
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = StateConfig::default().max_attempts)]
    pub max_attempts: u32,

    /// Pause between those attempts, in milliseconds.
    #[arg(long, env = "RETRY_BACKOFF_MS", default_value_t = 0)]
    pub retry_backoff_ms: u64,
}

impl Args {
    /// State Handle configuration from the arguments.
    #[must_use]
    pub const fn state_config(&self) -> StateConfig {
        StateConfig {
            max_attempts: self.max_attempts,
            retry_backoff_ms: self.retry_backoff_ms,
        }
    }
}

/// Shared state of the HTTP handlers.
pub struct AppState<S: DocStore> {
    state: Arc<State<S>>,
}

impl<S: DocStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

/// Probe response body.
#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    /// `healthy`, `ready` or `unavailable`.
    pub status: &'static str,
    /// Server version.
    pub version: &'static str,
    /// Why the server is not ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness: the process is up.
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ProbeResponse {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            error: None,
        }),
    )
}

/// Readiness: the State Handle is open and the store answers.
pub async fn ready<S: DocStore + 'static>(
    Extract(app): Extract<AppState<S>>,
) -> impl IntoResponse {
    match app.state.ping() {
        Ok(()) => (
            StatusCode::OK,
            Json(ProbeResponse {
                status: "ready",
                version: env!("CARGO_PKG_VERSION"),
                error: None,
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ProbeResponse {
                    status: "unavailable",
                    version: env!("CARGO_PKG_VERSION"),
                    error: Some(err.to_string()),
                }),
            )
        }
    }
}

/// Build the router.
///
/// - `GET /health` - liveness
/// - `GET /ready` - readiness
pub fn create_router<S: DocStore + 'static>(state: Arc<State<S>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready::<S>))
        .with_state(AppState { state })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_state_store::MemoryDocStore;

    fn app(
        store: &Arc<MemoryDocStore>,
    ) -> (Arc<State<MemoryDocStore>>, AppState<MemoryDocStore>) {
        let state = Arc::new(State::with_defaults(Arc::clone(store)));
        (Arc::clone(&state), AppState { state })
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_follows_the_store() {
        let store = Arc::new(MemoryDocStore::new());
        let (_, app) = app(&store);

        let response = ready(Extract(app.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        store.fail_next(1);
        let response = ready(Extract(app)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn closed_state_is_not_ready() {
        let store = Arc::new(MemoryDocStore::new());
        let (state, app) = app(&store);
        state.close();

        let response = ready(Extract(app)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn args_defaults_and_overrides() {
        let args = Args::try_parse_from(["cluster-stated", "--max-attempts", "9"]).unwrap();
        assert_eq!(args.max_attempts, 9);
        assert_eq!(args.listen_addr, "0.0.0.0:8080");
        assert!(args.agent_dir.is_none());
        assert_eq!(args.state_config().retry_policy().max_attempts(), 9);
    }

    #[test]
    fn router_builds() {
        let store = Arc::new(MemoryDocStore::new());
        let _router = create_router(Arc::new(State::with_defaults(store)));
    }
}
