use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::ToSocketAddrs;

use crate::diagnose;
use crate::sender::Published;

mod models;

pub use models::DiagnoseReport;

#[derive(Debug, Clone)]
pub struct AppState {
    published: Published,
    diagnoses: Arc<diagnose::Registry>,
}

impl AppState {
    pub fn new(published: Published, diagnoses: Arc<diagnose::Registry>) -> Self {
        Self {
            published,
            diagnoses,
        }
    }
}

async fn latest_metrics(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.published.latest())).into_response()
}

async fn run_diagnoses(State(state): State<AppState>) -> Response {
    let report = DiagnoseReport::from(state.diagnoses.run_all().await);
    let status = if report.healthy {
        StatusCode::OK
    } else {
        log::warn!("Diagnosis failed: {:?}", report.diagnoses);
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new(state: AppState) -> Self {
        let router = axum::Router::new()
            .route("/metrics", get(latest_metrics))
            .route("/diagnose", get(run_diagnoses))
            .with_state(state);
        Self { router }
    }

    pub async fn listen(self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::debug!("API listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router.into_make_service()).await
    }
}
