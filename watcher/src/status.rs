use std::sync::{Arc, RwLock};

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use motion_diff_common::frame::FrameBuffer;
use motion_diff_engine::motion_box::MotionBox;
use motion_diff_engine::sink::{CycleReport, MotionSink};
use motion_diff_engine::snapshot::{encode_png, heatmap_image};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::WatcherError;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// JSON body of `GET /status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusView {
    pub cycle: Option<u64>,
    pub score: Option<u64>,
    pub motion_box: Option<MotionBox>,
    pub captured_at_ms: Option<i64>,
    pub reports: u64,
    pub motion_reports: u64,
}

#[derive(Default)]
struct Latest {
    view: StatusView,
    heatmap: Option<FrameBuffer>,
}

/// Latest cycle results, written by [`StatusSink`] and read by the handlers.
pub struct SharedStatus {
    latest: RwLock<Latest>,
    box_color: [u8; 3],
}

impl SharedStatus {
    pub fn new(box_color: [u8; 3]) -> Self {
        Self {
            latest: RwLock::new(Latest::default()),
            box_color,
        }
    }

    pub fn view(&self) -> StatusView {
        match self.latest.read() {
            Ok(latest) => latest.view.clone(),
            Err(poisoned) => poisoned.into_inner().view.clone(),
        }
    }

    fn heatmap(&self) -> Option<(FrameBuffer, Option<MotionBox>)> {
        let latest = match self.latest.read() {
            Ok(latest) => latest,
            Err(poisoned) => poisoned.into_inner(),
        };
        latest
            .heatmap
            .clone()
            .map(|diff| (diff, latest.view.motion_box))
    }

    fn record(&self, report: &CycleReport) {
        let mut latest = match self.latest.write() {
            Ok(latest) => latest,
            Err(poisoned) => poisoned.into_inner(),
        };
        let reports = latest.view.reports + 1;
        let motion_reports = latest.view.motion_reports + u64::from(report.has_motion());
        latest.view = StatusView {
            cycle: Some(report.cycle),
            score: Some(report.score),
            motion_box: report.motion_box,
            captured_at_ms: Some(report.captured_at_ms),
            reports,
            motion_reports,
        };
        latest.heatmap = Some(report.diff.clone());
    }
}

/// Publishes every report to the status server.
pub struct StatusSink {
    shared: Arc<SharedStatus>,
}

impl StatusSink {
    pub fn new(shared: Arc<SharedStatus>) -> Self {
        Self { shared }
    }
}

impl MotionSink for StatusSink {
    fn emit(&mut self, report: &CycleReport) {
        self.shared.record(report);
    }

    fn name(&self) -> &str {
        "status"
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /status
async fn get_status(State(shared): State<Arc<SharedStatus>>) -> Json<StatusView> {
    Json(shared.view())
}

/// GET /heatmap.png: latest diff buffer, box outlined. 404 before the first
/// diffing cycle.
async fn get_heatmap(State(shared): State<Arc<SharedStatus>>) -> impl IntoResponse {
    let Some((diff, motion_box)) = shared.heatmap() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let color = shared.box_color;
    let result = tokio::task::spawn_blocking(move || {
        encode_png(&heatmap_image(&diff, motion_box.as_ref(), color))
    })
    .await;

    match result {
        Ok(Ok(png)) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "heatmap encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!(error = %e, "spawn_blocking failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn router(shared: Arc<SharedStatus>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/heatmap.png", get(get_heatmap))
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

pub async fn bind(port: u16) -> Result<tokio::net::TcpListener, WatcherError> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WatcherError::Bind(addr.clone(), e))?;
    info!(%addr, "status server listening");
    Ok(listener)
}

pub async fn serve(listener: tokio::net::TcpListener, shared: Arc<SharedStatus>) -> Result<(), WatcherError> {
    axum::serve(listener, router(shared))
        .await
        .map_err(WatcherError::Serve)
}
