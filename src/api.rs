use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;

use crate::scheduler::{Scheduler, SchedulerStatus, TriggerKind, TriggerRejection};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/feed", get(feed))
        .route("/refresh", post(refresh))
        .route("/status", get(status))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Serves the persisted artifact as-is. Before the first save there is
/// nothing on disk; answer with an empty array rather than 404.
async fn feed(State(state): State<AppState>, req: Request) -> Response {
    let path = state.scheduler.pipeline().store().feed_path().to_path_buf();
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Json(Vec::<serde_json::Value>::new()).into_response();
    }
    match ServeFile::new(path).oneshot(req).await {
        Ok(rsp) => rsp.into_response(),
        Err(e) => match e {},
    }
}

#[derive(serde::Serialize)]
struct RefreshResp {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
}

async fn refresh(State(state): State<AppState>) -> Response {
    match state.scheduler.trigger(TriggerKind::Manual) {
        Ok(_) => (
            StatusCode::ACCEPTED,
            Json(RefreshResp {
                status: "accepted",
                retry_after_secs: None,
            }),
        )
            .into_response(),
        Err(TriggerRejection::Busy) => (
            StatusCode::CONFLICT,
            Json(RefreshResp {
                status: "busy",
                retry_after_secs: None,
            }),
        )
            .into_response(),
        Err(TriggerRejection::Throttled { retry_after_secs }) => {
            let mut rsp = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(RefreshResp {
                    status: "throttled",
                    retry_after_secs: Some(retry_after_secs),
                }),
            )
                .into_response();
            rsp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            rsp
        }
    }
}

async fn status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status())
}
