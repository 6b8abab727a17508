//! Interview API under `/api/interview`.
//!
//! POST /api/interview/start   starts the background session (400 if one is running).
//! GET  /api/interview/status  returns the current status snapshot for polling UIs.
//! POST /api/interview/end     stops the running session; safe to repeat.
//! GET  /api/interview/history?limit=N  recent session summaries, newest first.
//! GET  /api/interview/ping    liveness.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use hiresense_core::{InterviewOrchestrator, StartOutcome, StatusSnapshot, HISTORY_LIMIT_MAX};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

const DEFAULT_HISTORY_LIMIT: i64 = 20;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: InterviewOrchestrator,
}

pub fn build_app(state: AppState) -> Router {
    let interview = Router::new()
        .route("/start", post(interview_start))
        .route("/status", get(interview_status))
        .route("/end", post(interview_end))
        .route("/history", get(interview_history))
        .route("/ping", get(ping));

    Router::new()
        .route("/", get(index))
        .nest("/api/interview", interview)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "hiresense-interview",
    }))
}

async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /api/interview/start
async fn interview_start(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.orchestrator.start() {
        StartOutcome::Started { session_id } => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "started",
                "message": "Interview started.",
                "session_id": session_id,
            })),
        ),
        StartOutcome::AlreadyRunning => {
            tracing::warn!(target: "hiresense::gateway", "start rejected: interview already running");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "status": "error",
                    "message": "Interview already running.",
                    "already_running": true,
                    "is_running": true,
                })),
            )
        }
    }
}

/// GET /api/interview/status
async fn interview_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.orchestrator.get_status())
}

/// POST /api/interview/end
async fn interview_end(State(state): State<AppState>) -> Json<serde_json::Value> {
    let was_running = state.orchestrator.end();
    let message = if was_running {
        "Interview ended."
    } else {
        "No interview was running."
    };
    Json(serde_json::json!({
        "status": "ended",
        "message": message,
    }))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

/// GET /api/interview/history
async fn interview_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, HISTORY_LIMIT_MAX as i64) as usize;
    let items = state.orchestrator.get_history(limit).await;
    Json(serde_json::json!({ "items": items }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use hiresense_core::{
        ChatScorer, Components, HrQuestionBank, LlmChain, MachineConfig, MemorySessionStore,
        StandardQuestionSource,
    };
    use hiresense_voice::{
        AudioCapture, CaptureChain, CapturedAudio, NamedProvider, NoCapture, SpeechPipeline,
        SttChain, TtsChain, VoiceResult,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Capture that takes far longer than any test, so the session stays running.
    struct StuckMic;

    impl NamedProvider for StuckMic {
        fn name(&self) -> &str {
            "stuck-mic"
        }
    }

    #[async_trait]
    impl AudioCapture for StuckMic {
        async fn record(&self, _duration: Duration) -> VoiceResult<CapturedAudio> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            CapturedAudio::from_samples(&[], 16_000)
        }
    }

    fn orchestrator(capture: CaptureChain) -> InterviewOrchestrator {
        let speech = SpeechPipeline::new(TtsChain::new("tts"), capture, SttChain::new("stt"));
        InterviewOrchestrator::new(
            Components {
                speech: Arc::new(speech),
                scorer: Arc::new(ChatScorer::new(Arc::new(LlmChain::new("scoring")))),
                questions: Arc::new(StandardQuestionSource::new(HrQuestionBank::builtin())),
                store: Arc::new(MemorySessionStore::new()),
            },
            MachineConfig::default(),
            "general computer science",
        )
    }

    fn headless() -> InterviewOrchestrator {
        orchestrator(CaptureChain::new("capture").with_provider(Arc::new(NoCapture)))
    }

    fn stuck() -> InterviewOrchestrator {
        orchestrator(
            CaptureChain::new("capture")
                .with_timeout(Duration::from_secs(7200))
                .with_provider(Arc::new(StuckMic)),
        )
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn ping_and_index() {
        let app = build_app(AppState { orchestrator: headless() });
        let (status, json) = call(app.clone(), "GET", "/api/interview/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        let (status, json) = call(app, "GET", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["service"], "hiresense-interview");
    }

    #[tokio::test]
    async fn status_before_any_session_is_idle() {
        let app = build_app(AppState { orchestrator: headless() });
        let (status, json) = call(app, "GET", "/api/interview/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["is_running"], false);
        assert_eq!(json["completed"], false);
        assert!(json["stage"].is_null());
        assert!(json["avg_score"].is_null());
    }

    #[tokio::test]
    async fn second_start_is_a_bad_request_until_ended() {
        let orchestrator = stuck();
        let app = build_app(AppState {
            orchestrator: orchestrator.clone(),
        });

        let (status, json) = call(app.clone(), "POST", "/api/interview/start").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "started");
        assert!(json["session_id"].is_string());

        let (status, json) = call(app.clone(), "POST", "/api/interview/start").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
        assert_eq!(json["already_running"], true);
        assert_eq!(json["is_running"], true);

        let (status, json) = call(app.clone(), "POST", "/api/interview/end").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ended");

        let (_, json) = call(app.clone(), "GET", "/api/interview/status").await;
        assert_eq!(json["is_running"], false);
        assert_eq!(json["completed"], true);

        let (status, json) = call(app, "POST", "/api/interview/end").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ended");

        tokio::time::timeout(Duration::from_secs(10), orchestrator.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn history_lists_finished_sessions_with_clamped_limit() {
        let orchestrator = headless();
        let app = build_app(AppState {
            orchestrator: orchestrator.clone(),
        });

        for _ in 0..2 {
            let (status, _) = call(app.clone(), "POST", "/api/interview/start").await;
            assert_eq!(status, StatusCode::OK);
            tokio::time::timeout(Duration::from_secs(10), orchestrator.wait_idle())
                .await
                .unwrap();
        }

        let (status, json) = call(app.clone(), "GET", "/api/interview/history").await;
        assert_eq!(status, StatusCode::OK);
        let items = json["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["name"], "Friend");
        assert!(items[0]["timestamp"].is_string());
        assert_eq!(items[0]["interactions_count"], 8);

        let (_, json) = call(app, "GET", "/api/interview/history?limit=0").await;
        assert_eq!(json["items"].as_array().unwrap().len(), 1);
    }
}
