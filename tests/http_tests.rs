// Integration tests for the HTTP control API

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use parley_recorder::audio::{CaptureConfig, ToneProvider};
use parley_recorder::http::{StartRecordingResponse, StopRecordingResponse};
use parley_recorder::settings::PartiesConfig;
use parley_recorder::{
    create_router, AppState, Party, PartySettings, SessionConfig, SessionController,
    SessionSnapshot, SessionState, SettingsStore,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceExt;

fn app_with(provider: ToneProvider) -> (Router, SessionController) {
    let controller = SessionController::spawn(SessionConfig::default(), Box::new(provider));
    let settings = Arc::new(SettingsStore::new(&PartiesConfig::default()));
    let router = create_router(AppState::new(controller.clone(), settings));
    (router, controller)
}

fn app() -> (Router, SessionController) {
    app_with(ToneProvider::new(CaptureConfig::default()))
}

fn json_request(method: Method, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> Result<(StatusCode, Vec<u8>)> {
    let response = router.clone().oneshot(request).await?;
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, body.to_vec()))
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let (router, _controller) = app();

    let (status, body) = send(&router, empty_request(Method::GET, "/health")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
    Ok(())
}

#[tokio::test]
async fn test_status_starts_idle() -> Result<()> {
    let (router, _controller) = app();

    let (status, body) = send(&router, empty_request(Method::GET, "/record/status")).await?;
    let snapshot: SessionSnapshot = parse(&body)?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(!snapshot.is_recording);
    assert_eq!(snapshot.countdown_remaining, 30);
    assert!(snapshot.artifact_ref.is_none());
    Ok(())
}

#[tokio::test]
async fn test_start_then_conflict_then_stop() -> Result<()> {
    let (router, controller) = app();

    let (status, body) = send(
        &router,
        json_request(Method::POST, "/record/start", r#"{"mode":"person2","countdown_secs":10}"#),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let started: StartRecordingResponse = parse(&body)?;
    assert_eq!(started.status, "recording");
    assert_eq!(started.snapshot.state, SessionState::Recording);
    assert_eq!(started.snapshot.mode, Party::Person2);
    assert_eq!(started.snapshot.countdown_duration, 10);

    let (status, _) = send(&router, json_request(Method::POST, "/record/start", "{}")).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&router, empty_request(Method::POST, "/record/stop")).await?;
    assert_eq!(status, StatusCode::OK);
    let stopped: StopRecordingResponse = parse(&body)?;
    assert!(stopped.stopped);

    // The tone source flushes and reports its stop asynchronously
    let mut snapshots = controller.subscribe();
    let artifact_ref = snapshots
        .wait_for(|s| s.artifact_ref.is_some())
        .await?
        .artifact_ref
        .clone();
    assert!(artifact_ref.is_some());

    let (_, body) = send(&router, empty_request(Method::GET, "/record/status")).await?;
    let snapshot: SessionSnapshot = parse(&body)?;
    assert_eq!(snapshot.artifact_ref, artifact_ref);
    assert!(!snapshot.is_recording);

    controller.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_start_without_body_uses_current_mode() -> Result<()> {
    let (router, controller) = app();
    controller.set_mode(Party::Person2).await?;

    let (status, body) = send(&router, empty_request(Method::POST, "/record/start")).await?;
    assert_eq!(status, StatusCode::OK);
    let started: StartRecordingResponse = parse(&body)?;
    assert!(started.snapshot.is_recording);
    assert_eq!(started.snapshot.mode, Party::Person2);
    assert_eq!(started.snapshot.countdown_duration, 30);

    let (status, _) = send(&router, empty_request(Method::POST, "/record/stop")).await?;
    assert_eq!(status, StatusCode::OK);

    controller.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_start_with_malformed_body_is_rejected() -> Result<()> {
    let (router, controller) = app();

    let (status, body) = send(
        &router,
        json_request(Method::POST, "/record/start", r#"{"mode":"#),
    )
    .await?;
    let error: serde_json::Value = parse(&body)?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].is_string());
    assert!(!controller.snapshot().is_recording);
    assert!(!controller.snapshot().has_started_recording);
    Ok(())
}

#[tokio::test]
async fn test_stop_when_idle_is_noop() -> Result<()> {
    let (router, _controller) = app();

    let (status, body) = send(&router, empty_request(Method::POST, "/record/stop")).await?;
    let stopped: StopRecordingResponse = parse(&body)?;

    assert_eq!(status, StatusCode::OK);
    assert!(!stopped.stopped);
    assert_eq!(stopped.snapshot.state, SessionState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_start_with_unavailable_capture() -> Result<()> {
    let (router, _controller) = app_with(ToneProvider::unavailable(CaptureConfig::default()));

    let (status, body) = send(&router, json_request(Method::POST, "/record/start", "{}")).await?;
    let error: serde_json::Value = parse(&body)?;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(error["error"].as_str().is_some_and(|e| !e.is_empty()));

    let (_, body) = send(&router, empty_request(Method::GET, "/record/status")).await?;
    let snapshot: SessionSnapshot = parse(&body)?;
    assert_eq!(snapshot.state, SessionState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_settings_get_and_update() -> Result<()> {
    let (router, _controller) = app();

    let (status, body) = send(&router, empty_request(Method::GET, "/settings/person1")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse::<PartySettings>(&body)?, PartySettings::default());

    let (status, body) = send(
        &router,
        json_request(Method::PUT, "/settings/person2", r#"{"output_language":"fr"}"#),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let updated: PartySettings = parse(&body)?;
    assert_eq!(updated.output_language, "fr");
    assert_eq!(updated.input_language, PartySettings::default().input_language);

    // The other party is untouched
    let (_, body) = send(&router, empty_request(Method::GET, "/settings/person1")).await?;
    assert_eq!(parse::<PartySettings>(&body)?.output_language, "es");
    Ok(())
}

#[tokio::test]
async fn test_settings_unknown_party() -> Result<()> {
    let (router, _controller) = app();

    let (status, _) = send(&router, empty_request(Method::GET, "/settings/person3")).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
