// SPDX-License-Identifier: MIT

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::engine::gateway::{GatewayOutcome, ResumptionGateway};

pub async fn serve(
    port: u16,
    gateway: Arc<ResumptionGateway>,
    poll_interval: Duration,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // TraceLayer emits tracing events; give them a subscriber alongside the
    // env_logger that handles the log facade.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let poller = gateway.clone();
    tokio::spawn(async move {
        let mut ticks = IntervalStream::new(tokio::time::interval(poll_interval));
        while ticks.next().await.is_some() {
            poller.poll_tick().await;
        }
    });

    let app = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/workflows", get(list_workflows))
        .route("/api/events", post(chat_events))
        .route("/webhook", post(tracker_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(gateway);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_workflows(State(gateway): State<Arc<ResumptionGateway>>) -> Json<Value> {
    let records = gateway.router().store().all().await;
    let workflows: Vec<Value> = records
        .iter()
        .map(|r| {
            json!({
                "key": r.conversation_key,
                "requester": r.requester_id,
                "resource": r.resource_requested,
                "ticket": r.ticket_ref,
                "approval_status": r.approval_status,
                "ticket_status": r.ticket_status,
                "iterations": r.iterations,
            })
        })
        .collect();
    Json(json!(workflows))
}

/// Slack-style events endpoint. Answers URL verification and dispatches
/// app mentions; everything else is acknowledged and ignored.
async fn chat_events(
    State(gateway): State<Arc<ResumptionGateway>>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    if payload["type"] == "url_verification" {
        return Json(json!({ "challenge": payload["challenge"] }));
    }

    let event = &payload["event"];
    if payload["type"] != "event_callback" || event["type"] != "app_mention" {
        return Json(json!({ "ok": true, "outcome": "ignored" }));
    }

    let channel = event["channel"].as_str().unwrap_or_default();
    // A mention inside a thread resumes that thread's workflow.
    let thread = event["thread_ts"]
        .as_str()
        .or_else(|| event["ts"].as_str())
        .unwrap_or_default();
    let user = event["user"].as_str().unwrap_or_default();
    let text = event["text"].as_str().unwrap_or_default();

    if channel.is_empty() || thread.is_empty() || user.is_empty() {
        log::warn!("Malformed app_mention event dropped");
        return Json(json!({ "ok": true, "outcome": "ignored" }));
    }

    match gateway
        .handle_chat_mention(channel, thread, user, text)
        .await
    {
        Ok(outcome) => Json(json!({ "ok": true, "outcome": outcome_str(outcome) })),
        Err(e) => {
            log::error!("Chat event failed: {}", e);
            Json(json!({ "ok": false, "error": e.to_string() }))
        }
    }
}

/// Tracker webhook endpoint (Jira-style payloads).
async fn tracker_webhook(
    State(gateway): State<Arc<ResumptionGateway>>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    let event_name = payload["webhookEvent"].as_str().unwrap_or_default();
    let ticket_ref = payload["issue"]["key"].as_str().unwrap_or_default();
    if ticket_ref.is_empty() {
        return Json(json!({ "ok": true, "outcome": "ignored" }));
    }

    let comment = &payload["comment"];
    let author = comment["author"]["emailAddress"]
        .as_str()
        .or_else(|| comment["author"]["displayName"].as_str())
        .unwrap_or_default();
    let body = comment["body"].as_str().unwrap_or_default();

    match gateway
        .handle_ticket_event(event_name, ticket_ref, author, body)
        .await
    {
        Ok(outcome) => Json(json!({ "ok": true, "outcome": outcome_str(outcome) })),
        Err(e) => {
            log::error!("Tracker webhook failed for {}: {}", ticket_ref, e);
            Json(json!({ "ok": false, "error": e.to_string() }))
        }
    }
}

fn outcome_str(outcome: GatewayOutcome) -> &'static str {
    match outcome {
        GatewayOutcome::Started => "started",
        GatewayOutcome::Resumed => "resumed",
        GatewayOutcome::Ignored => "ignored",
    }
}
