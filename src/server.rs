//! HTTP endpoints for health checks, bot info, stats, and the viewer feed.

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, future::Future, net::SocketAddr, sync::Arc};

use crate::{catchup::Reconciler, counters::Counters, platform::Platform, storage::Store};

/// How many timeline posts are returned to a polling viewer.
const TIMELINE_COUNT: usize = 30;

/// Shared state handed to every HTTP handler.
pub struct HttpState {
    pub platform: Platform,
    pub store: Store,
    pub counters: Arc<Counters>,
    pub reconciler: Arc<Reconciler>,
    pub terms: Vec<String>,
    pub account: String,
    pub verbose: bool,
}

/// Response body for the `/healthz` endpoint.
#[derive(Serialize, Deserialize)]
struct Health {
    /// Always "ok" when the server is running.
    status: String,
}

/// Start the HTTP server exposing `/`, `/healthz`, `/stats`, and
/// `/api/getTweets`.
pub async fn serve_http(
    addr: SocketAddr,
    state: HttpState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = Router::new()
        .route("/", get(bot_info))
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .route("/api/getTweets", get(get_tweets))
        .with_state(Arc::new(state));
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Health check endpoint.
async fn healthz(State(state): State<Arc<HttpState>>) -> Json<Health> {
    if state.verbose {
        println!("[http] GET /healthz");
    }
    Json(Health {
        status: "ok".to_string(),
    })
}

/// Service description returned at the root.
#[derive(Serialize, Deserialize)]
struct BotInfo {
    /// Human-readable service name.
    name: String,
    /// Software identifier (here it is always "boostr").
    software: String,
    /// Semantic version string such as "0.1.0".
    version: String,
    /// Hashtags this instance watches.
    watching: Vec<String>,
}

async fn bot_info(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    if state.verbose {
        println!("[http] GET /");
    }
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(BotInfo {
            name: "boostr".into(),
            software: "boostr".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            watching: state.terms.clone(),
        }),
    )
}

/// Store totals returned by `/stats`.
#[derive(Serialize, Deserialize)]
struct Stats {
    /// Total repost records on disk.
    records: usize,
    /// Record counts per hashtag.
    hashtags: BTreeMap<String, usize>,
}

async fn stats(State(state): State<Arc<HttpState>>) -> axum::response::Response {
    if state.verbose {
        println!("[http] GET /stats");
    }
    match (state.store.count(), state.store.tag_counts()) {
        (Ok(records), Ok(hashtags)) => Json(Stats { records, hashtags }).into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Return the bot's recent timeline and kick off a catch-up pass anchored at
/// the newest recorded repost.
///
/// The new-repost counter is reset only after the response body is composed,
/// so reposts found by the catch-up itself count toward the next poll.
async fn get_tweets(State(state): State<Arc<HttpState>>) -> axum::response::Response {
    if state.verbose {
        println!("[http] GET /api/getTweets");
    }
    let timeline = match state.platform.timeline(&state.account, TIMELINE_COUNT).await {
        Ok(t) => t,
        Err(e) => {
            return (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "message": e.to_string() })),
            )
                .into_response();
        }
    };

    // Anchor at the newest recorded repost, or at the newest timeline post
    // when nothing has been recorded yet.
    let since = match state.store.latest_created_at() {
        Ok(Some(ts)) => Some(ts),
        _ => timeline
            .first()
            .and_then(|p| p.get("created_at"))
            .and_then(|v| v.as_u64()),
    };
    if let Some(since) = since {
        let reconciler = state.reconciler.clone();
        let terms = state.terms.clone();
        tokio::spawn(async move {
            let n = reconciler.reconcile(&terms, since).await;
            if n > 0 {
                eprintln!("catch-up reposted {n} missed posts");
            }
        });
    }

    let response = Json(timeline).into_response();
    state.counters.reset_new_reposts();
    response
}
