//! Live stream ingest: repost and record matching posts as they arrive.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::time::sleep;

use crate::{counters::Counters, platform::Platform, post::Post, storage::Store};

const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(2);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(120);
/// Consecutive connection failures tolerated before giving up for good.
const RECONNECT_MAX_FAILURES: u32 = 8;

/// Consume the filtered live stream until the process shuts down.
///
/// Reconnects with exponential backoff when the subscription drops. A
/// connection that delivered at least one post resets the failure count;
/// once `RECONNECT_MAX_FAILURES` consecutive attempts fail this returns an
/// error so the caller can tear the process down instead of running silently
/// without live coverage.
pub async fn run(
    platform: Platform,
    store: Store,
    counters: Arc<Counters>,
    terms: Vec<String>,
) -> Result<()> {
    let mut failures: u32 = 0;
    loop {
        match ingest_stream(&platform, &store, &counters, &terms).await {
            Ok(seen) if seen > 0 => {
                failures = 0;
                eprintln!("stream ended after {seen} posts, reconnecting");
            }
            Ok(_) => failures += 1,
            Err(e) => {
                failures += 1;
                eprintln!("stream error: {e}");
            }
        }
        if failures >= RECONNECT_MAX_FAILURES {
            bail!("live stream lost: {RECONNECT_MAX_FAILURES} consecutive connection failures");
        }
        let delay = backoff_delay(failures);
        eprintln!("reconnecting to stream in {}s", delay.as_secs());
        sleep(delay).await;
    }
}

/// Open one subscription and handle posts until it ends. Returns how many
/// posts the subscription delivered.
async fn ingest_stream(
    platform: &Platform,
    store: &Store,
    counters: &Counters,
    terms: &[String],
) -> Result<u64> {
    let mut stream = platform.open_stream(terms).await?;
    let mut seen = 0;
    while let Some(post) = stream.next_post().await? {
        seen += 1;
        handle_post(platform, store, counters, &post).await;
    }
    Ok(seen)
}

/// Repost and record a single post. Per-post failures are logged and never
/// abort the stream loop.
async fn handle_post(platform: &Platform, store: &Store, counters: &Counters, post: &Post) {
    // Already recorded, via an earlier stream delivery or a catch-up pass.
    if store.contains(&post.id_str) {
        return;
    }
    // Record before reposting so the stats survive a failed repost.
    if let Err(e) = store.record(post) {
        eprintln!("record error ({}): {e}", post.id_str);
    }
    match platform.repost(&post.id_str).await {
        Ok(()) => {
            counters.repost_published();
        }
        Err(e) => eprintln!("repost error ({}): {e}", post.id_str),
    }
}

/// Delay before reconnect attempt number `failures`.
fn backoff_delay(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(6);
    let delay = RECONNECT_BASE_DELAY * 2u32.pow(exp);
    delay.min(RECONNECT_MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Credentials;
    use axum::{
        extract::{Path as AxumPath, State},
        routing::post as axum_post,
        Json, Router,
    };
    use futures_util::SinkExt;
    use std::collections::HashSet;
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio_tungstenite::{accept_async, tungstenite::Message as TMsg};

    fn creds() -> Credentials {
        Credentials {
            consumer_key: "ck".into(),
            consumer_secret: "cs".into(),
            access_token: "at".into(),
            access_token_secret: "ats".into(),
        }
    }

    fn post_json(id: &str, created: u64) -> serde_json::Value {
        serde_json::json!({
            "id_str": id,
            "text": "#himachal",
            "user": { "screen_name": "alice" },
            "created_at": created,
            "entities": { "hashtags": [{ "text": "himachal" }] }
        })
    }

    /// Platform REST stub that records repost calls and fails selected ids.
    struct RepostState {
        seen: Mutex<Vec<String>>,
        fail: HashSet<String>,
    }

    async fn spawn_rest(fail: &[&str]) -> (SocketAddr, Arc<RepostState>) {
        let state = Arc::new(RepostState {
            seen: Mutex::new(vec![]),
            fail: fail.iter().map(|s| s.to_string()).collect(),
        });
        let app = Router::new()
            .route(
                "/statuses/repost/:id",
                axum_post(
                    |AxumPath(id): AxumPath<String>, State(state): State<Arc<RepostState>>| async move {
                        state.seen.lock().unwrap().push(id.clone());
                        if state.fail.contains(&id) {
                            Err((axum::http::StatusCode::FORBIDDEN, "duplicate repost"))
                        } else {
                            Ok(Json(serde_json::json!({ "id_str": id })))
                        }
                    },
                ),
            )
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });
        (addr, state)
    }

    async fn spawn_stream(frames: Vec<String>) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            for frame in frames {
                ws.send(TMsg::Text(frame)).await.unwrap();
            }
            ws.close(None).await.ok();
        });
        addr
    }

    #[tokio::test]
    async fn duplicate_stream_post_reposted_once() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());
        store.init().unwrap();
        let counters = Arc::new(Counters::new());
        let (rest_addr, rest) = spawn_rest(&[]).await;
        let ws_addr = spawn_stream(vec![
            post_json("1", 10).to_string(),
            post_json("2", 20).to_string(),
            post_json("1", 10).to_string(),
        ])
        .await;
        let platform = Platform::new(
            format!("http://{rest_addr}"),
            format!("ws://{ws_addr}"),
            &creds(),
        )
        .unwrap();

        let seen = ingest_stream(&platform, &store, &counters, &["#himachal".into()])
            .await
            .unwrap();
        assert_eq!(seen, 3);
        // The second delivery of id 1 is dropped by the local dedup check.
        assert_eq!(rest.seen.lock().unwrap().as_slice(), ["1", "2"]);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(counters.new_reposts(), 2);
    }

    #[tokio::test]
    async fn repost_failure_keeps_record_and_batch() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());
        store.init().unwrap();
        let counters = Arc::new(Counters::new());
        let (rest_addr, rest) = spawn_rest(&["2"]).await;
        let ws_addr = spawn_stream(vec![
            post_json("1", 10).to_string(),
            post_json("2", 20).to_string(),
            post_json("3", 30).to_string(),
        ])
        .await;
        let platform = Platform::new(
            format!("http://{rest_addr}"),
            format!("ws://{ws_addr}"),
            &creds(),
        )
        .unwrap();

        ingest_stream(&platform, &store, &counters, &["#himachal".into()])
            .await
            .unwrap();
        // The failed repost of id 2 still leaves its record behind and does
        // not stop id 3 from being processed.
        assert_eq!(rest.seen.lock().unwrap().as_slice(), ["1", "2", "3"]);
        assert!(store.contains("2"));
        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(counters.new_reposts(), 2);
    }

    #[tokio::test]
    async fn garbage_frames_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());
        store.init().unwrap();
        let counters = Arc::new(Counters::new());
        let (rest_addr, _rest) = spawn_rest(&[]).await;
        let ws_addr = spawn_stream(vec![
            "not json".to_string(),
            post_json("1", 10).to_string(),
        ])
        .await;
        let platform = Platform::new(
            format!("http://{rest_addr}"),
            format!("ws://{ws_addr}"),
            &creds(),
        )
        .unwrap();
        let seen = ingest_stream(&platform, &store, &counters, &["#himachal".into()])
            .await
            .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn unreachable_stream_errors() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());
        store.init().unwrap();
        let counters = Arc::new(Counters::new());
        let platform = Platform::new("http://unused", "ws://127.0.0.1:1", &creds()).unwrap();
        assert!(
            ingest_stream(&platform, &store, &counters, &["#himachal".into()])
                .await
                .is_err()
        );
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        // Capped at the maximum delay no matter how many failures pile up.
        assert_eq!(backoff_delay(7), RECONNECT_MAX_DELAY);
        assert_eq!(backoff_delay(100), RECONNECT_MAX_DELAY);
    }
}
