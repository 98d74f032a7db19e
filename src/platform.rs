//! Client for the platform's live stream, search, repost, and timeline APIs.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::StreamExt;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, http::HeaderValue, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::post::Post;

/// Per-call timeout for search, repost, and timeline requests.
const CALL_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a stream connection attempt may take before it counts as failed.
const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Opaque tokens issued by the platform for this application and account.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl Credentials {
    /// Compose the authorization header sent on every platform call.
    fn auth_header(&self) -> String {
        format!(
            "OAuth oauth_consumer_key=\"{}\", oauth_consumer_secret=\"{}\", oauth_token=\"{}\", oauth_token_secret=\"{}\"",
            self.consumer_key, self.consumer_secret, self.access_token, self.access_token_secret
        )
    }
}

/// Response envelope returned by the search endpoint.
#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    statuses: Vec<Post>,
}

/// Handle to the platform's REST and streaming APIs.
#[derive(Clone)]
pub struct Platform {
    http: reqwest::Client,
    api_base: String,
    stream_url: String,
    auth: String,
}

impl Platform {
    /// Build a client for the API rooted at `api_base` with the live stream
    /// at `stream_url`.
    pub fn new(
        api_base: impl Into<String>,
        stream_url: impl Into<String>,
        creds: &Credentials,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(CALL_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_base: api_base.into(),
            stream_url: stream_url.into(),
            auth: creds.auth_header(),
        })
    }

    /// Open the filtered live stream for the given watch terms.
    ///
    /// The subscription is not restartable; callers reconnect by calling this
    /// again. The platform may silently stop producing on transport failure.
    pub async fn open_stream(&self, terms: &[String]) -> Result<PostStream> {
        let mut url = Url::parse(&self.stream_url).context("parsing stream url")?;
        url.query_pairs_mut().append_pair("track", &terms.join(","));
        let mut req = url.as_str().into_client_request()?;
        req.headers_mut()
            .insert("authorization", HeaderValue::from_str(&self.auth)?);
        let (ws, _) = timeout(STREAM_CONNECT_TIMEOUT, connect_async(req))
            .await
            .context("stream connect timed out")??;
        Ok(PostStream { ws })
    }

    /// Search recent posts matching `term` created after `since`.
    pub async fn search(&self, term: &str, since: u64, limit: usize) -> Result<Vec<Post>> {
        let since_s = since.to_string();
        let count_s = limit.to_string();
        let url = format!("{}/search/posts", self.api_base);
        let resp = self
            .http
            .get(&url)
            .header(AUTHORIZATION, &self.auth)
            .query(&[("q", term), ("since", since_s.as_str()), ("count", count_s.as_str())])
            .send()
            .await?
            .error_for_status()?;
        let body: SearchResponse = resp.json().await?;
        Ok(body.statuses)
    }

    /// Repost the post with the given id to the bot's own feed.
    ///
    /// Fails on duplicate reposts, rate limiting, and transport errors. Never
    /// fatal to a batch; callers log and move on.
    pub async fn repost(&self, id: &str) -> Result<()> {
        let url = format!("{}/statuses/repost/{}", self.api_base, id);
        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, &self.auth)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("repost of {id} failed ({status}): {body}");
        }
        Ok(())
    }

    /// Fetch the most recent posts on `account`'s timeline in the platform's
    /// native shape, for pass-through to viewers.
    pub async fn timeline(&self, account: &str, count: usize) -> Result<Vec<serde_json::Value>> {
        let count_s = count.to_string();
        let url = format!("{}/statuses/timeline", self.api_base);
        let resp = self
            .http
            .get(&url)
            .header(AUTHORIZATION, &self.auth)
            .query(&[("screen_name", account), ("count", count_s.as_str())])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

/// A live subscription yielding posts as the platform delivers them.
pub struct PostStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PostStream {
    /// Next post from the stream. Returns `Ok(None)` when the platform closes
    /// the subscription. Frames that aren't parseable posts are skipped.
    pub async fn next_post(&mut self) -> Result<Option<Post>> {
        while let Some(msg) = self.ws.next().await {
            match msg? {
                Message::Text(txt) => {
                    if let Ok(post) = serde_json::from_str::<Post>(&txt) {
                        return Ok(Some(post));
                    }
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }
}
