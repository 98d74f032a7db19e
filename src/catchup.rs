//! Catch-up reconciliation: re-query watched hashtags and repost anything
//! missed while live coverage was down.

use anyhow::Result;
use futures_util::future::join_all;
use tokio::sync::Mutex;

use crate::{platform::Platform, storage::Store};

/// Maximum posts requested per hashtag search.
const SEARCH_LIMIT: usize = 100;

/// Runs catch-up passes over the watched hashtags. Passes are serialized;
/// overlapping invocations would only re-scan the same window and waste API
/// quota, recording is idempotent either way.
pub struct Reconciler {
    platform: Platform,
    store: Store,
    gate: Mutex<()>,
}

impl Reconciler {
    pub fn new(platform: Platform, store: Store) -> Self {
        Self {
            platform,
            store,
            gate: Mutex::new(()),
        }
    }

    /// Search every watched term for posts created after `since` and repost
    /// the ones not yet recorded. The per-term searches run concurrently and
    /// a failed term never blocks the others. Returns the number of
    /// successful reposts.
    pub async fn reconcile(&self, terms: &[String], since: u64) -> u64 {
        let _pass = self.gate.lock().await;
        let mut total = 0;
        let results = join_all(terms.iter().map(|t| self.reconcile_term(t, since))).await;
        for (term, result) in terms.iter().zip(results) {
            match result {
                Ok(n) => total += n,
                Err(e) => eprintln!("catch-up search error ({term}): {e}"),
            }
        }
        total
    }

    async fn reconcile_term(&self, term: &str, since: u64) -> Result<u64> {
        let posts = self.platform.search(term, since, SEARCH_LIMIT).await?;
        let mut reposted = 0;
        for post in posts {
            // Recorded already means reposted already, by the live stream or
            // by another term's pass over an overlapping post.
            if self.store.contains(&post.id_str) {
                continue;
            }
            if let Err(e) = self.store.record(&post) {
                eprintln!("record error ({}): {e}", post.id_str);
            }
            match self.platform.repost(&post.id_str).await {
                Ok(()) => reposted += 1,
                Err(e) => eprintln!("repost error ({}): {e}", post.id_str),
            }
        }
        Ok(reposted)
    }
}
