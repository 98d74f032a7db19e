//! Ephemeral live counters pushed to connected viewers.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

/// Named events published on the push channel. Delivery is best-effort; a
/// viewer that lags simply misses intermediate values.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Number of currently connected viewers.
    OnlineUsers(u64),
    /// Number of reposts since the last explicit batch fetch.
    NewTweets(u64),
}

impl PushEvent {
    /// Wire representation sent to viewers as a text frame.
    pub fn to_json(&self) -> String {
        match self {
            PushEvent::OnlineUsers(n) => {
                serde_json::json!({ "event": "onlineUsers", "onlineUsers": n }).to_string()
            }
            PushEvent::NewTweets(n) => {
                serde_json::json!({ "event": "newTweet", "newTweets": n }).to_string()
            }
        }
    }
}

/// Process-wide live counters. Created at startup, never persisted; both
/// counters restart at zero with the process.
pub struct Counters {
    online: AtomicU64,
    new_reposts: AtomicU64,
    tx: broadcast::Sender<PushEvent>,
}

impl Counters {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            online: AtomicU64::new(0),
            new_reposts: AtomicU64::new(0),
            tx,
        }
    }

    /// Subscribe to counter updates. Subscribe before announcing a connect so
    /// the new viewer sees its own count.
    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.tx.subscribe()
    }

    /// A viewer connected. Returns the published count.
    pub fn viewer_connected(&self) -> u64 {
        let now = self.online.fetch_add(1, Ordering::AcqRel) + 1;
        self.publish(PushEvent::OnlineUsers(now));
        now
    }

    /// A viewer disconnected. Floored at zero so a stray disconnect can never
    /// drive the count negative.
    pub fn viewer_disconnected(&self) -> u64 {
        let now = self
            .online
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(1))
            })
            .map(|prev| prev.saturating_sub(1))
            .unwrap_or(0);
        self.publish(PushEvent::OnlineUsers(now));
        now
    }

    /// A repost succeeded on the live stream. Returns the published count.
    pub fn repost_published(&self) -> u64 {
        let now = self.new_reposts.fetch_add(1, Ordering::AcqRel) + 1;
        self.publish(PushEvent::NewTweets(now));
        now
    }

    /// Reset the new-repost counter after a viewer fetched the latest batch.
    pub fn reset_new_reposts(&self) {
        self.new_reposts.store(0, Ordering::Release);
    }

    pub fn online(&self) -> u64 {
        self.online.load(Ordering::Acquire)
    }

    pub fn new_reposts(&self) -> u64 {
        self.new_reposts.load(Ordering::Acquire)
    }

    fn publish(&self, ev: PushEvent) {
        // No subscribers is fine; events are ephemeral.
        let _ = self.tx.send(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_disconnect_balances() {
        let counters = Counters::new();
        assert_eq!(counters.viewer_connected(), 1);
        assert_eq!(counters.viewer_connected(), 2);
        assert_eq!(counters.viewer_disconnected(), 1);
        assert_eq!(counters.viewer_connected(), 2);
        assert_eq!(counters.viewer_disconnected(), 1);
        assert_eq!(counters.viewer_disconnected(), 0);
        assert_eq!(counters.online(), 0);
    }

    #[test]
    fn disconnect_floors_at_zero() {
        let counters = Counters::new();
        assert_eq!(counters.viewer_disconnected(), 0);
        assert_eq!(counters.viewer_disconnected(), 0);
        assert_eq!(counters.online(), 0);
        // A later connect still counts from zero.
        assert_eq!(counters.viewer_connected(), 1);
    }

    #[test]
    fn reposts_count_until_reset() {
        let counters = Counters::new();
        assert_eq!(counters.repost_published(), 1);
        assert_eq!(counters.repost_published(), 2);
        counters.reset_new_reposts();
        assert_eq!(counters.new_reposts(), 0);
        assert_eq!(counters.repost_published(), 1);
    }

    #[test]
    fn events_reach_subscribers() {
        let counters = Counters::new();
        let mut rx = counters.subscribe();
        counters.viewer_connected();
        counters.repost_published();
        counters.viewer_disconnected();
        assert_eq!(rx.try_recv().unwrap(), PushEvent::OnlineUsers(1));
        assert_eq!(rx.try_recv().unwrap(), PushEvent::NewTweets(1));
        assert_eq!(rx.try_recv().unwrap(), PushEvent::OnlineUsers(0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn reset_publishes_nothing() {
        let counters = Counters::new();
        let mut rx = counters.subscribe();
        counters.reset_new_reposts();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn event_wire_shapes() {
        let ev = PushEvent::OnlineUsers(3).to_json();
        let val: serde_json::Value = serde_json::from_str(&ev).unwrap();
        assert_eq!(val["event"], "onlineUsers");
        assert_eq!(val["onlineUsers"], 3);
        let ev = PushEvent::NewTweets(7).to_json();
        let val: serde_json::Value = serde_json::from_str(&ev).unwrap();
        assert_eq!(val["event"], "newTweet");
        assert_eq!(val["newTweets"], 7);
    }

    #[test]
    fn concurrent_connects_are_not_lost() {
        use std::sync::Arc;
        let counters = Arc::new(Counters::new());
        let mut handles = vec![];
        for _ in 0..8 {
            let c = counters.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    c.viewer_connected();
                    c.viewer_disconnected();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counters.online(), 0);
    }
}
