//! Platform post model.

use serde::{Deserialize, Serialize};

/// A hashtag entity attached to a post, without the `#` prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hashtag {
    /// Hashtag text, e.g. `himachal` or `हिमाचल`.
    pub text: String,
}

/// A URL entity attached to a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    /// Fully expanded target URL.
    pub expanded_url: String,
}

/// A user mention entity attached to a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mention {
    /// Handle of the mentioned account, without the `@` prefix.
    pub screen_name: String,
}

/// Structured entities the platform extracts from a post's text.
///
/// Every list defaults to empty so posts with missing entity groups still
/// deserialize.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Entities {
    #[serde(default)]
    pub hashtags: Vec<Hashtag>,
    #[serde(default)]
    pub urls: Vec<Link>,
    #[serde(default)]
    pub user_mentions: Vec<Mention>,
}

/// Author of a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Author {
    /// Account handle, without the `@` prefix.
    pub screen_name: String,
}

/// A post as delivered by the platform's stream and search APIs.
///
/// ```json
/// {
///   "id_str": "920",
///   "text": "snow in #himachal https://t.co/x",
///   "user": { "screen_name": "alice" },
///   "created_at": 1700000000,
///   "entities": {
///     "hashtags": [{ "text": "himachal" }],
///     "urls": [{ "expanded_url": "https://t.co/x" }],
///     "user_mentions": []
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    /// Platform-assigned post identifier.
    pub id_str: String,
    /// Post body.
    #[serde(default)]
    pub text: String,
    /// Original author. Absent on some stream payloads.
    #[serde(default)]
    pub user: Option<Author>,
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Extracted hashtags, links, and mentions.
    #[serde(default)]
    pub entities: Entities,
}
