//! File-backed store of reposted-post records.

use std::{collections::BTreeMap, fs, io::Write, path::PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::to_writer;

use crate::post::Post;

/// Summary of one reposted post, persisted at `records/<post_id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepostRecord {
    /// Platform id of the reposted post. Unique across the store.
    pub post_id: String,
    /// Original author handle, when the payload carried one.
    pub author: Option<String>,
    /// Hashtags extracted from the post.
    pub hashtags: Vec<String>,
    /// Expanded URLs extracted from the post.
    pub links: Vec<String>,
    /// Handles mentioned in the post.
    pub mentions: Vec<String>,
    /// Unix timestamp of the original post's creation.
    pub created_at: u64,
}

impl RepostRecord {
    /// Flatten a raw post's entities into a record. Missing entity groups
    /// become empty lists and a missing author becomes `None`.
    pub fn from_post(post: &Post) -> Self {
        Self {
            post_id: post.id_str.clone(),
            author: post.user.as_ref().map(|u| u.screen_name.clone()),
            hashtags: post
                .entities
                .hashtags
                .iter()
                .map(|h| h.text.clone())
                .collect(),
            links: post
                .entities
                .urls
                .iter()
                .map(|u| u.expanded_url.clone())
                .collect(),
            mentions: post
                .entities
                .user_mentions
                .iter()
                .map(|m| m.screen_name.clone())
                .collect(),
            created_at: post.created_at,
        }
    }
}

/// Persistent store for repost records rooted at `root`.
#[derive(Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Create a new store rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Ensure the on-disk directory structure exists.
    pub fn init(&self) -> Result<()> {
        let dirs = ["records", "log", "index/by-tag"];
        for d in dirs {
            fs::create_dir_all(self.root.join(d))?;
        }
        Ok(())
    }

    /// Whether a record already exists for `id`. This is the dedup check
    /// consulted before a repost is attempted.
    pub fn contains(&self, id: &str) -> bool {
        self.record_path(id).exists()
    }

    /// Persist a record for `post` if one doesn't already exist.
    ///
    /// Idempotent: when the id is already recorded the existing record is
    /// read back and returned unchanged, so the same post arriving via both
    /// the live stream and a catch-up search stores exactly one record.
    pub fn record(&self, post: &Post) -> Result<RepostRecord> {
        let path = self.record_path(&post.id_str);
        if path.exists() {
            let data = fs::read_to_string(&path)?;
            return Ok(serde_json::from_str(&data)?);
        }
        let rec = RepostRecord::from_post(post);

        // Write the record JSON atomically to its canonical path.
        let parent_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent_dir)?;
        let tmp = tempfile::NamedTempFile::new_in(&parent_dir)?;
        to_writer(&tmp, &rec)?;
        tmp.persist(&path)?;

        // Append the record to a newline-delimited log for easy tailing.
        let log_path = self.root.join("log/records.ndjson");
        let mut log_file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        serde_json::to_writer(&mut log_file, &rec)?;
        log_file.write_all(b"\n")?;

        self.index_record(&rec)?;
        self.raise_latest(rec.created_at)?;
        Ok(rec)
    }

    /// The newest `created_at` ever recorded, used as the catch-up anchor.
    pub fn latest_created_at(&self) -> Result<Option<u64>> {
        let path = self.root.join("latest");
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path)?;
        Ok(data.trim().parse().ok())
    }

    /// Total number of stored records.
    pub fn count(&self) -> Result<usize> {
        let mut n = 0;
        for entry in walkdir::WalkDir::new(self.root.join("records")) {
            let entry = entry?;
            if entry.file_type().is_file() {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Record counts per hashtag, read from the tag index.
    pub fn tag_counts(&self) -> Result<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        let dir = self.root.join("index/by-tag");
        if !dir.exists() {
            return Ok(counts);
        }
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(tag) = name.strip_suffix(".txt") else {
                continue;
            };
            let data = fs::read_to_string(entry.path())?;
            counts.insert(tag.to_string(), data.lines().count());
        }
        Ok(counts)
    }

    /// Rebuild the tag index and latest pointer from the `records/` tree.
    pub fn reindex(&self) -> Result<()> {
        let index_dir = self.root.join("index");
        if index_dir.exists() {
            fs::remove_dir_all(&index_dir)?;
        }
        let latest_path = self.root.join("latest");
        if latest_path.exists() {
            fs::remove_file(&latest_path)?;
        }
        fs::create_dir_all(self.root.join("index/by-tag"))?;

        for entry in walkdir::WalkDir::new(self.root.join("records")) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let data = fs::read_to_string(entry.path())?;
                let rec: RepostRecord = serde_json::from_str(&data)?;
                self.index_record(&rec)?;
                self.raise_latest(rec.created_at)?;
            }
        }
        Ok(())
    }

    /// Append the record's id to each of its hashtag index files.
    fn index_record(&self, rec: &RepostRecord) -> Result<()> {
        for tag in &rec.hashtags {
            let path = self.root.join("index/by-tag").join(format!("{}.txt", tag));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut f = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            writeln!(f, "{}", rec.post_id)?;
        }
        Ok(())
    }

    /// Raise the latest pointer to `ts` if it is newer than the stored value.
    /// Last writer wins under concurrency; a stale anchor only makes the next
    /// catch-up re-scan posts that are already recorded.
    fn raise_latest(&self, ts: u64) -> Result<()> {
        let path = self.root.join("latest");
        let current: u64 = fs::read_to_string(&path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        if ts > current {
            fs::write(path, ts.to_string())?;
        }
        Ok(())
    }

    /// Compute the canonical path for a post id.
    fn record_path(&self, id: &str) -> PathBuf {
        self.root.join("records").join(format!("{}.json", id))
    }
}
