//! Post records and the id-keyed set they are collected into.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One harvested post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    /// Final path segment of the post permalink.
    pub id: String,
    /// Absolute URL of the post.
    pub permalink: String,
    /// Machine-readable datetime from the post's `time` element, if any.
    pub timestamp: Option<String>,
    /// Display text of the post.
    pub text: String,
    /// Distinct content image URLs, in document order.
    pub images: Vec<String>,
}

/// Posts collected during one run, keyed by id.
///
/// A later observation of an id replaces the earlier record wholesale. The
/// order in which ids were first seen is kept so equal sort keys stay in feed
/// order.
#[derive(Debug, Default, Clone)]
pub struct PostSet {
    order: Vec<String>,
    posts: HashMap<String, PostRecord>,
}

impl PostSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unique ids collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PostRecord> {
        self.posts.get(id)
    }

    /// Insert or replace a record. Returns `true` if the id was new.
    pub fn upsert(&mut self, post: PostRecord) -> bool {
        if post.id.is_empty() {
            return false;
        }
        if let Some(existing) = self.posts.get_mut(&post.id) {
            *existing = post;
            false
        } else {
            self.order.push(post.id.clone());
            self.posts.insert(post.id.clone(), post);
            true
        }
    }

    /// Merge a batch of records. Returns how many ids were new.
    pub fn merge<I>(&mut self, posts: I) -> usize
    where
        I: IntoIterator<Item = PostRecord>,
    {
        let mut added = 0;
        for post in posts {
            if self.upsert(post) {
                added += 1;
            }
        }
        added
    }

    /// Consume the set, yielding records in first-seen order.
    #[must_use]
    pub fn into_posts(mut self) -> Vec<PostRecord> {
        self.order
            .iter()
            .filter_map(|id| self.posts.remove(id))
            .collect()
    }
}
