//! Thread merging
//!
//! Combines persisted history with live arrivals into one de-duplicated,
//! threaded view. The merge is a full recompute on every call; reply counts
//! are stamped fresh each time and never carried over from a previous view.
//!
//! Pinned policies:
//! - an id present in both inputs keeps the persisted copy (fields and position);
//!   within one input the first occurrence wins
//! - a reply whose parent is not in the view is shown as a root
//! - a message naming itself as parent is treated as a root

use std::collections::{HashMap, HashSet};

use crate::domain::entities::Message;

/// A root message with its direct replies
#[derive(Debug, Clone, Copy)]
pub struct Thread<'a> {
    pub root: &'a Message,
    pub replies: &'a [Message],
}

/// The merged, de-duplicated, threaded result consumed by presentation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnifiedView {
    roots: Vec<Message>,
    replies_by_parent: HashMap<String, Vec<Message>>,
    len: usize,
}

impl UnifiedView {
    /// Top-level messages (including orphan replies), in merged order
    pub fn roots(&self) -> &[Message] {
        &self.roots
    }

    /// Direct replies to a message, in merged order
    pub fn replies(&self, id: &str) -> &[Message] {
        self.replies_by_parent
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn replies_by_parent(&self) -> &HashMap<String, Vec<Message>> {
        &self.replies_by_parent
    }

    /// Number of direct replies to a message
    pub fn reply_count(&self, id: &str) -> usize {
        self.replies(id).len()
    }

    /// Look up a message anywhere in the view
    pub fn find(&self, id: &str) -> Option<&Message> {
        self.iter().find(|m| m.id == id)
    }

    /// Every root with its direct replies
    pub fn threads(&self) -> impl Iterator<Item = Thread<'_>> + '_ {
        self.roots.iter().map(move |root| Thread {
            root,
            replies: self.replies(&root.id),
        })
    }

    /// Every message in the view: roots first, then replies grouped by parent
    pub fn iter(&self) -> impl Iterator<Item = &Message> + '_ {
        self.roots
            .iter()
            .chain(self.replies_by_parent.values().flatten())
    }

    /// Total number of messages in the view
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Builds [`UnifiedView`]s from persisted and live message sets
pub struct ThreadMerger;

impl ThreadMerger {
    /// Merge persisted history (base ordering) with live arrivals (arrival order).
    ///
    /// Runs in O(n) and never fails.
    pub fn merge(persisted: &[Message], live: &[Message]) -> UnifiedView {
        // 1-2. Concatenate, keeping the first copy of each id.
        let mut seen: HashSet<&str> = HashSet::with_capacity(persisted.len() + live.len());
        let mut merged: Vec<Message> = Vec::with_capacity(persisted.len() + live.len());

        for message in persisted.iter().chain(live.iter()) {
            if seen.insert(message.id.as_str()) {
                let mut message = message.clone();
                if message.parent_id.as_deref() == Some(message.id.as_str()) {
                    message.parent_id = None;
                }
                merged.push(message);
            }
        }

        // 3. Count replies whose parent is present.
        let mut counts: HashMap<String, usize> = HashMap::new();
        for message in &merged {
            if let Some(parent) = message.parent_id.as_deref() {
                if seen.contains(parent) {
                    *counts.entry(parent.to_string()).or_insert(0) += 1;
                }
            }
        }

        // 4. Stamp counts and group.
        let len = merged.len();
        let mut roots = Vec::new();
        let mut replies_by_parent: HashMap<String, Vec<Message>> = HashMap::new();

        for mut message in merged {
            message.reply_count = counts.get(&message.id).copied().unwrap_or(0);

            match message.parent_id.clone() {
                Some(parent) if seen.contains(parent.as_str()) => {
                    replies_by_parent.entry(parent).or_default().push(message);
                }
                _ => roots.push(message),
            }
        }

        UnifiedView {
            roots,
            replies_by_parent,
            len,
        }
    }
}
