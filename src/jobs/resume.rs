//! Resume filter: drop items the cache store already holds

use std::collections::HashSet;

use crate::types::{InfoHash, WorkItem};

/// Split `items` into those still pending and a count of those already done
pub fn filter_pending(items: Vec<WorkItem>, done: &HashSet<InfoHash>) -> (Vec<WorkItem>, usize) {
    if done.is_empty() {
        return (items, 0);
    }

    let total = items.len();
    let pending: Vec<WorkItem> = items
        .into_iter()
        .filter(|item| !done.contains(&item.info_hash))
        .collect();
    let skipped = total - pending.len();
    (pending, skipped)
}
