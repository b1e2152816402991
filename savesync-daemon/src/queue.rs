//! Pending-work queue: items awaiting reconciliation after a change.

use std::collections::{HashSet, VecDeque};

use savesync_core::ItemTitle;

/// Insertion-ordered set of item titles.
///
/// Owned by the reconcile loop alone; producers reach it through the notice
/// channel, never directly.
#[derive(Debug, Default)]
pub struct PendingQueue {
    order: VecDeque<ItemTitle>,
    members: HashSet<ItemTitle>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `title` unless already queued. Returns whether it was added.
    pub fn push(&mut self, title: ItemTitle) -> bool {
        if !self.members.insert(title.clone()) {
            return false;
        }
        self.order.push_back(title);
        true
    }

    pub fn remove(&mut self, title: &ItemTitle) -> bool {
        if !self.members.remove(title) {
            return false;
        }
        self.order.retain(|queued| queued != title);
        true
    }

    pub fn contains(&self, title: &ItemTitle) -> bool {
        self.members.contains(title)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemTitle> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.order.iter().map(|t| t.0.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> ItemTitle {
        ItemTitle::from(s)
    }

    #[test]
    fn duplicate_push_keeps_one_entry() {
        let mut queue = PendingQueue::new();
        assert!(queue.push(t("Touhou13")));
        assert!(!queue.push(t("Touhou13")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn order_is_first_insertion() {
        let mut queue = PendingQueue::new();
        for title in ["Touhou15", "Touhou07", "Touhou15", "Touhou10"] {
            queue.push(t(title));
        }
        assert_eq!(queue.snapshot(), vec!["Touhou15", "Touhou07", "Touhou10"]);
    }

    #[test]
    fn remove_then_push_requeues_at_back() {
        let mut queue = PendingQueue::new();
        queue.push(t("a"));
        queue.push(t("b"));
        assert!(queue.remove(&t("a")));
        assert!(!queue.remove(&t("a")));
        queue.push(t("a"));
        assert_eq!(queue.snapshot(), vec!["b", "a"]);
        assert!(queue.contains(&t("a")));
    }
}
