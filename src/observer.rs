//! Registration lists for observer callbacks.
//!
//! Notification always iterates a snapshot taken under the owner's lock, so a
//! handler may subscribe or unsubscribe (itself or others) while being called.

/// Handle returned on registration; pass it back to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub struct ObserverList<H> {
    entries: Vec<(ObserverId, H)>,
    next_id: u64,
}

impl<H> Default for ObserverList<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }
}

impl<H: Clone> ObserverList<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handler: H) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, handler));
        id
    }

    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// Handlers in registration order.
    pub fn snapshot(&self) -> Vec<H> {
        self.entries.iter().map(|(_, h)| h.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_removal_is_by_id() {
        let mut list = ObserverList::new();
        let a = list.push("a");
        let b = list.push("b");
        assert_ne!(a, b);
        assert!(list.remove(a));
        assert!(!list.remove(a));
        assert_eq!(list.snapshot(), vec!["b"]);
    }
}
