//! Bounded memory of removed reference copies.
//!
//! Keeps the version at which a GUID was deleted or purged so a replayed or
//! reordered earlier event cannot resurrect the copy.

use std::collections::HashMap;
use std::collections::VecDeque;

use cohort_core::Guid;

pub(crate) struct Tombstones {
    versions: HashMap<Guid, u64>,
    order: VecDeque<Guid>,
    capacity: usize,
}

impl Tombstones {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            versions: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Remember that `guid` was removed at `version`. Never lowers a
    /// recorded version.
    pub(crate) fn record(&mut self, guid: &Guid, version: u64) {
        match self.versions.get_mut(guid) {
            Some(held) => *held = (*held).max(version),
            None => {
                if self.order.len() >= self.capacity {
                    if let Some(oldest) = self.order.pop_front() {
                        self.versions.remove(&oldest);
                    }
                }
                self.order.push_back(guid.clone());
                self.versions.insert(guid.clone(), version);
            }
        }
    }

    /// Whether an event at `version` predates the removal of `guid`.
    pub(crate) fn blocks(&self, guid: &Guid, version: u64) -> bool {
        self.versions.get(guid).is_some_and(|removed| version <= *removed)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }
}
