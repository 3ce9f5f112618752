//! Admission and debounce bookkeeping for packing passes.
//!
//! A key (group + surface) is *admitted* from the moment a pass for it is
//! submitted to the gate until that pass finishes. Requests for an admitted
//! key are not queued again; they arm a single deferred pass that fires once
//! the quiet period has elapsed. Re-requesting re-arms the deadline.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use crate::presence::SurfaceId;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PassKey {
    pub group: String,
    pub surface: SurfaceId,
}

impl PassKey {
    pub fn new(group: impl Into<String>, surface: impl Into<SurfaceId>) -> Self {
        Self {
            group: group.into(),
            surface: surface.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Caller should submit the pass now.
    Admitted,
    /// A pass is already pending or running; a deferred pass was (re)armed.
    Deferred,
}

#[derive(Debug)]
pub struct LayoutScheduler {
    quiet: Duration,
    admitted: BTreeSet<PassKey>,
    deferred: BTreeMap<PassKey, Instant>,
}

impl LayoutScheduler {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            admitted: BTreeSet::new(),
            deferred: BTreeMap::new(),
        }
    }

    pub fn request(&mut self, key: &PassKey, now: Instant) -> Admission {
        if self.admitted.contains(key) {
            self.deferred.insert(key.clone(), now + self.quiet);
            return Admission::Deferred;
        }
        self.admitted.insert(key.clone());
        Admission::Admitted
    }

    pub fn finish(&mut self, key: &PassKey) {
        self.admitted.remove(key);
    }

    /// Deferred keys whose deadline has passed and which are not admitted.
    /// Returned keys are admitted on the caller's behalf.
    pub fn take_due(&mut self, now: Instant) -> Vec<PassKey> {
        let due: Vec<PassKey> = self
            .deferred
            .iter()
            .filter(|(key, deadline)| **deadline <= now && !self.admitted.contains(*key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &due {
            self.deferred.remove(key);
            self.admitted.insert(key.clone());
        }
        due
    }

    pub fn cancel(&mut self, key: &PassKey) -> bool {
        self.deferred.remove(key).is_some()
    }

    /// Drop every deferred pass matching the predicate.
    pub fn cancel_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&PassKey) -> bool,
    {
        let before = self.deferred.len();
        self.deferred.retain(|key, _| !predicate(key));
        before - self.deferred.len()
    }

    pub fn is_admitted(&self, key: &PassKey) -> bool {
        self.admitted.contains(key)
    }

    pub fn deadline(&self, key: &PassKey) -> Option<Instant> {
        self.deferred.get(key).copied()
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }
}
