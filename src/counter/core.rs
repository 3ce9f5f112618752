use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CounterTokenError, EntityKind, Result};
use crate::logging::{LogLevel, Logger, emit, json_kv};
use crate::observer::{ObserverId, ObserverList};

const TARGET: &str = "counter_tokens::counter";

/// Post-mutation view of a counter handed to change observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub current: u64,
    pub max: Option<u64>,
}

impl Counter {
    fn admits(&self, value: i64, name: &str) -> Result<u64> {
        if value < 0 {
            return Err(CounterTokenError::OutOfRange(format!(
                "unable to set value of {name}, new value must not be below zero"
            )));
        }
        let value = value as u64;
        match self.max {
            Some(max) if value > max => Err(CounterTokenError::OutOfRange(format!(
                "unable to set value of {name}, new value must not exceed its max ({max})"
            ))),
            _ => Ok(value),
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{} / {}", self.current, max),
            None => write!(f, "{} / -", self.current),
        }
    }
}

pub type ChangeHandler = Arc<dyn Fn(&str, &Counter) + Send + Sync>;
pub type RemoveHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct StoreInner {
    counters: BTreeMap<String, Counter>,
    on_change: ObserverList<ChangeHandler>,
    on_remove: ObserverList<RemoveHandler>,
}

/// Owns every counter plus the observer registrations that watch them.
#[derive(Clone, Default)]
pub struct CounterStore {
    inner: Arc<Mutex<StoreInner>>,
    logger: Option<Logger>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>> {
        self.inner
            .lock()
            .map_err(|_| CounterTokenError::Poisoned("counter store"))
    }

    /// Insert a new counter. A `max` of zero means "no maximum".
    pub fn create(&self, name: &str, max: Option<i64>, initial: Option<i64>) -> Result<Counter> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CounterTokenError::invalid(
                "unable to create new counter, a name is required",
            ));
        }
        let max = match max {
            Some(m) if m < 0 => {
                return Err(CounterTokenError::invalid(
                    "unable to create new counter, max must be a non-negative integer",
                ));
            }
            Some(0) | None => None,
            Some(m) => Some(m as u64),
        };
        let current = match initial {
            Some(i) if i < 0 => {
                return Err(CounterTokenError::invalid(
                    "unable to create new counter, initial value must be a non-negative integer",
                ));
            }
            Some(i) if max.is_some_and(|m| i as u64 > m) => {
                return Err(CounterTokenError::invalid(
                    "unable to create new counter, initial value must not exceed max",
                ));
            }
            Some(i) => i as u64,
            None => 0,
        };

        let counter = Counter { current, max };
        {
            let mut inner = self.lock()?;
            if inner.counters.contains_key(name) {
                return Err(CounterTokenError::DuplicateName {
                    kind: EntityKind::Counter,
                    name: name.to_string(),
                });
            }
            inner.counters.insert(name.to_string(), counter);
        }
        emit(
            self.logger.as_ref(),
            LogLevel::Info,
            TARGET,
            "counter_created",
            [
                json_kv("counter", name),
                json_kv("current", counter.current),
                json_kv("max", json!(counter.max)),
            ],
        );
        Ok(counter)
    }

    pub fn get(&self, name: &str) -> Result<Counter> {
        self.lock()?
            .counters
            .get(name)
            .copied()
            .ok_or_else(|| CounterTokenError::counter_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock()
            .map(|inner| inner.counters.contains_key(name))
            .unwrap_or(false)
    }

    /// Counters sorted by name.
    pub fn list(&self) -> Result<Vec<(String, Counter)>> {
        Ok(self
            .lock()?
            .counters
            .iter()
            .map(|(name, counter)| (name.clone(), *counter))
            .collect())
    }

    pub fn set_value(&self, name: &str, value: i64) -> Result<Counter> {
        self.mutate(name, |_| Ok(value))
    }

    pub fn add(&self, name: &str, amount: i64) -> Result<Counter> {
        self.mutate(name, |counter| {
            (counter.current as i64)
                .checked_add(amount)
                .ok_or_else(|| CounterTokenError::OutOfRange(format!("{name} would overflow")))
        })
    }

    pub fn subtract(&self, name: &str, amount: i64) -> Result<Counter> {
        self.mutate(name, |counter| {
            (counter.current as i64)
                .checked_sub(amount)
                .ok_or_else(|| CounterTokenError::OutOfRange(format!("{name} would overflow")))
        })
    }

    pub fn set_to_max(&self, name: &str) -> Result<Counter> {
        self.mutate(name, |counter| {
            counter.max.map(|max| max as i64).ok_or_else(|| {
                CounterTokenError::invalid(format!("counter {name} does not have a max value"))
            })
        })
    }

    /// Change the maximum. A current value above the new maximum is clamped
    /// down in the same step and change observers are notified.
    pub fn set_max(&self, name: &str, value: i64) -> Result<Counter> {
        if value <= 0 {
            return Err(CounterTokenError::invalid(format!(
                "max for {name} must be a positive integer"
            )));
        }
        let (snapshot, handlers) = {
            let mut inner = self.lock()?;
            let counter = inner
                .counters
                .get_mut(name)
                .ok_or_else(|| CounterTokenError::counter_not_found(name))?;
            let max = value as u64;
            counter.max = Some(max);
            let clamped = counter.current > max;
            if clamped {
                counter.current = max;
            }
            let snapshot = *counter;
            let handlers = if clamped {
                inner.on_change.snapshot()
            } else {
                Vec::new()
            };
            (snapshot, handlers)
        };
        emit(
            self.logger.as_ref(),
            LogLevel::Debug,
            TARGET,
            "counter_max_changed",
            [
                json_kv("counter", name),
                json_kv("max", value),
                json_kv("current", snapshot.current),
            ],
        );
        for handler in handlers {
            handler(name, &snapshot);
        }
        Ok(snapshot)
    }

    /// Validate the computed target against the counter before touching it;
    /// a rejected value leaves the counter unchanged.
    fn mutate<F>(&self, name: &str, target: F) -> Result<Counter>
    where
        F: FnOnce(&Counter) -> Result<i64>,
    {
        let (snapshot, handlers) = {
            let mut inner = self.lock()?;
            let counter = inner
                .counters
                .get_mut(name)
                .ok_or_else(|| CounterTokenError::counter_not_found(name))?;
            let value = counter.admits(target(counter)?, name)?;
            counter.current = value;
            let snapshot = *counter;
            (snapshot, inner.on_change.snapshot())
        };
        emit(
            self.logger.as_ref(),
            LogLevel::Debug,
            TARGET,
            "counter_changed",
            [
                json_kv("counter", name),
                json_kv("current", snapshot.current),
                json_kv("observers", handlers.len()),
            ],
        );
        for handler in handlers {
            handler(name, &snapshot);
        }
        Ok(snapshot)
    }

    /// Notify remove observers while the counter is still readable, then delete it.
    pub fn remove(&self, name: &str) -> Result<()> {
        let handlers = {
            let inner = self.lock()?;
            if !inner.counters.contains_key(name) {
                return Err(CounterTokenError::counter_not_found(name));
            }
            inner.on_remove.snapshot()
        };
        for handler in handlers {
            handler(name);
        }
        self.lock()?.counters.remove(name);
        emit(
            self.logger.as_ref(),
            LogLevel::Info,
            TARGET,
            "counter_removed",
            [json_kv("counter", name)],
        );
        Ok(())
    }

    /// Delete every counter, notifying remove observers for each.
    pub fn reset(&self) -> Result<()> {
        let names: Vec<String> = self.lock()?.counters.keys().cloned().collect();
        for name in names {
            self.remove(&name)?;
        }
        Ok(())
    }

    /// Drop all counters and observer registrations without notifying anyone.
    pub fn teardown(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.counters.clear();
        inner.on_change.clear();
        inner.on_remove.clear();
        Ok(())
    }

    /// Register a change observer; it immediately receives the current value
    /// of every existing counter.
    pub fn observe_change(&self, handler: ChangeHandler) -> Result<ObserverId> {
        let (id, existing) = {
            let mut inner = self.lock()?;
            let id = inner.on_change.push(Arc::clone(&handler));
            let existing: Vec<(String, Counter)> = inner
                .counters
                .iter()
                .map(|(name, counter)| (name.clone(), *counter))
                .collect();
            (id, existing)
        };
        for (name, counter) in existing {
            handler(&name, &counter);
        }
        Ok(id)
    }

    pub fn ignore_change(&self, id: ObserverId) -> Result<bool> {
        Ok(self.lock()?.on_change.remove(id))
    }

    pub fn observe_remove(&self, handler: RemoveHandler) -> Result<ObserverId> {
        Ok(self.lock()?.on_remove.push(handler))
    }

    pub fn ignore_remove(&self, id: ObserverId) -> Result<bool> {
        Ok(self.lock()?.on_remove.remove(id))
    }

    pub fn observer_counts(&self) -> (usize, usize) {
        self.lock()
            .map(|inner| (inner.on_change.len(), inner.on_remove.len()))
            .unwrap_or((0, 0))
    }

    pub fn snapshot(&self) -> Result<BTreeMap<String, Counter>> {
        Ok(self.lock()?.counters.clone())
    }

    /// Replace all counters with persisted ones, without notifications.
    pub fn restore(&self, counters: BTreeMap<String, Counter>) -> Result<()> {
        for (name, counter) in &counters {
            if counter.max.is_some_and(|max| counter.current > max) {
                return Err(CounterTokenError::OutOfRange(format!(
                    "persisted counter {name} holds {counter}"
                )));
            }
        }
        self.lock()?.counters = counters;
        Ok(())
    }
}

/// Coerce operator text into an integer argument.
pub fn parse_count(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| CounterTokenError::invalid(format!("supplied value {raw} is not a number")))
}
