//! Routing of point spends either to a single counter or to a shared pool.
//!
//! How a shared-pool spend is split between counters is up to the
//! [`SpendDistributor`] the host supplies.

use crate::counter::{Counter, CounterStore};
use crate::error::{CounterTokenError, Result};

/// Pool name whose spends go to the distributor instead of a counter.
pub const SHARED_POOL: &str = "vitality";

pub trait SpendDistributor {
    fn distribute(&self, store: &CounterStore, amount: u64) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendOutcome {
    Subtracted { counter: String, value: Counter },
    Distributed { amount: u64 },
}

pub fn route_spend(
    store: &CounterStore,
    pool: &str,
    amount: i64,
    distributor: &dyn SpendDistributor,
) -> Result<SpendOutcome> {
    if amount < 0 {
        return Err(CounterTokenError::invalid(format!(
            "spend amount must not be negative, got {amount}"
        )));
    }
    if pool.eq_ignore_ascii_case(SHARED_POOL) {
        distributor.distribute(store, amount as u64)?;
        return Ok(SpendOutcome::Distributed {
            amount: amount as u64,
        });
    }
    let value = store.subtract(pool, amount)?;
    Ok(SpendOutcome::Subtracted {
        counter: pool.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::parse_count;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        spends: Mutex<Vec<u64>>,
    }

    impl SpendDistributor for Recorder {
        fn distribute(&self, _store: &CounterStore, amount: u64) -> Result<()> {
            self.spends.lock().unwrap().push(amount);
            Ok(())
        }
    }

    #[test]
    fn named_pools_subtract_from_their_counter() {
        let store = CounterStore::new();
        store.create("focus", Some(5), Some(5)).unwrap();
        let recorder = Recorder::default();

        let outcome = route_spend(&store, "focus", parse_count("2").unwrap(), &recorder).unwrap();
        assert_eq!(
            outcome,
            SpendOutcome::Subtracted {
                counter: "focus".to_string(),
                value: Counter {
                    current: 3,
                    max: Some(5)
                },
            }
        );
        assert!(recorder.spends.lock().unwrap().is_empty());
    }

    #[test]
    fn shared_pool_goes_to_distributor() {
        let store = CounterStore::new();
        let recorder = Recorder::default();
        let outcome = route_spend(&store, "Vitality", 4, &recorder).unwrap();
        assert_eq!(outcome, SpendOutcome::Distributed { amount: 4 });
        assert_eq!(*recorder.spends.lock().unwrap(), vec![4]);
    }

    #[test]
    fn negative_and_unknown_spends_fail() {
        let store = CounterStore::new();
        let recorder = Recorder::default();
        assert!(matches!(
            route_spend(&store, "focus", -1, &recorder),
            Err(CounterTokenError::InvalidArgument(_))
        ));
        assert!(matches!(
            route_spend(&store, "focus", 1, &recorder),
            Err(CounterTokenError::NotFound { .. })
        ));
    }
}
