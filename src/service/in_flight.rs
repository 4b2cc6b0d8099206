//! Collapses concurrent runs for the same cache key into one execution.
//!
//! The first caller for a key starts the work on the runtime; anyone who
//! arrives while it is running receives a clone of the same shared future.
//! The entry is removed by a guard owned by the spawned task, so it goes
//! away exactly once however the work ends (value, error, panic or abort).

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::domain::models::CacheKey;
use crate::error::Result;

/// Shared handle on a running execution.
pub type Flight<V> = Shared<BoxFuture<'static, Result<V>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightRole {
    /// This caller started the work and pays for it.
    Started,
    /// This caller attached to work someone else started.
    Joined,
}

struct FlightSlot<V> {
    generation: u64,
    flight: Flight<V>,
}

type FlightMap<V> = Arc<DashMap<CacheKey, FlightSlot<V>>>;

pub struct InFlightRegistry<V> {
    flights: FlightMap<V>,
    next_generation: AtomicU64,
}

impl<V> InFlightRegistry<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Arc::new(DashMap::with_capacity(10)),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Join the flight registered for `key`, or start one from `start`.
    ///
    /// `start` is only invoked when no flight exists. Must be called from
    /// within a Tokio runtime.
    pub fn join_or_start<F, Fut>(&self, key: CacheKey, start: F) -> (FlightRole, Flight<V>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        match self.flights.entry(key) {
            Entry::Occupied(slot) => (FlightRole::Joined, slot.get().flight.clone()),
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let guard = FlightGuard {
                    flights: self.flights.clone(),
                    key: slot.key().clone(),
                    generation,
                };

                let work = start();
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    work.await
                });
                let flight = async move { handle.await.unwrap_or_else(|e| Err(e.into())) }
                    .boxed()
                    .shared();

                slot.insert(FlightSlot {
                    generation,
                    flight: flight.clone(),
                });
                (FlightRole::Started, flight)
            }
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.flights.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    /// Forget every registered flight. Running work continues, but new
    /// callers for the same keys start fresh executions.
    pub fn clear(&self) {
        self.flights.clear();
    }
}

impl<V> Default for InFlightRegistry<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

struct FlightGuard<V> {
    flights: FlightMap<V>,
    key: CacheKey,
    generation: u64,
}

impl<V> Drop for FlightGuard<V> {
    fn drop(&mut self) {
        // a newer flight may own the key after clear()
        self.flights
            .remove_if(&self.key, |_, slot| slot.generation == self.generation);
    }
}
