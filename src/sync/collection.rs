//! The synchronized collection: one record list bound to a remote query.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
  fetch_with_degrade, CollectionQuery, CollectionStats, FetchOutcome, Record, RemoteSource,
};
use crate::cache::{fallback_message, CacheLayer, CacheResult, CacheStorage, Snapshot};

/// What a `load` produced; `error` mirrors the collection's error state.
pub type LoadResult<T> = CacheResult<Vec<T>>;

/// Initial query and behavior of a collection.
#[derive(Debug, Clone, Default)]
pub struct CollectionOptions {
  pub property_id: Option<String>,
  pub limit: Option<u32>,
  pub filtered: bool,
  /// Ask the remote whether the scope takes part before loading
  pub check_eligibility: bool,
}

struct State<T> {
  records: Vec<T>,
  error: Option<String>,
  is_loading: bool,
  last_loaded: Option<DateTime<Utc>>,
  query: CollectionQuery,
  /// Bumped by `detach` and scope changes; loads started under an older
  /// generation do not touch state.
  generation: u64,
}

type InFlight<T> = Shared<BoxFuture<'static, LoadResult<T>>>;

/// Cache key, generation and `force` of a running load.
type Slot = (String, u64, bool);

struct Inner<T, R, S: CacheStorage> {
  remote: R,
  cache: CacheLayer<S>,
  check_eligibility: bool,
  state: Mutex<State<T>>,
  in_flight: Mutex<HashMap<Slot, InFlight<T>>>,
}

/// A locally held record collection kept consistent with a remote source.
///
/// Reads are served from memory while fresh, then from the persistent cache
/// while fresh, then from the network. A failed fetch falls back to the last
/// persisted snapshot of any age. Cloning yields another handle to the same
/// collection.
pub struct SyncedCollection<T, R, S: CacheStorage> {
  inner: Arc<Inner<T, R, S>>,
}

impl<T, R, S: CacheStorage> Clone for SyncedCollection<T, R, S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T, R, S> SyncedCollection<T, R, S>
where
  T: Record,
  R: RemoteSource<T>,
  S: CacheStorage,
{
  pub fn new(remote: R, cache: CacheLayer<S>, options: CollectionOptions) -> Self {
    let query = CollectionQuery {
      property_id: options.property_id,
      limit: options.limit,
      filtered: options.filtered,
    };

    Self {
      inner: Arc::new(Inner {
        remote,
        cache,
        check_eligibility: options.check_eligibility,
        state: Mutex::new(State {
          records: Vec::new(),
          error: None,
          is_loading: false,
          last_loaded: None,
          query,
          generation: 0,
        }),
        in_flight: Mutex::new(HashMap::new()),
      }),
    }
  }

  /// Bring the collection up to date.
  ///
  /// Without `force`, fresh in-memory or cached data is served without
  /// network I/O. Overlapping loads for the same key share one request; a
  /// forced load only joins another forced load.
  pub async fn load(&self, force: bool) -> LoadResult<T> {
    let (query, generation) = {
      let state = self.inner.lock_state();
      if !force {
        if let Some(loaded) = state.last_loaded {
          if !self.inner.cache.is_stale(loaded) {
            debug!(kind = T::entity_type(), "Serving in-memory records");
            return CacheResult::from_memory(state.records.clone(), Some(loaded));
          }
        }
      }
      (state.query.clone(), state.generation)
    };

    let key = query.cache_key(T::entity_type());
    let slot: Slot = (key.clone(), generation, force);

    let shared = {
      let mut in_flight = self.inner.lock_in_flight();
      match in_flight.get(&slot).cloned() {
        Some(existing) => {
          debug!(key = %key, "Joining in-flight load");
          existing
        }
        None => {
          let inner = Arc::clone(&self.inner);
          let finished = slot.clone();
          let load = async move {
            let result = inner.run_load(&key, &query, force, generation).await;
            inner.lock_in_flight().remove(&finished);
            result
          }
          .boxed()
          .shared();
          in_flight.insert(slot, load.clone());
          load
        }
      }
    };

    shared.await
  }

  /// Replace the record with the same id and re-persist. Never calls the network.
  ///
  /// Returns false when no record has that id.
  pub fn update_record(&self, updated: T) -> bool {
    let id = updated.cache_key();
    let persisted = {
      let mut state = self.inner.lock_state();
      let Some(slot) = state.records.iter_mut().find(|r| r.cache_key() == id) else {
        debug!(id = %id, "Update for unknown record ignored");
        return false;
      };
      *slot = updated;
      self.inner.snapshot_of(&state)
    };

    let (key, snapshot) = persisted;
    self.inner.cache.write(&key, &snapshot);
    true
  }

  /// Add a record created remotely, or replace it if the id is already held.
  ///
  /// New records go first, matching the server's newest-first order.
  /// Returns true when the record was not held before.
  pub fn insert_record(&self, record: T) -> bool {
    let id = record.cache_key();
    let (inserted, (key, snapshot)) = {
      let mut state = self.inner.lock_state();
      let inserted = match state.records.iter_mut().find(|r| r.cache_key() == id) {
        Some(slot) => {
          *slot = record;
          false
        }
        None => {
          state.records.insert(0, record);
          true
        }
      };
      (inserted, self.inner.snapshot_of(&state))
    };

    self.inner.cache.write(&key, &snapshot);
    inserted
  }

  /// Drop a record locally, e.g. after it was deleted remotely.
  pub fn remove_record(&self, id: &str) -> bool {
    let persisted = {
      let mut state = self.inner.lock_state();
      let before = state.records.len();
      state.records.retain(|r| r.cache_key() != id);
      if state.records.len() == before {
        return false;
      }
      self.inner.snapshot_of(&state)
    };

    let (key, snapshot) = persisted;
    self.inner.cache.write(&key, &snapshot);
    true
  }

  pub fn stats(&self) -> CollectionStats {
    CollectionStats::from_records(&self.inner.lock_state().records)
  }

  /// Forget the persisted entry; the next `load` goes to the network.
  pub fn clear_cache(&self) {
    let key = {
      let mut state = self.inner.lock_state();
      state.last_loaded = None;
      state.query.cache_key(T::entity_type())
    };
    self.inner.cache.remove(&key);
    info!(key = %key, "Cleared cached collection");
  }

  /// Re-key the collection to another scope. Returns false if unchanged.
  ///
  /// Records from the previous scope are dropped and pending loads for it
  /// are ignored when they finish.
  pub fn set_scope(&self, property_id: Option<String>) -> bool {
    let mut state = self.inner.lock_state();
    if state.query.property_id == property_id {
      return false;
    }

    debug!(
      from = ?state.query.property_id,
      to = ?property_id,
      kind = T::entity_type(),
      "Scope changed"
    );
    state.query.property_id = property_id;
    state.generation += 1;
    state.records.clear();
    state.error = None;
    state.last_loaded = None;
    state.is_loading = false;
    true
  }

  /// Stop applying results of loads that are currently running.
  pub fn detach(&self) {
    let mut state = self.inner.lock_state();
    state.generation += 1;
    state.is_loading = false;
  }

  /// Track a selection: re-scope and load whenever it changes.
  ///
  /// The task ends when the sender is dropped.
  pub fn follow_selection(&self, mut selection: watch::Receiver<Option<String>>) -> JoinHandle<()> {
    let collection = self.clone();
    tokio::spawn(async move {
      loop {
        let scope = selection.borrow_and_update().clone();
        collection.set_scope(scope);
        collection.load(false).await;
        if selection.changed().await.is_err() {
          break;
        }
      }
    })
  }

  pub fn records(&self) -> Vec<T> {
    self.inner.lock_state().records.clone()
  }

  pub fn error(&self) -> Option<String> {
    self.inner.lock_state().error.clone()
  }

  pub fn is_loading(&self) -> bool {
    self.inner.lock_state().is_loading
  }

  pub fn last_loaded(&self) -> Option<DateTime<Utc>> {
    self.inner.lock_state().last_loaded
  }

  pub fn query(&self) -> CollectionQuery {
    self.inner.lock_state().query.clone()
  }
}

impl<T, R, S> Inner<T, R, S>
where
  T: Record,
  R: RemoteSource<T>,
  S: CacheStorage,
{
  fn lock_state(&self) -> MutexGuard<'_, State<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<Slot, InFlight<T>>> {
    self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn snapshot_of(&self, state: &State<T>) -> (String, Snapshot<T>) {
    (
      state.query.cache_key(T::entity_type()),
      Snapshot::new(state.records.clone(), self.cache.now()),
    )
  }

  /// Apply `update` if no detach or scope change happened since `generation`.
  fn apply(&self, generation: u64, update: impl FnOnce(&mut State<T>)) -> bool {
    let mut state = self.lock_state();
    if state.generation != generation {
      debug!(kind = T::entity_type(), "Discarding result of superseded load");
      return false;
    }
    update(&mut state);
    state.is_loading = false;
    true
  }

  async fn run_load(
    &self,
    key: &str,
    query: &CollectionQuery,
    force: bool,
    generation: u64,
  ) -> LoadResult<T> {
    {
      let mut state = self.lock_state();
      if state.generation == generation {
        state.is_loading = true;
      }
    }

    if self.check_eligibility && query.filtered {
      if let Some(scope) = query.property_id.as_deref() {
        match self.remote.scope_eligible(scope).await {
          Ok(true) => {}
          Ok(false) => {
            info!(scope, kind = T::entity_type(), "Scope not eligible, collection is empty");
            let now = self.cache.now();
            self.apply(generation, |state| {
              state.records.clear();
              state.error = None;
              state.last_loaded = Some(now);
            });
            return CacheResult::from_network(Vec::new());
          }
          Err(e) => {
            warn!(scope, error = %e, "Eligibility check failed, assuming eligible");
          }
        }
      }
    }

    if !force {
      if let Some(snapshot) = self.cache.read_fresh::<T>(key) {
        debug!(key, cached_at = %snapshot.timestamp, "Serving fresh cache");
        let cached_at = snapshot.timestamp;
        let records = snapshot.data;
        let data = records.clone();
        self.apply(generation, |state| {
          state.records = records;
          state.error = None;
          state.last_loaded = Some(cached_at);
        });
        return CacheResult::from_cache(data, cached_at, false);
      }
    }

    let records = match fetch_with_degrade(&self.remote, query).await {
      FetchOutcome::Strict(records) => records,
      FetchOutcome::Relaxed {
        records,
        strict_error,
      } => {
        info!(key, error = %strict_error, count = records.len(), "Loaded without server-side filter");
        records
      }
      FetchOutcome::Failed(error) => return self.fall_back(key, generation, error),
    };

    info!(key, count = records.len(), "Loaded from network");
    let now = self.cache.now();
    let snapshot = Snapshot::new(records, now);
    self.cache.write(key, &snapshot);

    let data = snapshot.data.clone();
    self.apply(generation, |state| {
      state.records = snapshot.data;
      state.error = None;
      state.last_loaded = Some(now);
    });
    CacheResult::from_network(data)
  }

  /// Serve the last persisted snapshot of any age after a failed fetch.
  fn fall_back(&self, key: &str, generation: u64, error: String) -> LoadResult<T> {
    match self.cache.read_any::<T>(key) {
      Some(snapshot) => {
        warn!(key, error = %error, cached_at = %snapshot.timestamp, "Fetch failed, serving cached data");
        let message = fallback_message(&error, snapshot.timestamp);
        let cached_at = snapshot.timestamp;
        let data = snapshot.data.clone();
        let state_message = message.clone();
        self.apply(generation, |state| {
          state.records = snapshot.data;
          state.error = Some(state_message);
          // The snapshot's own age keeps the next load retrying the network.
          state.last_loaded = Some(cached_at);
        });
        CacheResult::offline(data, cached_at, message)
      }
      None => {
        warn!(key, error = %error, "Fetch failed with nothing cached");
        let state_error = error.clone();
        let mut current = Vec::new();
        let mut loaded = None;
        self.apply(generation, |state| {
          state.error = Some(state_error);
          current = state.records.clone();
          loaded = state.last_loaded;
        });
        CacheResult::from_memory(current, loaded).with_error(error)
      }
    }
  }
}
