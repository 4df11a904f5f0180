//! The selected property shared by every view.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::types::Property;
use crate::cache::CacheStorage;

/// Storage key of the persisted selection.
pub const SELECTION_KEY: &str = "selectedPropertyId";

/// Holds the selected property and revalidates it against the known set.
///
/// Every transition is persisted before it is published. Subscribers see
/// only actual changes.
pub struct SelectionContext<S: CacheStorage> {
  storage: Arc<S>,
  known: Mutex<Vec<Property>>,
  preferred: Option<String>,
  sender: watch::Sender<Option<String>>,
}

impl<S: CacheStorage> SelectionContext<S> {
  pub fn new(storage: Arc<S>) -> Self {
    let (sender, _) = watch::channel(None);
    Self {
      storage,
      known: Mutex::new(Vec::new()),
      preferred: None,
      sender,
    }
  }

  /// Property to pick when nothing usable was persisted.
  pub fn with_default(mut self, property_id: Option<String>) -> Self {
    self.preferred = property_id;
    self
  }

  /// Restore the persisted selection against the first known property set.
  pub fn initialize(&self, scopes: &[Property]) {
    *self.lock_known() = scopes.to_vec();

    let persisted = match self.storage.get_item(SELECTION_KEY) {
      Ok(value) => value.filter(|id| !id.is_empty()),
      Err(e) => {
        warn!(error = %e, "Failed to read persisted selection");
        None
      }
    };

    let next = persisted
      .filter(|id| contains(scopes, id))
      .or_else(|| self.preferred.clone().filter(|id| contains(scopes, id)))
      .or_else(|| scopes.first().map(|p| p.id.clone()));

    match next {
      Some(id) => self.transition(Some(id)),
      None => debug!("No properties known, selection stays empty"),
    }
  }

  /// Revalidate the selection after the known property set changed.
  pub fn sync_scopes(&self, scopes: &[Property]) {
    *self.lock_known() = scopes.to_vec();

    let current = self.current();
    let next = match current.as_deref() {
      Some(id) if contains(scopes, id) => return,
      Some(id) => {
        info!(property = id, "Selected property no longer available");
        scopes.first().map(|p| p.id.clone())
      }
      None => match scopes.first() {
        Some(first) => Some(first.id.clone()),
        None => return,
      },
    };

    self.transition(next);
  }

  /// Select a property. An empty id clears the selection; unknown ids are rejected.
  pub fn select(&self, property_id: &str) -> bool {
    if property_id.is_empty() {
      self.transition(None);
      return true;
    }

    if !contains(&self.lock_known(), property_id) {
      debug!(property = property_id, "Rejected unknown property");
      return false;
    }

    self.transition(Some(property_id.to_string()));
    true
  }

  pub fn current(&self) -> Option<String> {
    self.sender.borrow().clone()
  }

  /// The selected property, if it is one of the known ones.
  pub fn current_property(&self) -> Option<Property> {
    let current = self.current()?;
    self.lock_known().iter().find(|p| p.id == current).cloned()
  }

  pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
    self.sender.subscribe()
  }

  fn lock_known(&self) -> MutexGuard<'_, Vec<Property>> {
    self.known.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn transition(&self, next: Option<String>) {
    let persisted = match &next {
      Some(id) => self.storage.set_item(SELECTION_KEY, id),
      None => self.storage.remove_item(SELECTION_KEY),
    };
    if let Err(e) = persisted {
      warn!(error = %e, "Failed to persist selection, keeping it in memory only");
    }

    self.sender.send_if_modified(|current| {
      if *current == next {
        return false;
      }
      debug!(from = ?current, to = ?next, "Selection changed");
      *current = next;
      true
    });
  }
}

fn contains(scopes: &[Property], id: &str) -> bool {
  scopes.iter().any(|p| p.id == id)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;

  fn props(ids: &[&str]) -> Vec<Property> {
    ids
      .iter()
      .map(|id| Property {
        id: id.to_string(),
        name: format!("Property {}", id),
        description: None,
        created_at: None,
      })
      .collect()
  }

  fn persisted(storage: &MemoryStorage) -> Option<String> {
    storage.get_item(SELECTION_KEY).unwrap()
  }

  #[test]
  fn test_initialize_restores_persisted_selection() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set_item(SELECTION_KEY, "P2").unwrap();
    let ctx = SelectionContext::new(Arc::clone(&storage));

    ctx.initialize(&props(&["P1", "P2"]));

    assert_eq!(ctx.current().as_deref(), Some("P2"));
  }

  #[test]
  fn test_initialize_falls_back_to_first_and_persists() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set_item(SELECTION_KEY, "GONE").unwrap();
    let ctx = SelectionContext::new(Arc::clone(&storage));

    ctx.initialize(&props(&["P1", "P2"]));

    assert_eq!(ctx.current().as_deref(), Some("P1"));
    assert_eq!(persisted(&storage).as_deref(), Some("P1"));
  }

  #[test]
  fn test_initialize_prefers_configured_default() {
    let storage = Arc::new(MemoryStorage::new());
    let ctx = SelectionContext::new(Arc::clone(&storage)).with_default(Some("P2".to_string()));

    ctx.initialize(&props(&["P1", "P2"]));

    assert_eq!(ctx.current().as_deref(), Some("P2"));
  }

  #[test]
  fn test_initialize_with_no_scopes_stays_unselected() {
    let ctx = SelectionContext::new(Arc::new(MemoryStorage::new()));
    ctx.initialize(&[]);
    assert_eq!(ctx.current(), None);
  }

  #[test]
  fn test_vanished_selection_moves_to_first_available() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set_item(SELECTION_KEY, "P1").unwrap();
    let ctx = SelectionContext::new(Arc::clone(&storage));
    ctx.initialize(&props(&["P1", "P2"]));

    ctx.sync_scopes(&props(&["P2", "P3"]));

    assert_eq!(ctx.current().as_deref(), Some("P2"));
    assert_eq!(persisted(&storage).as_deref(), Some("P2"));
  }

  #[test]
  fn test_empty_scope_set_clears_selection() {
    let storage = Arc::new(MemoryStorage::new());
    let ctx = SelectionContext::new(Arc::clone(&storage));
    ctx.initialize(&props(&["P1"]));

    ctx.sync_scopes(&[]);

    assert_eq!(ctx.current(), None);
    assert_eq!(persisted(&storage), None);
  }

  #[test]
  fn test_unselected_picks_first_when_scopes_arrive() {
    let ctx = SelectionContext::new(Arc::new(MemoryStorage::new()));
    ctx.initialize(&[]);

    ctx.sync_scopes(&props(&["P7"]));

    assert_eq!(ctx.current().as_deref(), Some("P7"));
  }

  #[test]
  fn test_select_rejects_unknown_and_clears_on_empty() {
    let storage = Arc::new(MemoryStorage::new());
    let ctx = SelectionContext::new(Arc::clone(&storage));
    ctx.initialize(&props(&["P1", "P2"]));

    assert!(!ctx.select("P9"));
    assert_eq!(ctx.current().as_deref(), Some("P1"));

    assert!(ctx.select("P2"));
    assert_eq!(persisted(&storage).as_deref(), Some("P2"));
    assert_eq!(ctx.current_property().map(|p| p.name), Some("Property P2".to_string()));

    assert!(ctx.select(""));
    assert_eq!(ctx.current(), None);
    assert_eq!(persisted(&storage), None);
  }

  #[test]
  fn test_storage_failure_keeps_selection_in_memory() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set_simulate_write_error(true);
    let ctx = SelectionContext::new(Arc::clone(&storage));

    ctx.initialize(&props(&["P1"]));

    assert_eq!(ctx.current().as_deref(), Some("P1"));
  }

  #[tokio::test]
  async fn test_subscribers_observe_changes_only() {
    let ctx = SelectionContext::new(Arc::new(MemoryStorage::new()));
    let mut rx = ctx.subscribe();
    ctx.initialize(&props(&["P1", "P2"]));

    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().as_deref(), Some("P1"));

    ctx.sync_scopes(&props(&["P1", "P2", "P3"]));
    assert!(!rx.has_changed().unwrap());

    ctx.select("P3");
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().as_deref(), Some("P3"));
  }
}
