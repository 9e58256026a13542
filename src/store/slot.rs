//! Per-entity cache slot: ordered rows plus a loading flag.

use serde_json::Value;
use std::cmp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::remote::Filter;

use super::traits::Entity;

struct SlotData<T> {
  rows: Vec<T>,
  /// `T::ORDER` column of each row, as the service returned it
  sort_keys: Vec<Value>,
  /// Filters of the last successful fetch
  filters: Vec<Filter>,
}

/// Value of the ordered column in a service row.
pub fn sort_key<T: Entity>(json: &Value) -> Value {
  json.get(T::ORDER.column).cloned().unwrap_or(Value::Null)
}

pub struct Slot<T> {
  data: RwLock<SlotData<T>>,
  loading: AtomicBool,
}

impl<T> Default for Slot<T> {
  fn default() -> Self {
    Self {
      data: RwLock::new(SlotData {
        rows: Vec::new(),
        sort_keys: Vec::new(),
        filters: Vec::new(),
      }),
      loading: AtomicBool::new(false),
    }
  }
}

/// Clears the loading flag when dropped, including when a fetch is abandoned.
pub struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

impl<T: Entity> Slot<T> {
  pub fn snapshot(&self) -> Vec<T> {
    self
      .data
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .rows
      .clone()
  }

  pub fn is_loading(&self) -> bool {
    self.loading.load(Ordering::SeqCst)
  }

  pub fn begin_load(&self) -> LoadingGuard<'_> {
    self.loading.store(true, Ordering::SeqCst);
    LoadingGuard(&self.loading)
  }

  /// Replace every row with a fetch result, rows paired with their sort keys.
  pub fn replace(&self, rows: Vec<(T, Value)>, filters: Vec<Filter>) {
    let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
    let (rows, sort_keys): (Vec<T>, Vec<Value>) = rows.into_iter().unzip();
    data.rows = rows;
    data.sort_keys = sort_keys;
    data.filters = filters;
  }

  /// Apply a row returned by a write.
  ///
  /// The row is kept only if the slot's last fetch would have returned it:
  /// it must match the slot's filters and carry every inner-joined embed.
  /// A kept row whose sort key is unchanged replaces its old copy in place.
  /// Otherwise it goes where `T::ORDER` puts it, after any rows with an
  /// equal key. A row that is no longer visible is removed.
  pub fn merge(&self, row: T, json: &Value) {
    let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
    let visible = data.filters.iter().all(|f| f.matches(json))
      && T::EMBEDS.iter().all(|e| e.present_in(json));
    let key = sort_key::<T>(json);
    let position = data.rows.iter().position(|r| r.id() == row.id());

    if let Some(i) = position {
      if visible && data.sort_keys[i] == key {
        data.rows[i] = row;
        return;
      }
      data.rows.remove(i);
      data.sort_keys.remove(i);
    }
    if !visible {
      return;
    }

    let at = data
      .sort_keys
      .iter()
      .position(|k| T::ORDER.compare(Some(&key), Some(k)) == cmp::Ordering::Less)
      .unwrap_or(data.rows.len());
    data.rows.insert(at, row);
    data.sort_keys.insert(at, key);
  }

  pub fn remove(&self, id: &str) {
    let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(i) = data.rows.iter().position(|r| r.id() == id) {
      data.rows.remove(i);
      data.sort_keys.remove(i);
    }
  }
}
