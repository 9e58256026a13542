//! Core traits and types for the data store.

use serde::{de::DeserializeOwned, Serialize};

use crate::remote::{Embed, Order, Table};

use super::layer::StoreState;
use super::slot::Slot;

/// A row type the store mirrors.
///
/// Implementors name the remote table, the embeds each read and write asks
/// for, the order the service returns rows in, and the slot holding them.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  const TABLE: Table;

  const EMBEDS: &'static [Embed];

  const ORDER: Order;

  /// Identifier assigned by the remote service
  fn id(&self) -> &str;

  fn slot(state: &StoreState) -> &Slot<Self>;
}

/// How the store brings its copy up to date after a successful write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteSync {
  /// Merge the row returned by the write into the cached rows by id
  #[default]
  Merge,
  /// Spawn an unfiltered refetch of the written table
  Resync,
}
