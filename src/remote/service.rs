//! Boundary to the remote relational data service.

use color_eyre::Result;
use serde_json::Value;
use std::future::Future;

use super::query::{Embed, ReadQuery, Table};

/// Operations the remote data service offers.
///
/// Reads return rows in the service's order. Writes return the affected row,
/// including the requested embeds, as the service now stores it. The service
/// owns identifiers and timestamps.
pub trait RemoteService: Send + Sync + 'static {
  fn select(&self, query: &ReadQuery) -> impl Future<Output = Result<Vec<Value>>> + Send;

  fn insert(
    &self,
    table: Table,
    row: Value,
    embeds: &'static [Embed],
  ) -> impl Future<Output = Result<Value>> + Send;

  fn update(
    &self,
    table: Table,
    id: &str,
    changes: Value,
    embeds: &'static [Embed],
  ) -> impl Future<Output = Result<Value>> + Send;

  fn delete(&self, table: Table, id: &str) -> impl Future<Output = Result<()>> + Send;

  /// Insert, or update the row sharing the `on_conflict` natural key.
  fn upsert(
    &self,
    table: Table,
    row: Value,
    on_conflict: &'static [&'static str],
    embeds: &'static [Embed],
  ) -> impl Future<Output = Result<Value>> + Send;
}
