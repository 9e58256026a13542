//! In-process `RemoteService` used by tests.
//!
//! Rows are schemaless JSON objects. The service assigns ids and timestamps,
//! resolves embeds, honours natural-key upserts and can be told to fail every
//! call against a table.

use chrono::{Duration, SecondsFormat, TimeZone, Utc};
use color_eyre::{eyre::eyre, Result};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use super::query::{Columns, Embed, Order, ReadQuery, Table};
use super::service::RemoteService;

#[derive(Default)]
struct Tables {
  rows: HashMap<Table, Vec<Value>>,
  failing: HashSet<Table>,
  next_id: u64,
  selects: HashMap<Table, usize>,
}

#[derive(Default)]
pub struct MemoryService {
  inner: Mutex<Tables>,
}

impl MemoryService {
  pub fn new() -> Self {
    Self::default()
  }

  /// Store rows verbatim, keeping their ids and timestamps.
  pub fn seed(&self, table: Table, rows: Vec<Value>) {
    let mut tables = self.lock();
    tables.rows.entry(table).or_default().extend(rows);
  }

  /// Make every call against `table` fail until `recover` is called.
  pub fn fail(&self, table: Table) {
    self.lock().failing.insert(table);
  }

  pub fn recover(&self, table: Table) {
    self.lock().failing.remove(&table);
  }

  /// Raw rows currently stored for a table.
  pub fn rows(&self, table: Table) -> Vec<Value> {
    self.lock().rows.get(&table).cloned().unwrap_or_default()
  }

  /// Number of reads issued against a table.
  pub fn select_count(&self, table: Table) -> usize {
    self.lock().selects.get(&table).copied().unwrap_or(0)
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Tables {
  fn check(&self, table: Table) -> Result<()> {
    if self.failing.contains(&table) {
      return Err(eyre!("service unavailable for {}", table));
    }
    Ok(())
  }

  /// Monotonic id and timestamp, so newer rows sort after older ones.
  fn stamp(&mut self, table: Table) -> (String, String) {
    self.next_id += 1;
    let base = Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap();
    let at = base + Duration::seconds(self.next_id as i64);
    (
      format!("{}-{:04}", table, self.next_id),
      at.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
  }

  fn insert_row(&mut self, table: Table, row: Value) -> Result<Value> {
    let mut object = into_object(row)?;
    let (id, now) = self.stamp(table);
    object.insert("id".to_string(), Value::String(id));
    object.insert("created_at".to_string(), Value::String(now.clone()));
    object.insert("updated_at".to_string(), Value::String(now));
    let row = Value::Object(object);
    self.rows.entry(table).or_default().push(row.clone());
    Ok(row)
  }

  fn patch_row(&mut self, table: Table, index: usize, changes: Value) -> Result<Value> {
    let changes = into_object(changes)?;
    let (_, now) = self.stamp(table);
    let rows = self.rows.entry(table).or_default();
    let row = rows
      .get_mut(index)
      .and_then(Value::as_object_mut)
      .ok_or_else(|| eyre!("row {} missing from {}", index, table))?;
    for (k, v) in changes {
      if k != "id" {
        row.insert(k, v);
      }
    }
    row.insert("updated_at".to_string(), Value::String(now));
    Ok(Value::Object(row.clone()))
  }

  fn find_index(&self, table: Table, pred: impl Fn(&Value) -> bool) -> Option<usize> {
    self.rows.get(&table).and_then(|rows| rows.iter().position(pred))
  }

  /// Resolve one embed against the stored tables.
  ///
  /// With `joins`, outer `None` means an inner join found nothing and the
  /// parent is dropped. Without, every embed is plain and unmatched ones are
  /// null.
  fn resolve(&self, parent: &Value, embed: &Embed, joins: bool) -> Option<Value> {
    let key = parent.get(embed.local_key).filter(|v| !v.is_null());
    let found = key.and_then(|key| {
      self
        .rows
        .get(&embed.table)
        .and_then(|rows| rows.iter().find(|r| r.get(embed.foreign_key) == Some(key)))
    });

    let Some(found) = found else {
      return if joins && embed.inner {
        None
      } else {
        Some(Value::Null)
      };
    };

    let mut object = match embed.columns {
      Columns::All => found.as_object().cloned().unwrap_or_default(),
      Columns::Only(cols) => cols
        .iter()
        .map(|c| (c.to_string(), found.get(*c).cloned().unwrap_or(Value::Null)))
        .collect(),
    };
    for nested in embed.nested {
      let value = self.resolve(found, nested, joins)?;
      object.insert(nested.alias.to_string(), value);
    }
    Some(Value::Object(object))
  }

  /// Attach embeds to a row; `None` when an inner embed has no match.
  fn with_embeds(&self, row: &Value, embeds: &[Embed], joins: bool) -> Option<Value> {
    let mut object = row.as_object().cloned().unwrap_or_default();
    for embed in embeds {
      let value = self.resolve(row, embed, joins)?;
      object.insert(embed.alias.to_string(), value);
    }
    Some(Value::Object(object))
  }

  /// A written row comes back with plain embeds, like a mutation's
  /// representation.
  fn written(&self, row: &Value, embeds: &[Embed]) -> Value {
    self
      .with_embeds(row, embeds, false)
      .unwrap_or_else(|| row.clone())
  }
}

impl RemoteService for MemoryService {
  async fn select(&self, query: &ReadQuery) -> Result<Vec<Value>> {
    let mut tables = self.lock();
    *tables.selects.entry(query.table).or_default() += 1;
    tables.check(query.table)?;

    let mut rows: Vec<Value> = tables
      .rows
      .get(&query.table)
      .map(|rows| {
        rows
          .iter()
          .filter(|r| query.filters.iter().all(|f| f.matches(r)))
          .filter_map(|r| tables.with_embeds(r, query.embeds, true))
          .collect()
      })
      .unwrap_or_default();

    if let Some(order) = query.order {
      sort_rows(&mut rows, order);
    }
    Ok(rows)
  }

  async fn insert(&self, table: Table, row: Value, embeds: &'static [Embed]) -> Result<Value> {
    let mut tables = self.lock();
    tables.check(table)?;
    let row = tables.insert_row(table, row)?;
    Ok(tables.written(&row, embeds))
  }

  async fn update(
    &self,
    table: Table,
    id: &str,
    changes: Value,
    embeds: &'static [Embed],
  ) -> Result<Value> {
    let mut tables = self.lock();
    tables.check(table)?;
    let index = tables
      .find_index(table, |r| r.get("id").and_then(Value::as_str) == Some(id))
      .ok_or_else(|| eyre!("no {} row with id {}", table, id))?;
    let row = tables.patch_row(table, index, changes)?;
    Ok(tables.written(&row, embeds))
  }

  async fn delete(&self, table: Table, id: &str) -> Result<()> {
    let mut tables = self.lock();
    tables.check(table)?;
    if let Some(rows) = tables.rows.get_mut(&table) {
      rows.retain(|r| r.get("id").and_then(Value::as_str) != Some(id));
    }
    Ok(())
  }

  async fn upsert(
    &self,
    table: Table,
    row: Value,
    on_conflict: &'static [&'static str],
    embeds: &'static [Embed],
  ) -> Result<Value> {
    let mut tables = self.lock();
    tables.check(table)?;
    let existing = tables.find_index(table, |r| {
      on_conflict
        .iter()
        .all(|col| r.get(*col).is_some() && r.get(*col) == row.get(*col))
    });
    let stored = match existing {
      Some(index) => tables.patch_row(table, index, row)?,
      None => tables.insert_row(table, row)?,
    };
    Ok(tables.written(&stored, embeds))
  }
}

fn into_object(row: Value) -> Result<Map<String, Value>> {
  match row {
    Value::Object(map) => Ok(map),
    other => Err(eyre!("expected a JSON object row, got {}", other)),
  }
}

fn sort_rows(rows: &mut [Value], order: Order) {
  rows.sort_by(|a, b| order.compare(a.get(order.column), b.get(order.column)));
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::remote::query::Filter;
  use serde_json::json;

  const TEACHER: Embed = Embed {
    alias: "teacher",
    table: Table::Profiles,
    local_key: "teacher_id",
    foreign_key: "user_id",
    inner: true,
    columns: Columns::Only(&["full_name"]),
    nested: &[],
  };

  #[tokio::test]
  async fn test_inner_embed_drops_unmatched_rows() {
    let service = MemoryService::new();
    service.seed(
      Table::Profiles,
      vec![json!({ "user_id": "u1", "full_name": "Ada", "email": "ada@example.com" })],
    );
    service
      .insert(Table::Classes, json!({ "name": "A", "teacher_id": "u1" }), &[])
      .await
      .unwrap();
    service
      .insert(Table::Classes, json!({ "name": "B", "teacher_id": "u2" }), &[])
      .await
      .unwrap();

    const EMBEDS: &[Embed] = &[TEACHER];
    let rows = service
      .select(&ReadQuery::new(Table::Classes).embeds(EMBEDS))
      .await
      .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["teacher"], json!({ "full_name": "Ada" }));
  }

  #[tokio::test]
  async fn test_written_row_uses_plain_embeds() {
    let service = MemoryService::new();
    const EMBEDS: &[Embed] = &[TEACHER];
    let written = service
      .insert(Table::Classes, json!({ "name": "A", "teacher_id": "nobody" }), EMBEDS)
      .await
      .unwrap();

    assert_eq!(written["teacher"], Value::Null);
    assert!(!TEACHER.present_in(&written));
    let rows = service
      .select(&ReadQuery::new(Table::Classes).embeds(EMBEDS))
      .await
      .unwrap();
    assert!(rows.is_empty());
  }

  #[tokio::test]
  async fn test_upsert_matches_natural_key() {
    let service = MemoryService::new();
    const KEY: &[&str] = &["class_id", "student_id", "date"];
    let first = service
      .upsert(
        Table::Attendance,
        json!({ "class_id": "c1", "student_id": "s1", "date": "2025-09-19", "status": "present" }),
        KEY,
        &[],
      )
      .await
      .unwrap();
    let second = service
      .upsert(
        Table::Attendance,
        json!({ "class_id": "c1", "student_id": "s1", "date": "2025-09-19", "status": "late" }),
        KEY,
        &[],
      )
      .await
      .unwrap();

    assert_eq!(first["id"], second["id"]);
    assert_eq!(service.rows(Table::Attendance).len(), 1);
    assert_eq!(service.rows(Table::Attendance)[0]["status"], "late");
  }

  #[tokio::test]
  async fn test_select_filters_and_orders() {
    let service = MemoryService::new();
    for (class, title) in [("c1", "one"), ("c2", "two"), ("c1", "three")] {
      service
        .insert(
          Table::Assignments,
          json!({ "class_id": class, "title": title }),
          &[],
        )
        .await
        .unwrap();
    }

    let rows = service
      .select(
        &ReadQuery::new(Table::Assignments)
          .filter(Filter::eq("class_id", "c1"))
          .order(Order::desc("created_at")),
      )
      .await
      .unwrap();
    let titles: Vec<&str> = rows.iter().filter_map(|r| r["title"].as_str()).collect();
    assert_eq!(titles, vec!["three", "one"]);
  }

  #[tokio::test]
  async fn test_failing_table() {
    let service = MemoryService::new();
    service.fail(Table::Grades);
    assert!(service.select(&ReadQuery::new(Table::Grades)).await.is_err());
    service.recover(Table::Grades);
    assert!(service.select(&ReadQuery::new(Table::Grades)).await.is_ok());
    assert_eq!(service.select_count(Table::Grades), 2);
  }
}
