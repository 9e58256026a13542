//! Read-query description shared by every `RemoteService` implementation.
//!
//! A `ReadQuery` names a table, the embedded (joined) sub-objects to return
//! with each row, equality filters and an ordering. `RestClient` renders it
//! to PostgREST query parameters; the in-process test service interprets it
//! directly.

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Table-like resources exposed by the remote data service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
  Subjects,
  Classes,
  Students,
  Assignments,
  Grades,
  Attendance,
  Profiles,
  UserRoles,
}

impl Table {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Subjects => "subjects",
      Self::Classes => "classes",
      Self::Students => "students",
      Self::Assignments => "assignments",
      Self::Grades => "grades",
      Self::Attendance => "attendance",
      Self::Profiles => "profiles",
      Self::UserRoles => "user_roles",
    }
  }
}

impl fmt::Display for Table {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Columns returned for an embedded table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Columns {
  All,
  Only(&'static [&'static str]),
}

/// A joined sub-object requested alongside each row.
///
/// The parent's `local_key` column is matched against the embedded table's
/// `foreign_key` column. Every embed in this schema resolves to at most one
/// row, so it is returned as an object (or null) under `alias`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Embed {
  pub alias: &'static str,
  pub table: Table,
  pub local_key: &'static str,
  pub foreign_key: &'static str,
  /// Inner join: parent rows without a match are dropped
  pub inner: bool,
  pub columns: Columns,
  pub nested: &'static [Embed],
}

impl Embed {
  fn render(&self, out: &mut String, joins: bool) {
    out.push_str(self.alias);
    out.push(':');
    out.push_str(self.table.as_str());
    if joins && self.inner {
      out.push_str("!inner");
    }
    out.push('(');
    match self.columns {
      Columns::All => out.push('*'),
      Columns::Only(cols) => out.push_str(&cols.join(",")),
    }
    for nested in self.nested {
      out.push(',');
      nested.render(out, joins);
    }
    out.push(')');
  }

  /// Whether `row` carries this embed the way an inner-joined read returns it.
  ///
  /// Plain embeds always pass. An inner embed needs a matched object, and so
  /// does every inner embed nested inside it.
  pub fn present_in(&self, row: &Value) -> bool {
    match row.get(self.alias) {
      Some(found @ Value::Object(_)) => self.nested.iter().all(|n| n.present_in(found)),
      _ => !self.inner,
    }
  }
}

fn render(embeds: &[Embed], joins: bool) -> String {
  let mut out = String::from("*");
  for embed in embeds {
    out.push(',');
    embed.render(&mut out, joins);
  }
  out
}

/// Render the PostgREST `select` parameter for a row plus its embeds.
pub fn render_select(embeds: &[Embed]) -> String {
  render(embeds, true)
}

/// `select` for a write's returned row.
///
/// Inner joins are rendered as plain embeds: the row has already been
/// written, so an unmatched embed comes back as null instead of failing the
/// single-object response.
pub fn render_write_select(embeds: &[Embed]) -> String {
  render(embeds, false)
}

/// Equality filter on a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
  pub column: &'static str,
  pub value: String,
}

impl Filter {
  pub fn eq(column: &'static str, value: impl Into<String>) -> Self {
    Self {
      column,
      value: value.into(),
    }
  }

  /// Whether a JSON row satisfies this filter.
  pub fn matches(&self, row: &Value) -> bool {
    match row.get(self.column) {
      Some(Value::String(s)) => *s == self.value,
      Some(Value::Number(n)) => n.to_string() == self.value,
      Some(Value::Bool(b)) => b.to_string() == self.value,
      _ => false,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
  pub column: &'static str,
  pub descending: bool,
}

impl Order {
  pub const fn asc(column: &'static str) -> Self {
    Self {
      column,
      descending: false,
    }
  }

  pub const fn desc(column: &'static str) -> Self {
    Self {
      column,
      descending: true,
    }
  }

  /// Compare two values of the ordered column in the service's sort order.
  pub fn compare(&self, a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let ord = compare_values(a, b);
    if self.descending {
      ord.reverse()
    } else {
      ord
    }
  }
}

/// Numbers compare numerically and strings lexically. Missing or null sorts
/// first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
  let a = a.filter(|v| !v.is_null());
  let b = b.filter(|v| !v.is_null());
  match (a, b) {
    (Some(Value::Number(x)), Some(Value::Number(y))) => x
      .as_f64()
      .partial_cmp(&y.as_f64())
      .unwrap_or(Ordering::Equal),
    (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
    (Some(_), None) => Ordering::Greater,
    (None, Some(_)) => Ordering::Less,
    _ => Ordering::Equal,
  }
}

/// A filtered, ordered read with embeds.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadQuery {
  pub table: Table,
  pub embeds: &'static [Embed],
  pub filters: Vec<Filter>,
  pub order: Option<Order>,
}

impl ReadQuery {
  pub fn new(table: Table) -> Self {
    Self {
      table,
      embeds: &[],
      filters: Vec::new(),
      order: None,
    }
  }

  pub fn embeds(mut self, embeds: &'static [Embed]) -> Self {
    self.embeds = embeds;
    self
  }

  pub fn filter(mut self, filter: Filter) -> Self {
    self.filters.push(filter);
    self
  }

  pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
    self.filters.extend(filters);
    self
  }

  pub fn order(mut self, order: Order) -> Self {
    self.order = Some(order);
    self
  }

  /// PostgREST query parameters for this read.
  pub fn to_params(&self) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), render_select(self.embeds))];
    for f in &self.filters {
      params.push((f.column.to_string(), format!("eq.{}", f.value)));
    }
    if let Some(order) = self.order {
      let dir = if order.descending { "desc" } else { "asc" };
      params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
    }
    params
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const PROFILE: Embed = Embed {
    alias: "profile",
    table: Table::Profiles,
    local_key: "user_id",
    foreign_key: "user_id",
    inner: true,
    columns: Columns::Only(&["full_name"]),
    nested: &[],
  };

  const STUDENT: Embed = Embed {
    alias: "student",
    table: Table::Students,
    local_key: "student_id",
    foreign_key: "id",
    inner: true,
    columns: Columns::Only(&["student_id"]),
    nested: &[PROFILE],
  };

  const SUBJECT: Embed = Embed {
    alias: "subject",
    table: Table::Subjects,
    local_key: "subject_id",
    foreign_key: "id",
    inner: false,
    columns: Columns::All,
    nested: &[],
  };

  #[test]
  fn test_render_select_plain() {
    assert_eq!(render_select(&[]), "*");
    assert_eq!(render_select(&[SUBJECT]), "*,subject:subjects(*)");
  }

  #[test]
  fn test_render_select_nested_inner() {
    assert_eq!(
      render_select(&[STUDENT]),
      "*,student:students!inner(student_id,profile:profiles!inner(full_name))"
    );
  }

  #[test]
  fn test_write_select_drops_inner_joins() {
    assert_eq!(
      render_write_select(&[STUDENT]),
      "*,student:students(student_id,profile:profiles(full_name))"
    );
  }

  #[test]
  fn test_inner_embed_presence() {
    let joined = serde_json::json!({ "student": { "student_id": "ST-1", "profile": { "full_name": "Ada" } } });
    let no_profile = serde_json::json!({ "student": { "student_id": "ST-1", "profile": null } });
    let no_student = serde_json::json!({ "student": null });

    assert!(STUDENT.present_in(&joined));
    assert!(!STUDENT.present_in(&no_profile));
    assert!(!STUDENT.present_in(&no_student));
    assert!(SUBJECT.present_in(&serde_json::json!({ "subject": null })));
  }

  #[test]
  fn test_order_compare() {
    let older = serde_json::json!("2025-09-10");
    let newer = serde_json::json!("2025-09-25");
    assert_eq!(
      Order::desc("date").compare(Some(&newer), Some(&older)),
      Ordering::Less
    );
    assert_eq!(
      Order::asc("date").compare(Some(&newer), Some(&older)),
      Ordering::Greater
    );
    assert_eq!(
      Order::asc("max_grade").compare(
        Some(&serde_json::json!(9)),
        Some(&serde_json::json!(10.5))
      ),
      Ordering::Less
    );
    assert_eq!(
      Order::asc("date").compare(Some(&serde_json::Value::Null), Some(&older)),
      Ordering::Less
    );
  }

  #[test]
  fn test_params_include_filters_and_order() {
    let query = ReadQuery::new(Table::Attendance)
      .filter(Filter::eq("class_id", "c1"))
      .filter(Filter::eq("date", "2025-09-19"))
      .order(Order::desc("date"));

    assert_eq!(
      query.to_params(),
      vec![
        ("select".to_string(), "*".to_string()),
        ("class_id".to_string(), "eq.c1".to_string()),
        ("date".to_string(), "eq.2025-09-19".to_string()),
        ("order".to_string(), "date.desc".to_string()),
      ]
    );
  }

  #[test]
  fn test_filter_matches_strings_and_numbers() {
    let row = serde_json::json!({ "class_id": "c1", "max_students": 30 });
    assert!(Filter::eq("class_id", "c1").matches(&row));
    assert!(!Filter::eq("class_id", "c2").matches(&row));
    assert!(Filter::eq("max_students", "30").matches(&row));
    assert!(!Filter::eq("missing", "x").matches(&row));
  }
}
