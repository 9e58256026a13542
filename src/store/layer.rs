//! Data store that mirrors remote rows and routes every read and write.

use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Report, Result};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::{StoreEvent, WriteOp};
use crate::model::{
  Assignment, AssignmentChanges, AttendanceChanges, AttendanceRecord, ClassChanges, ClassSection,
  Grade, GradeChanges, Student, Subject,
};
use crate::remote::api_types::{decode_row, decode_rows, encode_changes};
use crate::remote::{Filter, ReadQuery, RemoteService, Table};

use super::entities::ATTENDANCE_KEY;
use super::slot::{sort_key, Slot};
use super::traits::{Entity, WriteSync};

/// One slot per mirrored entity type.
#[derive(Default)]
pub struct StoreState {
  pub(super) subjects: Slot<Subject>,
  pub(super) classes: Slot<ClassSection>,
  pub(super) students: Slot<Student>,
  pub(super) assignments: Slot<Assignment>,
  pub(super) grades: Slot<Grade>,
  pub(super) attendance: Slot<AttendanceRecord>,
}

/// Result of a batch of attendance upserts
#[derive(Debug, Default)]
pub struct BatchOutcome {
  pub written: Vec<AttendanceRecord>,
  /// Student id (when known) and the error for each failed upsert
  pub failed: Vec<(Option<String>, Report)>,
}

impl BatchOutcome {
  pub fn is_complete(&self) -> bool {
    self.failed.is_empty()
  }
}

/// Process-local mirror of the remote rows.
///
/// Clones share the same cached state. Reads replace a whole slot; writes go
/// to the remote service and then update the slot according to `WriteSync`.
/// Every operation reports its outcome to the caller and, when configured,
/// on the event channel.
pub struct DataStore<R: RemoteService> {
  remote: Arc<R>,
  state: Arc<StoreState>,
  sync: WriteSync,
  events: Option<mpsc::UnboundedSender<StoreEvent>>,
}

impl<R: RemoteService> DataStore<R> {
  #[cfg(test)]
  pub fn new(remote: R) -> Self {
    Self::from_shared(Arc::new(remote))
  }

  /// Create a store over a remote service shared with other components.
  pub fn from_shared(remote: Arc<R>) -> Self {
    Self {
      remote,
      state: Arc::new(StoreState::default()),
      sync: WriteSync::default(),
      events: None,
    }
  }

  pub fn with_sync(mut self, sync: WriteSync) -> Self {
    self.sync = sync;
    self
  }

  pub fn with_events(mut self, events: mpsc::UnboundedSender<StoreEvent>) -> Self {
    self.events = Some(events);
    self
  }

  pub fn sync(&self) -> WriteSync {
    self.sync
  }

  fn emit(&self, event: StoreEvent) {
    if let Some(tx) = &self.events {
      // Receiver may have been dropped
      let _ = tx.send(event);
    }
  }

  // ==========================================================================
  // Readers
  // ==========================================================================

  pub fn subjects(&self) -> Vec<Subject> {
    self.state.subjects.snapshot()
  }

  pub fn classes(&self) -> Vec<ClassSection> {
    self.state.classes.snapshot()
  }

  pub fn students(&self) -> Vec<Student> {
    self.state.students.snapshot()
  }

  pub fn assignments(&self) -> Vec<Assignment> {
    self.state.assignments.snapshot()
  }

  pub fn grades(&self) -> Vec<Grade> {
    self.state.grades.snapshot()
  }

  pub fn attendance(&self) -> Vec<AttendanceRecord> {
    self.state.attendance.snapshot()
  }

  /// Loading flag for a mirrored table; always false for other tables.
  pub fn is_loading(&self, table: Table) -> bool {
    match table {
      Table::Subjects => self.state.subjects.is_loading(),
      Table::Classes => self.state.classes.is_loading(),
      Table::Students => self.state.students.is_loading(),
      Table::Assignments => self.state.assignments.is_loading(),
      Table::Grades => self.state.grades.is_loading(),
      Table::Attendance => self.state.attendance.is_loading(),
      Table::Profiles | Table::UserRoles => false,
    }
  }

  // ==========================================================================
  // Fetches
  // ==========================================================================

  pub async fn fetch_subjects(&self) -> Result<usize> {
    self.fetch::<Subject>(Vec::new()).await
  }

  pub async fn fetch_classes(&self) -> Result<usize> {
    self.fetch::<ClassSection>(Vec::new()).await
  }

  pub async fn fetch_students(&self) -> Result<usize> {
    self.fetch::<Student>(Vec::new()).await
  }

  pub async fn fetch_assignments(&self, class_id: Option<&str>) -> Result<usize> {
    let filters = class_id.map(|id| Filter::eq("class_id", id));
    self.fetch::<Assignment>(filters.into_iter().collect()).await
  }

  pub async fn fetch_grades(&self, assignment_id: Option<&str>) -> Result<usize> {
    let filters = assignment_id.map(|id| Filter::eq("assignment_id", id));
    self.fetch::<Grade>(filters.into_iter().collect()).await
  }

  pub async fn fetch_attendance(
    &self,
    class_id: Option<&str>,
    date: Option<NaiveDate>,
  ) -> Result<usize> {
    let mut filters = Vec::new();
    if let Some(id) = class_id {
      filters.push(Filter::eq("class_id", id));
    }
    if let Some(date) = date {
      filters.push(Filter::eq("date", date.format("%Y-%m-%d").to_string()));
    }
    self.fetch::<AttendanceRecord>(filters).await
  }

  /// Replace the slot for `T` with a fresh read.
  ///
  /// The loading flag is set for the duration of the call and cleared on
  /// every exit path. On failure the cached rows are left untouched.
  /// Overlapping fetches of one table are not serialized: the response that
  /// arrives last wins.
  pub async fn fetch<T: Entity>(&self, filters: Vec<Filter>) -> Result<usize> {
    let slot = T::slot(&self.state);
    let loading = slot.begin_load();
    self.emit(StoreEvent::Loading(T::TABLE));

    let query = ReadQuery::new(T::TABLE)
      .embeds(T::EMBEDS)
      .filters(filters.clone())
      .order(T::ORDER);
    let result = match self.remote.select(&query).await {
      Ok(rows) => {
        let keys: Vec<Value> = rows.iter().map(sort_key::<T>).collect();
        decode_rows::<T>(rows).map(|rows| rows.into_iter().zip(keys).collect::<Vec<_>>())
      }
      Err(e) => Err(e),
    };

    match result {
      Ok(rows) => {
        let count = rows.len();
        slot.replace(rows, filters);
        drop(loading);
        debug!(table = %T::TABLE, rows = count, "fetched");
        self.emit(StoreEvent::Loaded {
          table: T::TABLE,
          rows: count,
        });
        Ok(count)
      }
      Err(e) => {
        drop(loading);
        warn!(table = %T::TABLE, error = %e, "fetch failed, keeping cached rows");
        self.emit(StoreEvent::FetchFailed {
          table: T::TABLE,
          message: e.to_string(),
        });
        Err(e)
      }
    }
  }

  // ==========================================================================
  // Writes
  // ==========================================================================

  pub async fn create_class(&self, changes: &ClassChanges) -> Result<ClassSection> {
    self.create(changes).await
  }

  pub async fn update_class(&self, id: &str, changes: &ClassChanges) -> Result<ClassSection> {
    self.update(id, changes).await
  }

  pub async fn delete_class(&self, id: &str) -> Result<()> {
    self.delete::<ClassSection>(id).await
  }

  pub async fn create_assignment(&self, changes: &AssignmentChanges) -> Result<Assignment> {
    self.create(changes).await
  }

  pub async fn update_assignment(
    &self,
    id: &str,
    changes: &AssignmentChanges,
  ) -> Result<Assignment> {
    self.update(id, changes).await
  }

  pub async fn delete_assignment(&self, id: &str) -> Result<()> {
    self.delete::<Assignment>(id).await
  }

  pub async fn create_grade(&self, changes: &GradeChanges) -> Result<Grade> {
    self.create(changes).await
  }

  pub async fn update_grade(&self, id: &str, changes: &GradeChanges) -> Result<Grade> {
    self.update(id, changes).await
  }

  /// Upsert an attendance record on its (class, student, date) key.
  pub async fn mark_attendance(&self, changes: &AttendanceChanges) -> Result<AttendanceRecord> {
    let outcome = match (&changes.class_id, &changes.student_id, &changes.date) {
      (Some(_), Some(_), Some(_)) => match encode_changes(changes) {
        Ok(row) => {
          self
            .remote
            .upsert(
              Table::Attendance,
              row,
              ATTENDANCE_KEY,
              AttendanceRecord::EMBEDS,
            )
            .await
        }
        Err(e) => Err(e),
      },
      _ => Err(eyre!(
        "Attendance needs a class, a student and a date to be marked"
      )),
    };
    self.finish_write(WriteOp::Upsert, outcome)
  }

  pub async fn update_attendance(
    &self,
    id: &str,
    changes: &AttendanceChanges,
  ) -> Result<AttendanceRecord> {
    self.update(id, changes).await
  }

  /// Mark a whole sheet of attendance concurrently.
  ///
  /// Each record is an independent upsert: some may land while others fail,
  /// and nothing is rolled back.
  pub async fn mark_attendance_batch(&self, sheet: Vec<AttendanceChanges>) -> BatchOutcome {
    let results = join_all(sheet.iter().map(|changes| self.mark_attendance(changes))).await;

    let mut outcome = BatchOutcome::default();
    for (changes, result) in sheet.into_iter().zip(results) {
      match result {
        Ok(record) => outcome.written.push(record),
        Err(e) => outcome.failed.push((changes.student_id, e)),
      }
    }
    if !outcome.is_complete() {
      warn!(
        written = outcome.written.len(),
        failed = outcome.failed.len(),
        "attendance batch partially failed"
      );
    }
    outcome
  }

  pub async fn create<T: Entity>(&self, changes: &impl Serialize) -> Result<T> {
    let outcome = match encode_changes(changes) {
      Ok(row) => self.remote.insert(T::TABLE, row, T::EMBEDS).await,
      Err(e) => Err(e),
    };
    self.finish_write(WriteOp::Create, outcome)
  }

  pub async fn update<T: Entity>(&self, id: &str, changes: &impl Serialize) -> Result<T> {
    let outcome = match encode_changes(changes) {
      Ok(row) => self.remote.update(T::TABLE, id, row, T::EMBEDS).await,
      Err(e) => Err(e),
    };
    self.finish_write(WriteOp::Update, outcome)
  }

  pub async fn delete<T: Entity>(&self, id: &str) -> Result<()> {
    match self.remote.delete(T::TABLE, id).await {
      Ok(()) => {
        match self.sync {
          WriteSync::Merge => T::slot(&self.state).remove(id),
          WriteSync::Resync => self.spawn_resync::<T>(),
        }
        debug!(table = %T::TABLE, id, "deleted");
        self.emit(StoreEvent::Written {
          table: T::TABLE,
          op: WriteOp::Delete,
          id: id.to_string(),
        });
        Ok(())
      }
      Err(e) => Err(self.write_failed::<T>(WriteOp::Delete, e)),
    }
  }

  fn finish_write<T: Entity>(&self, op: WriteOp, outcome: Result<Value>) -> Result<T> {
    let decoded = outcome.and_then(|json| decode_row::<T>(json.clone()).map(|row| (row, json)));

    match decoded {
      Ok((row, json)) => {
        match self.sync {
          WriteSync::Merge => T::slot(&self.state).merge(row.clone(), &json),
          WriteSync::Resync => self.spawn_resync::<T>(),
        }
        debug!(table = %T::TABLE, id = row.id(), ?op, "written");
        self.emit(StoreEvent::Written {
          table: T::TABLE,
          op,
          id: row.id().to_string(),
        });
        Ok(row)
      }
      Err(e) => Err(self.write_failed::<T>(op, e)),
    }
  }

  fn write_failed<T: Entity>(&self, op: WriteOp, error: Report) -> Report {
    warn!(table = %T::TABLE, ?op, error = %error, "write failed");
    self.emit(StoreEvent::WriteFailed {
      table: T::TABLE,
      op,
      message: error.to_string(),
    });
    error
  }

  /// Refetch the whole table in the background. The caller does not wait.
  fn spawn_resync<T: Entity>(&self) {
    let store = self.clone();
    tokio::spawn(async move {
      // Failures are logged and published by fetch
      let _ = store.fetch::<T>(Vec::new()).await;
    });
  }
}

impl<R: RemoteService> Clone for DataStore<R> {
  fn clone(&self) -> Self {
    Self {
      remote: Arc::clone(&self.remote),
      state: Arc::clone(&self.state),
      sync: self.sync,
      events: self.events.clone(),
    }
  }
}
