//! `Entity` implementations for the domain rows.

use crate::model::{Assignment, AttendanceRecord, ClassSection, Grade, Student, Subject};
use crate::remote::{Columns, Embed, Order, Table};

use super::layer::StoreState;
use super::slot::Slot;
use super::traits::Entity;

// ============================================================================
// Embeds
// ============================================================================

const SUBJECT: Embed = Embed {
  alias: "subject",
  table: Table::Subjects,
  local_key: "subject_id",
  foreign_key: "id",
  inner: false,
  columns: Columns::All,
  nested: &[],
};

const PROFILE: Embed = Embed {
  alias: "profile",
  table: Table::Profiles,
  local_key: "user_id",
  foreign_key: "user_id",
  inner: true,
  columns: Columns::Only(&["full_name", "email"]),
  nested: &[],
};

const PROFILE_NAME: Embed = Embed {
  columns: Columns::Only(&["full_name"]),
  ..PROFILE
};

const CLASS_SUMMARY: Embed = Embed {
  alias: "class",
  table: Table::Classes,
  local_key: "class_id",
  foreign_key: "id",
  inner: false,
  columns: Columns::Only(&["name", "code"]),
  nested: &[],
};

const STUDENT_SUMMARY: Embed = Embed {
  alias: "student",
  table: Table::Students,
  local_key: "student_id",
  foreign_key: "id",
  inner: true,
  columns: Columns::Only(&["student_id"]),
  nested: &[PROFILE_NAME],
};

const ASSIGNMENT_SUMMARY: Embed = Embed {
  alias: "assignment",
  table: Table::Assignments,
  local_key: "assignment_id",
  foreign_key: "id",
  inner: true,
  columns: Columns::Only(&["title", "max_grade"]),
  nested: &[],
};

/// Natural key of an attendance record
pub const ATTENDANCE_KEY: &[&str] = &["class_id", "student_id", "date"];

// ============================================================================
// Entity implementations
// ============================================================================

impl Entity for Subject {
  const TABLE: Table = Table::Subjects;
  const EMBEDS: &'static [Embed] = &[];
  const ORDER: Order = Order::asc("name");

  fn id(&self) -> &str {
    &self.id
  }

  fn slot(state: &StoreState) -> &Slot<Self> {
    &state.subjects
  }
}

impl Entity for ClassSection {
  const TABLE: Table = Table::Classes;
  const EMBEDS: &'static [Embed] = &[SUBJECT];
  const ORDER: Order = Order::desc("created_at");

  fn id(&self) -> &str {
    &self.id
  }

  fn slot(state: &StoreState) -> &Slot<Self> {
    &state.classes
  }
}

impl Entity for Student {
  const TABLE: Table = Table::Students;
  const EMBEDS: &'static [Embed] = &[PROFILE];
  const ORDER: Order = Order::desc("created_at");

  fn id(&self) -> &str {
    &self.id
  }

  fn slot(state: &StoreState) -> &Slot<Self> {
    &state.students
  }
}

impl Entity for Assignment {
  const TABLE: Table = Table::Assignments;
  const EMBEDS: &'static [Embed] = &[CLASS_SUMMARY];
  const ORDER: Order = Order::desc("created_at");

  fn id(&self) -> &str {
    &self.id
  }

  fn slot(state: &StoreState) -> &Slot<Self> {
    &state.assignments
  }
}

impl Entity for Grade {
  const TABLE: Table = Table::Grades;
  const EMBEDS: &'static [Embed] = &[ASSIGNMENT_SUMMARY, STUDENT_SUMMARY];
  const ORDER: Order = Order::desc("created_at");

  fn id(&self) -> &str {
    &self.id
  }

  fn slot(state: &StoreState) -> &Slot<Self> {
    &state.grades
  }
}

impl Entity for AttendanceRecord {
  const TABLE: Table = Table::Attendance;
  const EMBEDS: &'static [Embed] = &[
    Embed {
      inner: true,
      ..CLASS_SUMMARY
    },
    STUDENT_SUMMARY,
  ];
  const ORDER: Order = Order::desc("date");

  fn id(&self) -> &str {
    &self.id
  }

  fn slot(state: &StoreState) -> &Slot<Self> {
    &state.attendance
  }
}
