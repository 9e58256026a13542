//! Derived figures over cached rows: grade statistics and bands, attendance
//! rates and roll-call sheets.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;

use crate::model::{AttendanceChanges, AttendanceStatus, Grade, Student};

// ============================================================================
// Grades
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeStats {
  pub total: usize,
  pub graded: usize,
  pub pending: usize,
  /// Mean of the graded values, 0 when nothing is graded
  pub average: f64,
}

impl GradeStats {
  pub fn from_grades<'a>(grades: impl IntoIterator<Item = &'a Grade>) -> Self {
    let mut total = 0;
    let mut graded = 0;
    let mut sum = 0.0;
    for grade in grades {
      total += 1;
      if let Some(value) = grade.grade {
        graded += 1;
        sum += value;
      }
    }

    Self {
      total,
      graded,
      pending: total - graded,
      average: if graded == 0 { 0.0 } else { sum / graded as f64 },
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeBand {
  Excellent,
  Good,
  Fair,
  NeedsAttention,
  Ungraded,
}

impl GradeBand {
  /// Band for a score out of `max_grade`. Zero is a score, not ungraded.
  pub fn classify(grade: Option<f64>, max_grade: f64) -> Self {
    let Some(grade) = grade else {
      return Self::Ungraded;
    };
    let percentage = if max_grade > 0.0 {
      grade / max_grade * 100.0
    } else {
      0.0
    };

    match percentage {
      p if p >= 90.0 => Self::Excellent,
      p if p >= 80.0 => Self::Good,
      p if p >= 70.0 => Self::Fair,
      _ => Self::NeedsAttention,
    }
  }

  pub fn of(grade: &Grade) -> Self {
    Self::classify(grade.grade, grade.max_grade())
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Excellent => "excellent",
      Self::Good => "good",
      Self::Fair => "fair",
      Self::NeedsAttention => "needs attention",
      Self::Ungraded => "ungraded",
    }
  }
}

impl fmt::Display for GradeBand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ============================================================================
// Attendance
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttendanceStats {
  pub total_students: usize,
  pub present: usize,
  pub absent: usize,
  pub late: usize,
  pub excused: usize,
  /// Present students as a whole percentage of the class
  pub rate: u32,
}

impl AttendanceStats {
  pub fn from_marks(
    total_students: usize,
    marks: impl IntoIterator<Item = AttendanceStatus>,
  ) -> Self {
    let mut stats = Self {
      total_students,
      ..Default::default()
    };
    for status in marks {
      match status {
        AttendanceStatus::Present => stats.present += 1,
        AttendanceStatus::Absent => stats.absent += 1,
        AttendanceStatus::Late => stats.late += 1,
        AttendanceStatus::Excused => stats.excused += 1,
      }
    }
    if total_students > 0 {
      stats.rate = (stats.present as f64 / total_students as f64 * 100.0).round() as u32;
    }
    stats
  }
}

/// One attendance row per student for a class session. Students missing
/// from `marks` (keyed by student row id) are recorded absent.
pub fn roll_call(
  class_id: &str,
  date: NaiveDate,
  students: &[Student],
  marks: &HashMap<String, AttendanceStatus>,
  marked_by: Option<&str>,
) -> Vec<AttendanceChanges> {
  students
    .iter()
    .map(|student| AttendanceChanges {
      class_id: Some(class_id.to_string()),
      student_id: Some(student.id.clone()),
      date: Some(date),
      status: Some(
        marks
          .get(&student.id)
          .copied()
          .unwrap_or(AttendanceStatus::Absent),
      ),
      notes: None,
      marked_by: marked_by.map(String::from),
    })
    .collect()
}
