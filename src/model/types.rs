//! Domain types mirroring the rows of the remote class-management schema.
//!
//! Every struct here is a non-authoritative copy of a remote row. Joined
//! sub-objects (`subject`, `profile`, `class`, ...) are only present when the
//! read or write that produced the row asked for them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Status enums
// ============================================================================

/// Publication state shared by classes and assignments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
  #[default]
  Active,
  Draft,
  Archived,
}

impl PublishStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Draft => "draft",
      Self::Archived => "archived",
    }
  }
}

impl FromStr for PublishStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "active" => Ok(Self::Active),
      "draft" => Ok(Self::Draft),
      "archived" => Ok(Self::Archived),
      other => Err(format!(
        "unknown status '{}' (expected active, draft or archived)",
        other
      )),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
  #[default]
  Active,
  Inactive,
  Graduated,
}

impl StudentStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Inactive => "inactive",
      Self::Graduated => "graduated",
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentType {
  #[default]
  Homework,
  Quiz,
  Exam,
  Project,
}

impl AssignmentType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Homework => "homework",
      Self::Quiz => "quiz",
      Self::Exam => "exam",
      Self::Project => "project",
    }
  }
}

impl FromStr for AssignmentType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "homework" | "hw" => Ok(Self::Homework),
      "quiz" => Ok(Self::Quiz),
      "exam" => Ok(Self::Exam),
      "project" => Ok(Self::Project),
      other => Err(format!(
        "unknown assignment type '{}' (expected homework, quiz, exam or project)",
        other
      )),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
  Present,
  Absent,
  Late,
  Excused,
}

impl AttendanceStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Present => "present",
      Self::Absent => "absent",
      Self::Late => "late",
      Self::Excused => "excused",
    }
  }
}

impl FromStr for AttendanceStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "present" | "p" => Ok(Self::Present),
      "absent" | "a" => Ok(Self::Absent),
      "late" | "l" => Ok(Self::Late),
      "excused" | "e" => Ok(Self::Excused),
      other => Err(format!(
        "unknown attendance status '{}' (expected present, absent, late or excused)",
        other
      )),
    }
  }
}

impl fmt::Display for AttendanceStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ============================================================================
// Joined summaries
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
  #[serde(default)]
  pub full_name: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
  pub name: String,
  pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentSummary {
  pub title: String,
  pub max_grade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSummary {
  /// Student code, not the row id
  pub student_id: String,
  #[serde(default)]
  pub profile: Option<ProfileSummary>,
}

impl StudentSummary {
  pub fn display_name(&self) -> &str {
    self
      .profile
      .as_ref()
      .and_then(|p| p.full_name.as_deref())
      .unwrap_or("Unknown")
  }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
  pub id: String,
  pub name: String,
  pub code: String,
  pub created_at: DateTime<Utc>,
}

/// A class section owned by a teacher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSection {
  pub id: String,
  pub name: String,
  pub code: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub subject_id: Option<String>,
  pub teacher_id: String,
  #[serde(default)]
  pub semester: Option<String>,
  #[serde(default)]
  pub academic_year: Option<String>,
  /// Free-form schedule descriptor, owned by the remote schema
  #[serde(default)]
  pub schedule: Option<serde_json::Value>,
  pub max_students: u32,
  #[serde(default)]
  pub status: PublishStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subject: Option<Subject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
  pub id: String,
  pub user_id: String,
  /// Student code
  pub student_id: String,
  pub enrollment_date: NaiveDate,
  #[serde(default)]
  pub status: StudentStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub profile: Option<ProfileSummary>,
}

impl Student {
  pub fn display_name(&self) -> &str {
    self
      .profile
      .as_ref()
      .and_then(|p| p.full_name.as_deref())
      .unwrap_or(&self.student_id)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
  pub id: String,
  pub class_id: String,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub due_date: Option<DateTime<Utc>>,
  pub max_grade: f64,
  #[serde(default)]
  pub assignment_type: AssignmentType,
  #[serde(default)]
  pub status: PublishStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub class: Option<ClassSummary>,
}

/// Whether a grade row has been scored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeState {
  Pending,
  Graded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
  pub id: String,
  pub assignment_id: String,
  pub student_id: String,
  /// Unset means ungraded; zero is a real score
  #[serde(default)]
  pub grade: Option<f64>,
  #[serde(default)]
  pub feedback: Option<String>,
  #[serde(default)]
  pub submitted_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub graded_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub graded_by: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assignment: Option<AssignmentSummary>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub student: Option<StudentSummary>,
}

impl Grade {
  pub fn state(&self) -> GradeState {
    match self.grade {
      Some(_) => GradeState::Graded,
      None => GradeState::Pending,
    }
  }

  /// Maximum achievable grade from the joined assignment, 100 when unknown.
  pub fn max_grade(&self) -> f64 {
    self.assignment.as_ref().map(|a| a.max_grade).unwrap_or(100.0)
  }

  pub fn percentage(&self) -> Option<f64> {
    let max = self.max_grade();
    self
      .grade
      .filter(|_| max > 0.0)
      .map(|g| g / max * 100.0)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
  pub id: String,
  pub class_id: String,
  pub student_id: String,
  pub date: NaiveDate,
  pub status: AttendanceStatus,
  #[serde(default)]
  pub notes: Option<String>,
  #[serde(default)]
  pub marked_by: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub class: Option<ClassSummary>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub student: Option<StudentSummary>,
}

// ============================================================================
// Partial rows for writes
// ============================================================================
//
// Absent fields are not sent, so the same struct serves inserts and updates.

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassChanges {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub code: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub subject_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub teacher_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub semester: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub academic_year: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub schedule: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_students: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<PublishStatus>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AssignmentChanges {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub class_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_grade: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assignment_type: Option<AssignmentType>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<PublishStatus>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GradeChanges {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assignment_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub student_id: Option<String>,
  /// `Some(None)` clears the score back to pending
  #[serde(skip_serializing_if = "Option::is_none")]
  pub grade: Option<Option<f64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub feedback: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub graded_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub graded_by: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AttendanceChanges {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub class_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub student_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date: Option<NaiveDate>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<AttendanceStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub marked_by: Option<String>,
}
