//! Command-line surface.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::model::{AssignmentType, AttendanceStatus, PublishStatus};
use crate::session::Role;

#[derive(Parser, Debug)]
#[command(name = "classbook")]
#[command(about = "Classes, grades and attendance from the terminal")]
#[command(version)]
pub struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/classbook/config.yaml)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Sign in with email and password
  Login {
    email: String,
    /// Read from stdin when omitted
    #[arg(long, env = "CLASSBOOK_PASSWORD", hide_env_values = true)]
    password: Option<String>,
  },
  /// Create an account
  Signup {
    email: String,
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "student")]
    role: Role,
    #[arg(long, env = "CLASSBOOK_PASSWORD", hide_env_values = true)]
    password: Option<String>,
  },
  /// Sign out and forget the stored session
  Logout,
  /// Show the signed-in user
  Whoami {
    /// Reload profile and role from the service
    #[arg(long)]
    refresh: bool,
  },
  /// List classes, students, assignments, grades, attendance or subjects
  List {
    entity: String,
    #[arg(long)]
    class: Option<String>,
    #[arg(long)]
    assignment: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    date: Option<NaiveDate>,
  },
  Class {
    #[command(subcommand)]
    action: ClassAction,
  },
  Assignment {
    #[command(subcommand)]
    action: AssignmentAction,
  },
  Grade {
    #[command(subcommand)]
    action: GradeAction,
  },
  Attendance {
    #[command(subcommand)]
    action: AttendanceAction,
  },
  Stats {
    #[command(subcommand)]
    action: StatsAction,
  },
}

#[derive(clap::Args, Debug, Default)]
pub struct ClassFields {
  #[arg(long)]
  pub description: Option<String>,
  /// Subject id
  #[arg(long)]
  pub subject: Option<String>,
  #[arg(long)]
  pub semester: Option<String>,
  #[arg(long)]
  pub academic_year: Option<String>,
  #[arg(long)]
  pub max_students: Option<u32>,
  #[arg(long)]
  pub status: Option<PublishStatus>,
}

#[derive(Subcommand, Debug)]
pub enum ClassAction {
  /// Create a class taught by the signed-in user
  Add {
    name: String,
    code: String,
    #[command(flatten)]
    fields: ClassFields,
  },
  Edit {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    code: Option<String>,
    #[command(flatten)]
    fields: ClassFields,
  },
  Rm {
    id: String,
  },
}

#[derive(clap::Args, Debug, Default)]
pub struct AssignmentFields {
  #[arg(long)]
  pub description: Option<String>,
  /// RFC 3339 timestamp, e.g. 2025-10-01T23:59:00Z
  #[arg(long)]
  pub due: Option<DateTime<Utc>>,
  #[arg(long)]
  pub max_grade: Option<f64>,
  #[arg(long = "type")]
  pub assignment_type: Option<AssignmentType>,
  #[arg(long)]
  pub status: Option<PublishStatus>,
}

#[derive(Subcommand, Debug)]
pub enum AssignmentAction {
  Add {
    #[arg(long)]
    class: String,
    title: String,
    #[command(flatten)]
    fields: AssignmentFields,
  },
  Edit {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[command(flatten)]
    fields: AssignmentFields,
  },
  Rm {
    id: String,
  },
}

#[derive(Subcommand, Debug)]
pub enum GradeAction {
  /// Record a grade row, scored or pending
  Add {
    #[arg(long)]
    assignment: String,
    #[arg(long)]
    student: String,
    #[arg(long)]
    grade: Option<f64>,
    #[arg(long)]
    feedback: Option<String>,
  },
  /// Score an existing grade row
  Set {
    id: String,
    grade: f64,
    #[arg(long)]
    feedback: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
pub enum AttendanceAction {
  /// Mark one student, replacing any mark for the same day
  Mark {
    #[arg(long)]
    class: String,
    #[arg(long)]
    student: String,
    #[arg(long)]
    date: NaiveDate,
    status: AttendanceStatus,
    #[arg(long)]
    notes: Option<String>,
  },
  Edit {
    id: String,
    #[arg(long)]
    status: Option<AttendanceStatus>,
    #[arg(long)]
    notes: Option<String>,
  },
  /// Mark every student at once; unlisted students are absent
  Roll {
    #[arg(long)]
    class: String,
    #[arg(long)]
    date: NaiveDate,
    /// STUDENT_ID=STATUS, repeatable
    #[arg(long = "mark", value_parser = parse_mark)]
    marks: Vec<(String, AttendanceStatus)>,
  },
}

#[derive(Subcommand, Debug)]
pub enum StatsAction {
  Grades {
    #[arg(long)]
    assignment: Option<String>,
  },
  Attendance {
    #[arg(long)]
    class: String,
    #[arg(long)]
    date: NaiveDate,
  },
}

fn parse_mark(input: &str) -> Result<(String, AttendanceStatus), String> {
  let (student, status) = input
    .split_once('=')
    .ok_or_else(|| format!("expected STUDENT_ID=STATUS, got '{}'", input))?;
  let student = student.trim();
  if student.is_empty() {
    return Err(format!("missing student id in '{}'", input));
  }
  Ok((student.to_string(), status.parse()?))
}
