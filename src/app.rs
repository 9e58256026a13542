use chrono::{NaiveDate, Utc};
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::cli::{
  AssignmentAction, AssignmentFields, AttendanceAction, ClassAction, ClassFields, Command,
  GradeAction, StatsAction,
};
use crate::commands;
use crate::config::Config;
use crate::event::{EventHandler, StoreEvent};
use crate::model::{
  Assignment, AssignmentChanges, AttendanceChanges, AttendanceRecord, AttendanceStatus,
  ClassChanges, ClassSection, Grade, GradeChanges, GradeState, Student, Subject,
};
use crate::remote::{AccessToken, RestClient, Table};
use crate::session::{
  AuthEvent, IdentityProvider, NoopSessionStorage, RestIdentity, SessionCache, SessionStorage,
  SessionWatcher, SqliteSessionStorage, User,
};
use crate::store::{DataStore, WriteSync};
use crate::summary::{roll_call, AttendanceStats, GradeBand, GradeStats};

type Storage = Box<dyn SessionStorage>;

/// Main application state
pub struct App {
  /// Mirror of the remote rows
  store: DataStore<RestClient>,

  /// Store notifications, used to wait for background resyncs
  events: EventHandler,

  /// Signed-in user, restored from the last run
  session: Arc<SessionCache<Storage>>,

  identity: RestIdentity,

  /// Sign-in state changes published by `identity`
  auth_events: mpsc::UnboundedReceiver<AuthEvent>,

  watcher: SessionWatcher<RestClient, Storage>,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let storage: Storage = if config.session.persist {
      Box::new(SqliteSessionStorage::open(
        config.session.path.as_deref(),
        &config.service.url,
      )?)
    } else {
      Box::new(NoopSessionStorage)
    };
    let session = Arc::new(SessionCache::restore(storage));

    let token = AccessToken::default();
    token.set(session.access_token());

    let remote = Arc::new(RestClient::new(config, token.clone())?);
    let events = EventHandler::new();
    let store = DataStore::from_shared(Arc::clone(&remote))
      .with_sync(config.sync.after_write)
      .with_events(events.sender());

    let (auth_tx, auth_events) = mpsc::unbounded_channel();
    let identity = RestIdentity::new(config, token, auth_tx)?;
    let watcher = SessionWatcher::new(remote, Arc::clone(&session));

    Ok(Self {
      store,
      events,
      session,
      identity,
      auth_events,
      watcher,
    })
  }

  pub async fn run(&mut self, command: Command) -> Result<()> {
    match command {
      Command::Login { email, password } => self.login(&email, password).await,
      Command::Signup {
        email,
        name,
        role,
        password,
      } => {
        let password = resolve_password(password).await?;
        self
          .identity
          .sign_up(&email, &password, &name, role)
          .await?;
        println!(
          "Account created for {}. Confirm the email address, then run `classbook login`.",
          email
        );
        Ok(())
      }
      Command::Logout => self.logout().await,
      Command::Whoami { refresh } => self.whoami(refresh).await,
      Command::List {
        entity,
        class,
        assignment,
        date,
      } => {
        self
          .list(&entity, class.as_deref(), assignment.as_deref(), date)
          .await
      }
      Command::Class { action } => self.class(action).await,
      Command::Assignment { action } => self.assignment(action).await,
      Command::Grade { action } => self.grade(action).await,
      Command::Attendance { action } => self.attendance(action).await,
      Command::Stats { action } => self.stats(action).await,
    }
  }

  // ==========================================================================
  // Session
  // ==========================================================================

  async fn login(&mut self, email: &str, password: Option<String>) -> Result<()> {
    let password = resolve_password(password).await?;
    self.identity.sign_in(email, &password).await?;
    self.apply_auth_events().await?;

    match self.session.current() {
      Some(user) => {
        println!("Signed in as {} ({})", user.name, user.role);
        Ok(())
      }
      None => Err(eyre!(
        "Signed in, but no profile exists for {}. Ask an administrator to create one.",
        email
      )),
    }
  }

  async fn logout(&mut self) -> Result<()> {
    if let Err(e) = self.identity.sign_out().await {
      warn!(error = %e, "remote sign-out failed, clearing local session");
      self.session.logout()?;
    }
    self.apply_auth_events().await?;
    println!("Signed out");
    Ok(())
  }

  async fn whoami(&mut self, refresh: bool) -> Result<()> {
    if !self.session.is_authenticated() {
      println!("Not signed in");
      return Ok(());
    }

    let user = if refresh {
      self.watcher.refresh().await?
    } else {
      self.session.current()
    };
    if let Some(user) = user {
      println!("{} <{}> {} [{}]", user.name, user.email, user.role, user.id);
    }
    Ok(())
  }

  /// Let the watcher apply whatever the identity provider just announced.
  async fn apply_auth_events(&mut self) -> Result<()> {
    while let Ok(event) = self.auth_events.try_recv() {
      self.watcher.handle(event).await?;
    }
    Ok(())
  }

  fn require_user(&self) -> Result<User> {
    self
      .session
      .current()
      .ok_or_else(|| eyre!("Not signed in. Run `classbook login <email>` first."))
  }

  // ==========================================================================
  // Listing
  // ==========================================================================

  async fn list(
    &mut self,
    entity: &str,
    class: Option<&str>,
    assignment: Option<&str>,
    date: Option<NaiveDate>,
  ) -> Result<()> {
    let Some(entity) = commands::resolve(entity) else {
      return Err(eyre!(
        "Unknown entity '{}'. Try one of:\n{}",
        entity,
        commands::entity_table()
      ));
    };

    let lines: Vec<String> = match entity.table {
      Table::Subjects => {
        self.store.fetch_subjects().await?;
        self.store.subjects().iter().map(subject_line).collect()
      }
      Table::Classes => {
        self.store.fetch_classes().await?;
        self.store.classes().iter().map(class_line).collect()
      }
      Table::Students => {
        self.store.fetch_students().await?;
        self.store.students().iter().map(student_line).collect()
      }
      Table::Assignments => {
        self.store.fetch_assignments(class).await?;
        self.store.assignments().iter().map(assignment_line).collect()
      }
      Table::Grades => {
        self.store.fetch_grades(assignment).await?;
        self.store.grades().iter().map(grade_line).collect()
      }
      Table::Attendance => {
        self.store.fetch_attendance(class, date).await?;
        self.store.attendance().iter().map(attendance_line).collect()
      }
      Table::Profiles | Table::UserRoles => Vec::new(),
    };

    if lines.is_empty() {
      println!("No {} found", entity.name);
    }
    for line in lines {
      println!("{}", line);
    }
    Ok(())
  }

  // ==========================================================================
  // Writes
  // ==========================================================================

  async fn class(&mut self, action: ClassAction) -> Result<()> {
    match action {
      ClassAction::Add { name, code, fields } => {
        let teacher = self.require_user()?;
        let mut changes = class_changes(fields);
        changes.name = Some(name);
        changes.code = Some(code);
        changes.teacher_id = Some(teacher.id);
        changes.max_students = changes.max_students.or(Some(30));
        changes.status = changes.status.or(Some(Default::default()));

        let class = self.store.create_class(&changes).await?;
        println!("Created {}", class_line(&class));
        self.await_resync(Table::Classes, 1).await;
      }
      ClassAction::Edit {
        id,
        name,
        code,
        fields,
      } => {
        let mut changes = class_changes(fields);
        changes.name = name;
        changes.code = code;
        ensure_changes(serde_json::to_value(&changes)?)?;

        let class = self.store.update_class(&id, &changes).await?;
        println!("Updated {}", class_line(&class));
        self.await_resync(Table::Classes, 1).await;
      }
      ClassAction::Rm { id } => {
        self.store.delete_class(&id).await?;
        println!("Deleted class {}", id);
        self.await_resync(Table::Classes, 1).await;
      }
    }
    Ok(())
  }

  async fn assignment(&mut self, action: AssignmentAction) -> Result<()> {
    match action {
      AssignmentAction::Add {
        class,
        title,
        fields,
      } => {
        let mut changes = assignment_changes(fields)?;
        changes.class_id = Some(class);
        changes.title = Some(title);
        changes.max_grade = changes.max_grade.or(Some(100.0));
        changes.assignment_type = changes.assignment_type.or(Some(Default::default()));
        changes.status = changes.status.or(Some(Default::default()));

        let assignment = self.store.create_assignment(&changes).await?;
        println!("Created {}", assignment_line(&assignment));
        self.await_resync(Table::Assignments, 1).await;
      }
      AssignmentAction::Edit { id, title, fields } => {
        let mut changes = assignment_changes(fields)?;
        changes.title = title;
        ensure_changes(serde_json::to_value(&changes)?)?;

        let assignment = self.store.update_assignment(&id, &changes).await?;
        println!("Updated {}", assignment_line(&assignment));
        self.await_resync(Table::Assignments, 1).await;
      }
      AssignmentAction::Rm { id } => {
        self.store.delete_assignment(&id).await?;
        println!("Deleted assignment {}", id);
        self.await_resync(Table::Assignments, 1).await;
      }
    }
    Ok(())
  }

  async fn grade(&mut self, action: GradeAction) -> Result<()> {
    match action {
      GradeAction::Add {
        assignment,
        student,
        grade,
        feedback,
      } => {
        let grade = grade.map(validate_grade).transpose()?;
        let grader = match grade {
          Some(_) => Some(self.require_user()?.id),
          None => None,
        };
        let changes = GradeChanges {
          assignment_id: Some(assignment),
          student_id: Some(student),
          grade: grade.map(Some),
          feedback,
          graded_at: grade.map(|_| Utc::now()),
          graded_by: grader,
        };

        let grade = self.store.create_grade(&changes).await?;
        println!("Created {}", grade_line(&grade));
      }
      GradeAction::Set {
        id,
        grade,
        feedback,
      } => {
        let grader = self.require_user()?;
        let changes = GradeChanges {
          grade: Some(Some(validate_grade(grade)?)),
          feedback,
          graded_at: Some(Utc::now()),
          graded_by: Some(grader.id),
          ..Default::default()
        };

        let grade = self.store.update_grade(&id, &changes).await?;
        println!("Graded {}", grade_line(&grade));
      }
    }
    self.await_resync(Table::Grades, 1).await;
    Ok(())
  }

  async fn attendance(&mut self, action: AttendanceAction) -> Result<()> {
    match action {
      AttendanceAction::Mark {
        class,
        student,
        date,
        status,
        notes,
      } => {
        let marker = self.require_user()?;
        let changes = AttendanceChanges {
          class_id: Some(class),
          student_id: Some(student),
          date: Some(date),
          status: Some(status),
          notes,
          marked_by: Some(marker.id),
        };

        let record = self.store.mark_attendance(&changes).await?;
        println!("Marked {}", attendance_line(&record));
        self.await_resync(Table::Attendance, 1).await;
      }
      AttendanceAction::Edit { id, status, notes } => {
        if status.is_none() && notes.is_none() {
          return Err(eyre!("Nothing to change. Pass --status or --notes."));
        }
        let marker = self.require_user()?;
        let changes = AttendanceChanges {
          status,
          notes,
          marked_by: Some(marker.id),
          ..Default::default()
        };

        let record = self.store.update_attendance(&id, &changes).await?;
        println!("Updated {}", attendance_line(&record));
        self.await_resync(Table::Attendance, 1).await;
      }
      AttendanceAction::Roll { class, date, marks } => {
        self.roll(&class, date, marks).await?;
      }
    }
    Ok(())
  }

  async fn roll(
    &mut self,
    class: &str,
    date: NaiveDate,
    marks: Vec<(String, AttendanceStatus)>,
  ) -> Result<()> {
    let marker = self.require_user()?;
    self.store.fetch_students().await?;
    let students = self.store.students();

    let marks: HashMap<String, AttendanceStatus> = marks.into_iter().collect();
    for id in marks.keys() {
      if !students.iter().any(|s| &s.id == id) {
        warn!(student_id = %id, "mark for unknown student ignored");
        println!("Ignoring mark for unknown student {}", id);
      }
    }

    let sheet = roll_call(class, date, &students, &marks, Some(marker.id.as_str()));
    let total = sheet.len();
    let outcome = self.store.mark_attendance_batch(sheet).await;

    println!("Marked {} of {} students", outcome.written.len(), total);
    for (student, error) in &outcome.failed {
      println!(
        "  failed for {}: {}",
        student.as_deref().unwrap_or("unknown student"),
        error
      );
    }
    self
      .await_resync(Table::Attendance, outcome.written.len())
      .await;

    if outcome.is_complete() {
      Ok(())
    } else {
      Err(eyre!(
        "{} of {} attendance records were not saved",
        outcome.failed.len(),
        total
      ))
    }
  }

  /// In resync mode, wait for the background refetches a write started so
  /// they are not cut short when the command returns.
  async fn await_resync(&mut self, table: Table, writes: usize) {
    if self.store.sync() != WriteSync::Resync {
      return;
    }
    for _ in 0..writes {
      match self.events.settled(table).await {
        Some(StoreEvent::FetchFailed { message, .. }) => {
          println!("Saved, but reloading {} failed: {}", table, message);
        }
        Some(_) => {}
        None => break,
      }
    }
  }

  // ==========================================================================
  // Summaries
  // ==========================================================================

  async fn stats(&mut self, action: StatsAction) -> Result<()> {
    match action {
      StatsAction::Grades { assignment } => {
        self.store.fetch_grades(assignment.as_deref()).await?;
        let grades = self.store.grades();
        let stats = GradeStats::from_grades(&grades);

        println!(
          "{} grades: {} graded, {} pending, average {:.1}",
          stats.total, stats.graded, stats.pending, stats.average
        );
        for grade in &grades {
          println!("  {:<40} {}", grade_line(grade), GradeBand::of(grade));
        }
      }
      StatsAction::Attendance { class, date } => {
        let (students, records) = tokio::join!(
          self.store.fetch_students(),
          self.store.fetch_attendance(Some(&class), Some(date))
        );
        students?;
        records?;

        let stats = AttendanceStats::from_marks(
          self.store.students().len(),
          self.store.attendance().iter().map(|r| r.status),
        );
        println!(
          "{} on {}: {}% present ({} present, {} absent, {} late, {} excused of {})",
          class,
          date,
          stats.rate,
          stats.present,
          stats.absent,
          stats.late,
          stats.excused,
          stats.total_students
        );
      }
    }
    Ok(())
  }
}

async fn resolve_password(password: Option<String>) -> Result<String> {
  if let Some(password) = password {
    return Ok(password);
  }

  eprint!("Password: ");
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let line = lines
    .next_line()
    .await
    .map_err(|e| eyre!("Failed to read password: {}", e))?
    .ok_or_else(|| eyre!("No password given"))?;
  Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn class_changes(fields: ClassFields) -> ClassChanges {
  ClassChanges {
    description: fields.description,
    subject_id: fields.subject,
    semester: fields.semester,
    academic_year: fields.academic_year,
    max_students: fields.max_students,
    status: fields.status,
    ..Default::default()
  }
}

fn assignment_changes(fields: AssignmentFields) -> Result<AssignmentChanges> {
  if let Some(max) = fields.max_grade {
    if !max.is_finite() || max <= 0.0 {
      return Err(eyre!("Maximum grade must be a positive number, got {}", max));
    }
  }
  Ok(AssignmentChanges {
    description: fields.description,
    due_date: fields.due,
    max_grade: fields.max_grade,
    assignment_type: fields.assignment_type,
    status: fields.status,
    ..Default::default()
  })
}

fn validate_grade(grade: f64) -> Result<f64> {
  if grade.is_finite() && grade >= 0.0 {
    Ok(grade)
  } else {
    Err(eyre!("Grade must be a non-negative number, got {}", grade))
  }
}

fn ensure_changes(encoded: serde_json::Value) -> Result<()> {
  match encoded.as_object() {
    Some(fields) if !fields.is_empty() => Ok(()),
    _ => Err(eyre!("Nothing to change. Pass at least one field to update.")),
  }
}

// ============================================================================
// Row formatting
// ============================================================================

fn subject_line(subject: &Subject) -> String {
  format!("{:<10} {}", subject.code, subject.name)
}

fn class_line(class: &ClassSection) -> String {
  let subject = class.subject.as_ref().map(|s| s.name.as_str()).unwrap_or("-");
  format!(
    "{}  {:<10} {:<30} {:<20} {}",
    class.id,
    class.code,
    class.name,
    subject,
    class.status.as_str()
  )
}

fn student_line(student: &Student) -> String {
  let email = student
    .profile
    .as_ref()
    .and_then(|p| p.email.as_deref())
    .unwrap_or("-");
  format!(
    "{}  {:<12} {:<30} {:<30} {}",
    student.id,
    student.student_id,
    student.display_name(),
    email,
    student.status.as_str()
  )
}

fn assignment_line(assignment: &Assignment) -> String {
  let due = assignment
    .due_date
    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
    .unwrap_or_else(|| "no due date".to_string());
  let class = assignment
    .class
    .as_ref()
    .map(|c| c.code.as_str())
    .unwrap_or("-");
  format!(
    "{}  {:<10} {:<30} {:<8} /{} {}",
    assignment.id,
    class,
    assignment.title,
    assignment.assignment_type.as_str(),
    assignment.max_grade,
    due
  )
}

fn grade_line(grade: &Grade) -> String {
  let student = grade
    .student
    .as_ref()
    .map(|s| s.display_name())
    .unwrap_or(grade.student_id.as_str());
  let title = grade
    .assignment
    .as_ref()
    .map(|a| a.title.as_str())
    .unwrap_or(grade.assignment_id.as_str());
  let score = match grade.state() {
    GradeState::Pending => "pending".to_string(),
    GradeState::Graded => {
      let percent = grade
        .percentage()
        .map(|p| format!(" ({}%)", p.round()))
        .unwrap_or_default();
      format!(
        "{}/{}{}",
        grade.grade.unwrap_or_default(),
        grade.max_grade(),
        percent
      )
    }
  };
  format!("{}  {:<24} {:<24} {}", grade.id, student, title, score)
}

fn attendance_line(record: &AttendanceRecord) -> String {
  let student = record
    .student
    .as_ref()
    .map(|s| s.display_name())
    .unwrap_or(record.student_id.as_str());
  let class = record
    .class
    .as_ref()
    .map(|c| c.code.as_str())
    .unwrap_or(record.class_id.as_str());
  format!(
    "{}  {} {:<10} {:<24} {}",
    record.id, record.date, class, student, record.status
  )
}
