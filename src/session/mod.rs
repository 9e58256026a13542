//! Session/identity cache.
//!
//! Holds the signed-in user and their role, persisted across restarts by a
//! `SessionStorage` backend. The `SessionWatcher` keeps it in step with the
//! identity provider's sign-in and sign-out notifications.

mod identity;
mod storage;
mod watcher;

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use tracing::warn;

pub use identity::{AuthEvent, IdentityProvider, RestIdentity};
pub use storage::{NoopSessionStorage, SessionStorage, SqliteSessionStorage};
pub use watcher::SessionWatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Teacher,
  Student,
}

impl Role {
  /// Map a role name stored by the data service. Administrators act as
  /// teachers; anything unknown is a student.
  pub fn from_remote(role: Option<&str>) -> Self {
    match role.map(|r| r.trim().to_lowercase()).as_deref() {
      Some("teacher") | Some("admin") => Self::Teacher,
      _ => Self::Student,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Teacher => "teacher",
      Self::Student => "student",
    }
  }
}

impl FromStr for Role {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "teacher" => Ok(Self::Teacher),
      "student" => Ok(Self::Student),
      other => Err(format!(
        "unknown role '{}' (expected teacher or student)",
        other
      )),
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  pub name: String,
  pub email: String,
  pub role: Role,
  #[serde(default)]
  pub avatar: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
  pub name: Option<String>,
  pub email: Option<String>,
  pub role: Option<Role>,
  pub avatar: Option<String>,
}

/// Signed-in user plus the identity provider's access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
  pub user: User,
  #[serde(default)]
  pub access_token: Option<String>,
}

pub struct SessionCache<S: SessionStorage> {
  storage: S,
  current: RwLock<Option<Session>>,
}

impl<S: SessionStorage> SessionCache<S> {
  /// Restore the persisted session, starting signed out if it can't be read.
  pub fn restore(storage: S) -> Self {
    let current = storage.load().unwrap_or_else(|e| {
      warn!(error = %e, "could not restore session, starting signed out");
      None
    });
    Self {
      storage,
      current: RwLock::new(current),
    }
  }

  pub fn current(&self) -> Option<User> {
    self.read().as_ref().map(|s| s.user.clone())
  }

  pub fn access_token(&self) -> Option<String> {
    self.read().as_ref().and_then(|s| s.access_token.clone())
  }

  pub fn is_authenticated(&self) -> bool {
    self.read().is_some()
  }

  /// Replace the current session and persist it.
  pub fn login(&self, session: Session) -> Result<()> {
    *self.write() = Some(session.clone());
    self.storage.save(&session)
  }

  pub fn logout(&self) -> Result<()> {
    *self.write() = None;
    self.storage.clear()
  }

  /// Merge changes onto the signed-in user. Does nothing when signed out.
  pub fn update_user(&self, changes: UserChanges) -> Result<Option<User>> {
    let updated = {
      let mut current = self.write();
      let Some(session) = current.as_mut() else {
        return Ok(None);
      };
      let user = &mut session.user;
      if let Some(name) = changes.name {
        user.name = name;
      }
      if let Some(email) = changes.email {
        user.email = email;
      }
      if let Some(role) = changes.role {
        user.role = role;
      }
      if changes.avatar.is_some() {
        user.avatar = changes.avatar;
      }
      session.clone()
    };
    self.storage.save(&updated)?;
    Ok(Some(updated.user))
  }

  fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Session>> {
    self.current.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Session>> {
    self.current.write().unwrap_or_else(PoisonError::into_inner)
  }
}
