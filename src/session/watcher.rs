//! Keeps the session cache in step with identity provider notifications.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::remote::api_types::{decode_rows, ApiProfile, ApiUserRole};
use crate::remote::{Filter, ReadQuery, RemoteService, Table};

use super::identity::AuthEvent;
use super::storage::SessionStorage;
use super::{Role, Session, SessionCache, User, UserChanges};

pub struct SessionWatcher<R: RemoteService, S: SessionStorage> {
  remote: Arc<R>,
  session: Arc<SessionCache<S>>,
}

impl<R: RemoteService, S: SessionStorage> SessionWatcher<R, S> {
  pub fn new(remote: Arc<R>, session: Arc<SessionCache<S>>) -> Self {
    Self { remote, session }
  }

  /// Apply one notification to the session cache.
  pub async fn handle(&self, event: AuthEvent) -> Result<()> {
    match event {
      AuthEvent::SignedIn {
        user_id,
        access_token,
      } => self.signed_in(user_id, access_token).await,
      AuthEvent::SignedOut => {
        info!("session cleared");
        self.session.logout()
      }
    }
  }

  /// Reload the signed-in user's profile and role into the session.
  ///
  /// Returns the updated user, or `None` when signed out. A profile that has
  /// disappeared leaves the session as it was.
  pub async fn refresh(&self) -> Result<Option<User>> {
    let Some(current) = self.session.current() else {
      return Ok(None);
    };
    let Some(user) = self.load_user(&current.id).await? else {
      warn!(user_id = %current.id, "profile no longer exists; session kept");
      return Ok(Some(current));
    };

    info!(user_id = %user.id, role = user.role.as_str(), "session refreshed");
    self.session.update_user(UserChanges {
      name: Some(user.name),
      email: Some(user.email),
      role: Some(user.role),
      avatar: user.avatar,
    })
  }

  async fn signed_in(&self, user_id: String, access_token: String) -> Result<()> {
    let Some(user) = self.load_user(&user_id).await? else {
      warn!(user_id = %user_id, "signed in without a profile; session not started");
      return Ok(());
    };

    info!(user_id = %user_id, role = user.role.as_str(), "session started");
    self.session.login(Session {
      user,
      access_token: Some(access_token),
    })
  }

  /// Read profile and role together. `None` when there is no profile.
  async fn load_user(&self, user_id: &str) -> Result<Option<User>> {
    let profiles = ReadQuery::new(Table::Profiles).filter(Filter::eq("user_id", user_id));
    let roles = ReadQuery::new(Table::UserRoles).filter(Filter::eq("user_id", user_id));

    let (profiles, roles) = tokio::join!(self.remote.select(&profiles), self.remote.select(&roles));

    let Some(profile) = decode_rows::<ApiProfile>(profiles?)?.into_iter().next() else {
      return Ok(None);
    };

    let role = match roles.and_then(decode_rows::<ApiUserRole>) {
      Ok(roles) => Role::from_remote(roles.first().map(|r| r.role.as_str())),
      Err(e) => {
        warn!(user_id = %user_id, error = %e, "could not read role, assuming student");
        Role::Student
      }
    };

    let name = profile
      .full_name
      .filter(|n| !n.trim().is_empty())
      .unwrap_or_else(|| profile.email.clone());

    Ok(Some(User {
      id: profile.user_id,
      name,
      email: profile.email,
      role,
      avatar: profile.avatar_url,
    }))
  }
}
