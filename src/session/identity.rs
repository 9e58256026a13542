//! Identity provider boundary and its GoTrue implementation.

use color_eyre::{eyre::eyre, Result};
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder};
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::remote::api_types::{ApiPasswordGrant, ApiSignUp, ApiSignUpData, ApiTokenResponse};
use crate::remote::client::{send_checked, service_base};
use crate::remote::AccessToken;

use super::Role;

/// Sign-in state changes announced by the identity provider
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
  SignedIn {
    user_id: String,
    access_token: String,
  },
  SignedOut,
}

/// Operations the identity provider offers.
///
/// Successful sign-in and sign-out are also announced as `AuthEvent`s.
pub trait IdentityProvider: Send + Sync + 'static {
  /// Returns the signed-in user's id.
  fn sign_in(&self, email: &str, password: &str) -> impl Future<Output = Result<String>> + Send;

  fn sign_up(
    &self,
    email: &str,
    password: &str,
    full_name: &str,
    role: Role,
  ) -> impl Future<Output = Result<()>> + Send;

  fn sign_out(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Client for the service's `/auth/v1` endpoints
pub struct RestIdentity {
  http: reqwest::Client,
  base: Url,
  api_key: String,
  token: AccessToken,
  events: mpsc::UnboundedSender<AuthEvent>,
}

impl RestIdentity {
  pub fn new(
    config: &Config,
    token: AccessToken,
    events: mpsc::UnboundedSender<AuthEvent>,
  ) -> Result<Self> {
    let api_key = Config::get_api_key()?;
    Self::with_key(&config.service.url, api_key, token, events)
  }

  pub fn with_key(
    service_url: &str,
    api_key: String,
    token: AccessToken,
    events: mpsc::UnboundedSender<AuthEvent>,
  ) -> Result<Self> {
    let base = service_base(service_url)?
      .join("auth/v1/")
      .map_err(|e| eyre!("Invalid service URL {}: {}", service_url, e))?;

    Ok(Self {
      http: reqwest::Client::new(),
      base,
      api_key,
      token,
      events,
    })
  }

  fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
    let url = self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid identity endpoint {}: {}", path, e))?;
    let bearer = self.token.get().unwrap_or_else(|| self.api_key.clone());
    Ok(
      self
        .http
        .request(method, url)
        .header("apikey", &self.api_key)
        .header(AUTHORIZATION, format!("Bearer {}", bearer)),
    )
  }

  fn sign_in_request(&self, email: &str, password: &str) -> Result<RequestBuilder> {
    Ok(
      self
        .request(Method::POST, "token?grant_type=password")?
        .json(&ApiPasswordGrant { email, password }),
    )
  }

  fn sign_up_request(
    &self,
    email: &str,
    password: &str,
    full_name: &str,
    role: Role,
  ) -> Result<RequestBuilder> {
    Ok(self.request(Method::POST, "signup")?.json(&ApiSignUp {
      email,
      password,
      data: ApiSignUpData {
        full_name,
        role: role.as_str(),
      },
    }))
  }

  fn announce(&self, event: AuthEvent) {
    // Nobody listening is fine for one-shot commands.
    if self.events.send(event).is_err() {
      debug!("no listener for auth event");
    }
  }
}

impl IdentityProvider for RestIdentity {
  async fn sign_in(&self, email: &str, password: &str) -> Result<String> {
    let request = self.sign_in_request(email, password)?;
    let response: ApiTokenResponse = send_checked(request, "sign in")
      .await?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse sign-in response: {}", e))?;

    info!(user_id = %response.user.id, "signed in");
    self.token.set(Some(response.access_token.clone()));
    self.announce(AuthEvent::SignedIn {
      user_id: response.user.id.clone(),
      access_token: response.access_token,
    });
    Ok(response.user.id)
  }

  async fn sign_up(&self, email: &str, password: &str, full_name: &str, role: Role) -> Result<()> {
    let request = self.sign_up_request(email, password, full_name, role)?;
    send_checked(request, "sign up").await?;
    info!(email, role = role.as_str(), "signed up");
    Ok(())
  }

  async fn sign_out(&self) -> Result<()> {
    if self.token.get().is_some() {
      let request = self.request(Method::POST, "logout")?;
      send_checked(request, "sign out").await?;
    }
    self.token.set(None);
    self.announce(AuthEvent::SignedOut);
    info!("signed out");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn identity(token: AccessToken) -> (RestIdentity, mpsc::UnboundedReceiver<AuthEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let identity =
      RestIdentity::with_key("https://school.example.co", "anon-key".to_string(), token, tx)
        .unwrap();
    (identity, rx)
  }

  #[test]
  fn test_sign_in_request_uses_password_grant() {
    let (identity, _rx) = identity(AccessToken::default());
    let request = identity
      .sign_in_request("ada@example.com", "secret")
      .unwrap()
      .build()
      .unwrap();

    assert_eq!(request.method(), &Method::POST);
    assert_eq!(
      request.url().as_str(),
      "https://school.example.co/auth/v1/token?grant_type=password"
    );
    assert_eq!(request.headers()["apikey"], "anon-key");
    let body: serde_json::Value =
      serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
    assert_eq!(
      body,
      serde_json::json!({ "email": "ada@example.com", "password": "secret" })
    );
  }

  #[test]
  fn test_sign_up_request_carries_metadata() {
    let (identity, _rx) = identity(AccessToken::default());
    let request = identity
      .sign_up_request("t@example.com", "pw", "Ms Teacher", Role::Teacher)
      .unwrap()
      .build()
      .unwrap();

    assert_eq!(request.url().path(), "/auth/v1/signup");
    let body: serde_json::Value =
      serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
    assert_eq!(body["data"]["full_name"], "Ms Teacher");
    assert_eq!(body["data"]["role"], "teacher");
  }

  #[tokio::test]
  async fn test_sign_out_without_token_announces_locally() {
    let token = AccessToken::default();
    let (identity, mut rx) = identity(token.clone());

    identity.sign_out().await.unwrap();

    assert_eq!(token.get(), None);
    assert_eq!(rx.try_recv().unwrap(), AuthEvent::SignedOut);
  }
}
