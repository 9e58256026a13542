use color_eyre::{eyre::eyre, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use url::Url;

use super::api_types::describe_error;
use super::query::{render_write_select, Embed, ReadQuery, Table};
use super::service::RemoteService;
use crate::config::Config;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Bearer token shared between the identity provider and the data client.
///
/// Requests fall back to the API key when no user is signed in.
#[derive(Debug, Clone, Default)]
pub struct AccessToken(Arc<RwLock<Option<String>>>);

impl AccessToken {
  pub fn set(&self, token: Option<String>) {
    *self.0.write().unwrap_or_else(PoisonError::into_inner) = token;
  }

  pub fn get(&self) -> Option<String> {
    self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

/// Client for the data service's PostgREST endpoint
#[derive(Clone)]
pub struct RestClient {
  http: reqwest::Client,
  base: Url,
  api_key: String,
  token: AccessToken,
}

impl RestClient {
  pub fn new(config: &Config, token: AccessToken) -> Result<Self> {
    let api_key = Config::get_api_key()?;
    Self::with_key(&config.service.url, api_key, token)
  }

  pub fn with_key(service_url: &str, api_key: String, token: AccessToken) -> Result<Self> {
    let base = service_base(service_url)?
      .join("rest/v1/")
      .map_err(|e| eyre!("Invalid service URL {}: {}", service_url, e))?;

    Ok(Self {
      http: reqwest::Client::new(),
      base,
      api_key,
      token,
    })
  }

  fn table_url(&self, table: Table) -> Result<Url> {
    self
      .base
      .join(table.as_str())
      .map_err(|e| eyre!("Invalid URL for table {}: {}", table, e))
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let bearer = self.token.get().unwrap_or_else(|| self.api_key.clone());
    self
      .http
      .request(method, url)
      .header("apikey", &self.api_key)
      .header(AUTHORIZATION, format!("Bearer {}", bearer))
  }

  fn select_request(&self, query: &ReadQuery) -> Result<RequestBuilder> {
    let mut url = self.table_url(query.table)?;
    url.query_pairs_mut().extend_pairs(query.to_params());
    Ok(
      self
        .request(Method::GET, url)
        .header(ACCEPT, "application/json"),
    )
  }

  /// Request returning exactly one row, with plain embeds, as an object.
  fn single_row_request(
    &self,
    method: Method,
    table: Table,
    embeds: &[Embed],
    extra: &[(&str, String)],
    prefer: &str,
  ) -> Result<RequestBuilder> {
    let mut url = self.table_url(table)?;
    {
      let mut pairs = url.query_pairs_mut();
      for (k, v) in extra {
        pairs.append_pair(k, v);
      }
      pairs.append_pair("select", &render_write_select(embeds));
    }
    Ok(
      self
        .request(method, url)
        .header(ACCEPT, SINGLE_OBJECT)
        .header("Prefer", prefer),
    )
  }

  async fn send_json<T: serde::de::DeserializeOwned>(
    &self,
    request: RequestBuilder,
    what: &str,
  ) -> Result<T> {
    send_checked(request, what)
      .await?
      .json::<T>()
      .await
      .map_err(|e| eyre!("Failed to parse response to {}: {}", what, e))
  }
}

impl RemoteService for RestClient {
  async fn select(&self, query: &ReadQuery) -> Result<Vec<Value>> {
    debug!(table = %query.table, filters = query.filters.len(), "select");
    let request = self.select_request(query)?;
    self
      .send_json(request, &format!("read {}", query.table))
      .await
  }

  async fn insert(&self, table: Table, row: Value, embeds: &'static [Embed]) -> Result<Value> {
    debug!(table = %table, "insert");
    let request = self
      .single_row_request(
        Method::POST,
        table,
        embeds,
        &[],
        "return=representation",
      )?
      .json(&row);
    self.send_json(request, &format!("insert into {}", table)).await
  }

  async fn update(
    &self,
    table: Table,
    id: &str,
    changes: Value,
    embeds: &'static [Embed],
  ) -> Result<Value> {
    debug!(table = %table, id, "update");
    let request = self
      .single_row_request(
        Method::PATCH,
        table,
        embeds,
        &[("id", format!("eq.{}", id))],
        "return=representation",
      )?
      .json(&changes);
    self
      .send_json(request, &format!("update {} {}", table, id))
      .await
  }

  async fn delete(&self, table: Table, id: &str) -> Result<()> {
    debug!(table = %table, id, "delete");
    let mut url = self.table_url(table)?;
    url
      .query_pairs_mut()
      .append_pair("id", &format!("eq.{}", id));
    let request = self.request(Method::DELETE, url);
    send_checked(request, &format!("delete {} {}", table, id)).await?;
    Ok(())
  }

  async fn upsert(
    &self,
    table: Table,
    row: Value,
    on_conflict: &'static [&'static str],
    embeds: &'static [Embed],
  ) -> Result<Value> {
    debug!(table = %table, "upsert");
    let request = self
      .single_row_request(
        Method::POST,
        table,
        embeds,
        &[("on_conflict", on_conflict.join(","))],
        "return=representation,resolution=merge-duplicates",
      )?
      .json(&row);
    self.send_json(request, &format!("upsert into {}", table)).await
  }
}

/// Send a request, turning non-success statuses into errors that carry the
/// service's own message.
pub async fn send_checked(request: RequestBuilder, what: &str) -> Result<Response> {
  let response = request
    .send()
    .await
    .map_err(|e| eyre!("Failed to {}: {}", what, e))?;

  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body = response.text().await.unwrap_or_default();
  Err(eyre!(
    "Failed to {}: {} {}",
    what,
    status,
    describe_error(&body)
  ))
}

/// Normalize a configured service URL so relative joins keep its path.
pub fn service_base(service_url: &str) -> Result<Url> {
  let normalized = format!("{}/", service_url.trim_end_matches('/'));
  Url::parse(&normalized).map_err(|e| eyre!("Invalid service URL {}: {}", service_url, e))
}
