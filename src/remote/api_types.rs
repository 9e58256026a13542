//! Serde types matching remote responses that are not domain rows.
//!
//! Domain rows deserialize straight into `crate::model` types; the types
//! here cover identity, profile and error payloads.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Decode a batch of JSON rows into typed rows, preserving order.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
  rows
    .into_iter()
    .map(decode_row)
    .collect::<Result<Vec<T>>>()
}

pub fn decode_row<T: DeserializeOwned>(row: Value) -> Result<T> {
  serde_json::from_value(row).map_err(|e| eyre!("Failed to parse row: {}", e))
}

/// Serialize a change set into the JSON object sent to the service.
pub fn encode_changes(changes: &impl Serialize) -> Result<Value> {
  serde_json::to_value(changes).map_err(|e| eyre!("Failed to serialize changes: {}", e))
}

// ============================================================================
// Profiles and roles
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiProfile {
  pub user_id: String,
  #[serde(default)]
  pub full_name: Option<String>,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiUserRole {
  pub role: String,
}

// ============================================================================
// Identity provider
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiAuthUser {
  pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiTokenResponse {
  pub access_token: String,
  pub user: ApiAuthUser,
}

#[derive(Debug, Serialize)]
pub struct ApiPasswordGrant<'a> {
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ApiSignUpData<'a> {
  pub full_name: &'a str,
  pub role: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ApiSignUp<'a> {
  pub email: &'a str,
  pub password: &'a str,
  pub data: ApiSignUpData<'a>,
}

// ============================================================================
// Errors
// ============================================================================

/// Error payload; the data API and the identity provider use different keys.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
  pub message: Option<String>,
  pub msg: Option<String>,
  pub error_description: Option<String>,
  pub error: Option<String>,
  pub hint: Option<String>,
}

/// Best human-readable message from an error response body.
pub fn describe_error(body: &str) -> String {
  let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
  let message = parsed
    .message
    .or(parsed.msg)
    .or(parsed.error_description)
    .or(parsed.error);

  match (message, parsed.hint) {
    (Some(m), Some(h)) => format!("{} ({})", m, h),
    (Some(m), None) => m,
    (None, _) if body.trim().is_empty() => "empty response".to_string(),
    (None, _) => body.trim().to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_describe_data_api_error() {
    let body = r#"{"code":"23505","message":"duplicate key value","hint":"code must be unique"}"#;
    assert_eq!(
      describe_error(body),
      "duplicate key value (code must be unique)"
    );
  }

  #[test]
  fn test_describe_identity_error() {
    let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
    assert_eq!(describe_error(body), "Invalid login credentials");
  }

  #[test]
  fn test_describe_unstructured_error() {
    assert_eq!(describe_error("  upstream timeout \n"), "upstream timeout");
    assert_eq!(describe_error(""), "empty response");
  }

  #[test]
  fn test_decode_rows_reports_bad_rows() {
    let rows = vec![serde_json::json!({ "role": "teacher" }), serde_json::json!({})];
    let decoded: Result<Vec<ApiUserRole>> = decode_rows(rows);
    assert!(decoded.is_err());
  }
}
