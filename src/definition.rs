//! Mock definition model and input validation.

use crate::error::MockError;
use crate::template;
use axum::http::{HeaderName, HeaderValue};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Inclusive bounds for `statusCode`.
///
/// Informational codes (1xx) are accepted and stored, but hyper will not send
/// a 1xx as a final response and replies 500 instead.
pub const STATUS_CODE_RANGE: (i64, i64) = (100, 599);
/// Inclusive bounds for `delayMs`.
pub const MAX_DELAY_MS: i64 = 30_000;
/// Inclusive bounds for the advisory `rateLimit`.
pub const RATE_LIMIT_RANGE: (i64, i64) = (1, 10_000);
/// Owner assigned when a create request does not name one.
pub const ANONYMOUS_OWNER: &str = "anonymous";
/// Template used when a create request has none.
pub const DEFAULT_TEMPLATE: &str = "{}";
/// Longest accepted caller-supplied id.
pub const MAX_ID_LEN: usize = 128;

/// HTTP methods a mock can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

/// Credential a caller must present to invoke a mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthMode {
    #[default]
    None,
    BearerToken,
    ApiKey,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::None => "none",
            AuthMode::BearerToken => "bearerToken",
            AuthMode::ApiKey => "apiKey",
        }
    }
}

impl FromStr for AuthMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(AuthMode::None),
            "bearerToken" => Ok(AuthMode::BearerToken),
            "apiKey" => Ok(AuthMode::ApiKey),
            _ => Err(()),
        }
    }
}

/// A persisted virtual endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub endpoint: String,
    pub method: HttpMethod,
    pub response_template: String,
    pub status_code: u16,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub is_shared: bool,
    pub owner_id: String,
    #[serde(default)]
    pub auth_mode: AuthMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret: Option<String>,
    /// Stored and validated, never enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
    #[serde(default)]
    pub request_count: u64,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl MockDefinition {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Path at which this mock is invoked.
    pub fn invoke_path(&self) -> String {
        format!("/mock/{}", self.id)
    }

    /// Whether `owner_id` may mutate this definition. An absent owner is
    /// not checked.
    pub fn owner_matches(&self, owner_id: Option<&str>) -> bool {
        owner_id.map_or(true, |owner| owner == self.owner_id)
    }

    /// Copy with the auth secret removed.
    pub fn redacted(&self) -> Self {
        Self {
            auth_secret: None,
            ..self.clone()
        }
    }

    /// Record a successful invocation.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.request_count += 1;
        self.last_used_at = Some(now);
    }

    /// Keep the larger invocation counter and the later `lastUsedAt` of
    /// `self` and `stored`, so a write never moves them backwards.
    pub fn absorb_counters(&mut self, stored: &MockDefinition) {
        self.request_count = self.request_count.max(stored.request_count);
        self.last_used_at = self.last_used_at.max(stored.last_used_at);
    }

    /// Merge `patch` over this definition and validate the result.
    ///
    /// System-assigned fields (`id`, `ownerId`, counters, `createdAt`) are
    /// never taken from the patch.
    pub fn apply_update(&self, patch: DefinitionInput) -> Result<MockDefinition, MockError> {
        let merged = patch.merge_over(self);
        let fields = merged.check()?;
        let expires_at = fields.expires_at.unwrap_or(self.expires_at);
        if expires_at <= self.created_at {
            return Err(MockError::validation(
                "expiresAt",
                "Expiry must be after creation time",
            ));
        }

        Ok(MockDefinition {
            id: self.id.clone(),
            name: fields.name,
            description: fields.description,
            endpoint: fields.endpoint,
            method: fields.method,
            response_template: fields.response_template,
            status_code: fields.status_code,
            delay_ms: fields.delay_ms,
            headers: fields.headers,
            is_shared: fields.is_shared,
            owner_id: self.owner_id.clone(),
            auth_mode: fields.auth_mode,
            auth_secret: fields.auth_secret,
            rate_limit: fields.rate_limit,
            request_count: self.request_count,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
            expires_at,
        })
    }
}

/// User-supplied fields for create and update.
///
/// Every field is optional so the same shape serves as a full create payload
/// and a partial update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub response_template: Option<String>,
    #[serde(default)]
    pub status_code: Option<i64>,
    #[serde(default)]
    pub delay_ms: Option<i64>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub is_shared: Option<bool>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub auth_mode: Option<String>,
    #[serde(default)]
    pub auth_secret: Option<String>,
    #[serde(default)]
    pub rate_limit: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Fields that passed validation.
struct CheckedFields {
    name: String,
    description: String,
    endpoint: String,
    method: HttpMethod,
    response_template: String,
    status_code: u16,
    delay_ms: u64,
    headers: BTreeMap<String, String>,
    is_shared: bool,
    auth_mode: AuthMode,
    auth_secret: Option<String>,
    rate_limit: Option<u32>,
    expires_at: Option<DateTime<Utc>>,
}

impl DefinitionInput {
    /// Validate without building a definition.
    pub fn validate(&self) -> Result<(), MockError> {
        self.check().map(|_| ())
    }

    /// Validate and build a new definition stamped at `now`.
    ///
    /// `id` falls back to a fresh v4 UUID and `expiresAt` to `now + ttl`.
    pub fn into_definition(
        self,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<MockDefinition, MockError> {
        let fields = self.check()?;
        let expires_at = fields.expires_at.unwrap_or(now + ttl);
        if expires_at <= now {
            return Err(MockError::validation(
                "expiresAt",
                "Expiry must be after creation time",
            ));
        }

        let id = self
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let owner_id = self
            .owner_id
            .filter(|owner| !owner.is_empty())
            .unwrap_or_else(|| ANONYMOUS_OWNER.to_string());

        Ok(MockDefinition {
            id,
            name: fields.name,
            description: fields.description,
            endpoint: fields.endpoint,
            method: fields.method,
            response_template: fields.response_template,
            status_code: fields.status_code,
            delay_ms: fields.delay_ms,
            headers: fields.headers,
            is_shared: fields.is_shared,
            owner_id,
            auth_mode: fields.auth_mode,
            auth_secret: fields.auth_secret,
            rate_limit: fields.rate_limit,
            request_count: 0,
            last_used_at: None,
            created_at: now,
            expires_at,
        })
    }

    /// Overlay the supplied fields on an existing definition.
    fn merge_over(self, existing: &MockDefinition) -> DefinitionInput {
        DefinitionInput {
            id: Some(existing.id.clone()),
            name: self.name.or_else(|| Some(existing.name.clone())),
            description: self
                .description
                .or_else(|| Some(existing.description.clone())),
            endpoint: self.endpoint.or_else(|| Some(existing.endpoint.clone())),
            method: self
                .method
                .or_else(|| Some(existing.method.as_str().to_string())),
            response_template: self
                .response_template
                .or_else(|| Some(existing.response_template.clone())),
            status_code: self.status_code.or(Some(existing.status_code as i64)),
            delay_ms: self.delay_ms.or(Some(existing.delay_ms as i64)),
            headers: self.headers.or_else(|| Some(existing.headers.clone())),
            is_shared: self.is_shared.or(Some(existing.is_shared)),
            owner_id: Some(existing.owner_id.clone()),
            auth_mode: self
                .auth_mode
                .or_else(|| Some(existing.auth_mode.as_str().to_string())),
            auth_secret: self.auth_secret.or_else(|| existing.auth_secret.clone()),
            rate_limit: self
                .rate_limit
                .or(existing.rate_limit.map(|limit| limit as i64)),
            expires_at: self.expires_at.or(Some(existing.expires_at)),
        }
    }

    /// Run field checks in order, stopping at the first failure.
    fn check(&self) -> Result<CheckedFields, MockError> {
        let name = self.name.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(MockError::validation("name", "Name is required"));
        }

        let endpoint = self.endpoint.as_deref().map(str::trim).unwrap_or_default();
        if endpoint.is_empty() {
            return Err(MockError::validation("endpoint", "Endpoint is required"));
        }
        if !endpoint.starts_with('/') {
            return Err(MockError::validation(
                "endpoint",
                "Endpoint must start with /",
            ));
        }

        let method = match self.method.as_deref() {
            None => HttpMethod::Get,
            Some(raw) => raw.parse::<HttpMethod>().map_err(|_| {
                MockError::validation(
                    "method",
                    "Method must be one of GET, POST, PUT, DELETE, PATCH",
                )
            })?,
        };

        let response_template = self
            .response_template
            .clone()
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
        if let Err(e) =
            serde_json::from_str::<serde_json::Value>(&template::neutralize(&response_template))
        {
            return Err(MockError::validation(
                "responseTemplate",
                format!("Response template must be valid JSON: {}", e),
            ));
        }

        let status_code = self.status_code.unwrap_or(200);
        if !(STATUS_CODE_RANGE.0..=STATUS_CODE_RANGE.1).contains(&status_code) {
            return Err(MockError::validation(
                "statusCode",
                "Status code must be between 100 and 599",
            ));
        }

        let delay_ms = self.delay_ms.unwrap_or(0);
        if !(0..=MAX_DELAY_MS).contains(&delay_ms) {
            return Err(MockError::validation(
                "delayMs",
                "Delay must be between 0 and 30000 ms",
            ));
        }

        let auth_mode = match self.auth_mode.as_deref() {
            None => AuthMode::None,
            Some(raw) => raw.parse::<AuthMode>().map_err(|_| {
                MockError::validation(
                    "authMode",
                    "Auth mode must be one of none, bearerToken, apiKey",
                )
            })?,
        };
        let auth_secret = self.auth_secret.clone().filter(|s| !s.is_empty());
        if auth_mode != AuthMode::None && auth_secret.is_none() {
            return Err(MockError::validation(
                "authSecret",
                format!("Auth secret is required when authMode is {}", auth_mode.as_str()),
            ));
        }

        let rate_limit = match self.rate_limit {
            None => None,
            Some(limit) if (RATE_LIMIT_RANGE.0..=RATE_LIMIT_RANGE.1).contains(&limit) => {
                Some(limit as u32)
            }
            Some(_) => {
                return Err(MockError::validation(
                    "rateLimit",
                    "Rate limit must be between 1 and 10000",
                ))
            }
        };

        let headers = self.headers.clone().unwrap_or_default();
        for (key, value) in &headers {
            if HeaderName::from_bytes(key.as_bytes()).is_err()
                || HeaderValue::from_str(value).is_err()
            {
                return Err(MockError::validation(
                    "headers",
                    format!("Invalid header: {}", key),
                ));
            }
        }

        if let Some(id) = self.id.as_deref().map(str::trim) {
            check_id(id)?;
        }

        Ok(CheckedFields {
            name: name.to_string(),
            description: self.description.clone().unwrap_or_default(),
            endpoint: endpoint.to_string(),
            method,
            response_template,
            status_code: status_code as u16,
            delay_ms: delay_ms as u64,
            headers,
            is_shared: self.is_shared.unwrap_or(false),
            auth_mode,
            auth_secret,
            rate_limit,
            expires_at: self.expires_at,
        })
    }
}

/// Ids end up as a path segment of the invoke URL, so only unreserved URL
/// characters are allowed. An empty id means "generate one".
fn check_id(id: &str) -> Result<(), MockError> {
    if id.len() > MAX_ID_LEN {
        return Err(MockError::validation(
            "id",
            format!("Id must be at most {} characters", MAX_ID_LEN),
        ));
    }
    let unreserved = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~');
    if !id.chars().all(unreserved) || id == "." || id == ".." {
        return Err(MockError::validation(
            "id",
            "Id may only contain letters, digits, '-', '_', '.' and '~'",
        ));
    }
    Ok(())
}
