//! Admission checks for mock invocations.
//!
//! Before a definition is rendered, the inbound request has to pass, in
//! order: the expiry check, the credential check, and the method check.

use crate::definition::{AuthMode, MockDefinition};
use crate::error::MockError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// The parts of an inbound request the dispatcher looks at.
#[derive(Debug, Clone, Default)]
pub struct MockRequest {
    /// Request method, as received
    pub method: String,
    /// Request headers (first value per name)
    pub headers: HashMap<String, String>,
}

impl MockRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Admission checks against a resolved definition.
pub struct Matcher {
    api_key_header: String,
}

impl Matcher {
    /// `api_key_header` names the header carrying `apiKey` credentials.
    pub fn new(api_key_header: &str) -> Self {
        Self {
            api_key_header: api_key_header.to_ascii_lowercase(),
        }
    }

    pub fn api_key_header(&self) -> &str {
        &self.api_key_header
    }

    /// Run every check in order, returning the first failure.
    pub fn admit(
        &self,
        definition: &MockDefinition,
        request: &MockRequest,
        now: DateTime<Utc>,
    ) -> Result<(), MockError> {
        check_expiry(definition, now)?;
        self.check_credential(definition, request)?;
        check_method(definition, request)
    }

    /// Verify the caller presented the definition's secret.
    pub fn check_credential(
        &self,
        definition: &MockDefinition,
        request: &MockRequest,
    ) -> Result<(), MockError> {
        let secret = definition.auth_secret.as_deref().unwrap_or_default();

        match definition.auth_mode {
            AuthMode::None => Ok(()),
            AuthMode::BearerToken => {
                let header = request.header("authorization").ok_or_else(|| {
                    MockError::Unauthorized("Missing Authorization header".to_string())
                })?;
                match bearer_token(header) {
                    Some(token) if !secret.is_empty() && token == secret => Ok(()),
                    _ => Err(MockError::Unauthorized("Invalid bearer token".to_string())),
                }
            }
            AuthMode::ApiKey => {
                let key = request.header(&self.api_key_header).ok_or_else(|| {
                    MockError::Unauthorized(format!("Missing {} header", self.api_key_header))
                })?;
                if !secret.is_empty() && key == secret {
                    Ok(())
                } else {
                    Err(MockError::Unauthorized("Invalid API key".to_string()))
                }
            }
        }
    }
}

/// Reject definitions whose expiry has passed.
pub fn check_expiry(definition: &MockDefinition, now: DateTime<Utc>) -> Result<(), MockError> {
    if definition.is_expired(now) {
        Err(MockError::Expired)
    } else {
        Ok(())
    }
}

/// Reject requests whose method differs from the configured one.
pub fn check_method(definition: &MockDefinition, request: &MockRequest) -> Result<(), MockError> {
    if request.method.eq_ignore_ascii_case(definition.method.as_str()) {
        Ok(())
    } else {
        Err(MockError::MethodNotAllowed {
            expected: definition.method.to_string(),
        })
    }
}

/// Extract the token from a `Bearer <token>` header value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim())
    } else {
        None
    }
}
