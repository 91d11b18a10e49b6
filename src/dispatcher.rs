//! Mock request dispatcher.
//!
//! Resolves an inbound request to a stored definition and produces the
//! simulated response.

use crate::config::GlobalSettings;
use crate::definition::MockDefinition;
use crate::error::MockError;
use crate::matcher::{Matcher, MockRequest};
use crate::store::{DefinitionStore, MemoryStore};
use crate::template;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Methods advertised in CORS responses.
pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, PATCH, OPTIONS";

/// A simulated HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: u16,
    /// Applied in order; a later entry replaces an earlier one with the same name.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl MockResponse {
    /// Case-insensitive lookup of the effective header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Invocation counters reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStats {
    pub status: &'static str,
    pub requests_total: u64,
    pub requests_served: u64,
    pub requests_rejected: u64,
}

/// Where a definition was resolved from.
enum Source {
    Store,
    Demo,
}

/// Mock Dispatcher
///
/// Runs each invocation through resolve, expiry, credential, method, delay,
/// stats update, render and respond.
pub struct MockDispatcher {
    store: Arc<dyn DefinitionStore>,
    demos: MemoryStore,
    matcher: Matcher,
    log_invocations: bool,
    /// Total invocations received.
    requests_total: AtomicU64,
    /// Invocations answered with the definition's response.
    requests_served: AtomicU64,
    /// Invocations rejected by a check.
    requests_rejected: AtomicU64,
    /// Whether the server is shutting down.
    draining: AtomicBool,
}

impl MockDispatcher {
    /// Create a dispatcher over `store`, falling back to `demos`.
    pub fn new(
        store: Arc<dyn DefinitionStore>,
        demos: Vec<MockDefinition>,
        settings: &GlobalSettings,
    ) -> Self {
        info!(
            backend = store.backend_name(),
            demos = demos.len(),
            api_key_header = %settings.api_key_header,
            "Mock dispatcher initialized"
        );

        Self {
            store,
            demos: MemoryStore::from_definitions(demos),
            matcher: Matcher::new(&settings.api_key_header),
            log_invocations: settings.log_invocations,
            requests_total: AtomicU64::new(0),
            requests_served: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            draining: AtomicBool::new(false),
        }
    }

    /// Check if the dispatcher is draining.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Mark the dispatcher as draining.
    pub fn start_draining(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn total_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }

    pub fn total_rejected(&self) -> u64 {
        self.requests_rejected.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            status: if self.is_draining() { "draining" } else { "ok" },
            requests_total: self.total_requests(),
            requests_served: self.total_served(),
            requests_rejected: self.total_rejected(),
        }
    }

    /// Produce the response for an invocation of mock `id`.
    pub async fn dispatch(&self, id: &str, request: &MockRequest) -> MockResponse {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        match self.try_dispatch(id, request).await {
            Ok(response) => {
                self.requests_served.fetch_add(1, Ordering::Relaxed);
                response
            }
            Err(err) => {
                self.requests_rejected.fetch_add(1, Ordering::Relaxed);
                info!(
                    mock_id = %id,
                    method = %request.method,
                    status = err.status(),
                    reason = %err,
                    "Mock invocation rejected"
                );
                self.error_response(&err)
            }
        }
    }

    /// CORS preflight response.
    pub fn preflight(&self) -> MockResponse {
        MockResponse {
            status: 204,
            headers: self.cors_headers(),
            body: None,
        }
    }

    async fn try_dispatch(
        &self,
        id: &str,
        request: &MockRequest,
    ) -> Result<MockResponse, MockError> {
        let (definition, source) = self.resolve(id).await?;

        self.matcher.admit(&definition, request, Utc::now())?;

        if definition.delay_ms > 0 {
            debug!(mock_id = %id, delay_ms = definition.delay_ms, "Applying delay");
            tokio::time::sleep(Duration::from_millis(definition.delay_ms)).await;
        }

        self.record_invocation(&definition, source).await?;

        let rendered = template::render(&definition.response_template);
        if self.log_invocations {
            info!(
                mock_id = %id,
                method = %request.method,
                status = definition.status_code,
                "Mock invocation served"
            );
        }

        let mut headers = vec![("Content-Type".to_string(), rendered.content_type().to_string())];
        headers.extend(self.cors_headers());
        headers.extend(
            definition
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );

        Ok(MockResponse {
            status: definition.status_code,
            headers,
            body: Some(rendered.into_body()),
        })
    }

    /// Look the id up in the store, then among the demos.
    async fn resolve(&self, id: &str) -> Result<(MockDefinition, Source), MockError> {
        let stored = match self.store.get(id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(mock_id = %id, error = %e, "Store lookup failed, trying demos");
                if let Ok(Some(demo)) = self.demos.get(id).await {
                    return Ok((demo, Source::Demo));
                }
                return Err(MockError::Storage);
            }
        };
        if let Some(definition) = stored {
            return Ok((definition, Source::Store));
        }

        match self.demos.get(id).await {
            Ok(Some(demo)) => Ok((demo, Source::Demo)),
            _ => Err(MockError::NotFound(id.to_string())),
        }
    }

    /// Bump the invocation counter where the definition came from.
    async fn record_invocation(
        &self,
        definition: &MockDefinition,
        source: Source,
    ) -> Result<(), MockError> {
        let result = match source {
            Source::Store => self.store.record_invocation(&definition.id, Utc::now()).await,
            Source::Demo => self.demos.record_invocation(&definition.id, Utc::now()).await,
        };

        match result {
            Ok(Some(updated)) => {
                debug!(mock_id = %updated.id, request_count = updated.request_count, "Invocation recorded");
                Ok(())
            }
            Ok(None) => {
                debug!(mock_id = %definition.id, "Definition removed during invocation");
                Ok(())
            }
            Err(e) => {
                warn!(mock_id = %definition.id, error = %e, "Failed to record invocation");
                Err(MockError::Storage)
            }
        }
    }

    fn cors_headers(&self) -> Vec<(String, String)> {
        vec![
            ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
            (
                "Access-Control-Allow-Methods".to_string(),
                CORS_ALLOW_METHODS.to_string(),
            ),
            (
                "Access-Control-Allow-Headers".to_string(),
                format!(
                    "Content-Type, Authorization, {}",
                    self.matcher.api_key_header()
                ),
            ),
        ]
    }

    fn error_response(&self, err: &MockError) -> MockResponse {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        headers.extend(self.cors_headers());
        MockResponse {
            status: err.status(),
            headers,
            body: Some(err.to_json().to_string()),
        }
    }
}
