//! Configuration for the mock API engine.
//!
//! Defines server settings, the storage backend, and built-in demo
//! definitions.

use crate::definition::{DefinitionInput, MockDefinition};
use axum::http::HeaderName;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Lifetime given to demo definitions.
pub const DEMO_TTL_DAYS: i64 = 3650;

/// Main configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockEngineConfig {
    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,

    /// Where definitions are persisted
    #[serde(default)]
    pub storage: StorageConfig,

    /// Extra demo definitions served when an id is not in the store
    #[serde(default)]
    pub demos: Vec<DemoDefinition>,
}

impl MockEngineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.settings.validate()?;

        if let StorageConfig::File { directory } = &self.storage {
            if directory.as_os_str().is_empty() {
                anyhow::bail!("Storage directory cannot be empty");
            }
        }

        let mut seen = HashSet::new();
        for (i, demo) in self.demos.iter().enumerate() {
            let id = demo
                .id
                .as_deref()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| anyhow::anyhow!("Demo {}: id is required", i))?;
            if !seen.insert(id) {
                anyhow::bail!("Demo {}: duplicate id '{}'", i, id);
            }
            DefinitionInput::from(demo.clone())
                .validate()
                .map_err(|e| anyhow::anyhow!("Demo {} ({}): {}", i, id, e))?;
        }
        Ok(())
    }

    /// Lifetime of newly created definitions.
    pub fn default_ttl(&self) -> Duration {
        Duration::days(i64::from(self.settings.default_ttl_days))
    }

    /// Number of demo definitions that will be served.
    pub fn demo_count(&self) -> usize {
        let builtin = if self.settings.builtin_demos {
            builtin_demos().len()
        } else {
            0
        };
        builtin + self.demos.len()
    }

    /// Build the demo definitions, configured ones overriding built-ins.
    pub fn demo_definitions(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<MockDefinition>> {
        let mut inputs = if self.settings.builtin_demos {
            builtin_demos()
        } else {
            Vec::new()
        };
        inputs.extend(self.demos.iter().cloned().map(DefinitionInput::from));

        let mut by_id = BTreeMap::new();
        for input in inputs {
            let def = input
                .into_definition(now, Duration::days(DEMO_TTL_DAYS))
                .map_err(|e| anyhow::anyhow!("Invalid demo definition: {}", e))?;
            by_id.insert(def.id.clone(), def);
        }
        Ok(by_id.into_values().collect())
    }
}

/// A demo definition in the config file.
///
/// Same keys as the create payload of `POST /mock-definitions`, but a
/// misspelled key is an error rather than being ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DemoDefinition {
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
}

impl From<DemoDefinition> for DefinitionInput {
    fn from(demo: DemoDefinition) -> Self {
        DefinitionInput {
            id: demo.id,
            name: demo.name,
            description: demo.description,
            endpoint: demo.endpoint,
            method: demo.method,
            response_template: demo.response_template,
            status_code: demo.status_code,
            delay_ms: demo.delay_ms,
            headers: demo.headers,
            is_shared: demo.is_shared,
            owner_id: demo.owner_id,
            auth_mode: demo.auth_mode,
            auth_secret: demo.auth_secret,
            rate_limit: demo.rate_limit,
            expires_at: None,
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// In-process only; definitions are lost on restart
    #[default]
    Memory,
    /// One JSON file per key under `directory`, with in-process fallback
    File { directory: PathBuf },
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Days until a newly created definition expires
    #[serde(default = "default_ttl_days")]
    pub default_ttl_days: u32,

    /// Header carrying the credential for `apiKey` mocks
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// Prefix for `invokeUrl` in create responses (e.g. "https://mocks.example.com")
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Log every served invocation
    #[serde(default = "default_true")]
    pub log_invocations: bool,

    /// Serve the built-in demo definitions
    #[serde(default = "default_true")]
    pub builtin_demos: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            default_ttl_days: default_ttl_days(),
            api_key_header: default_api_key_header(),
            public_base_url: None,
            log_invocations: true,
            builtin_demos: true,
        }
    }
}

impl GlobalSettings {
    /// Validate the settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.bind_address
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", self.bind_address, e))?;
        if self.default_ttl_days == 0 {
            anyhow::bail!("default_ttl_days must be at least 1");
        }
        HeaderName::from_bytes(self.api_key_header.as_bytes()).map_err(|_| {
            anyhow::anyhow!("Invalid api_key_header: {}", self.api_key_header)
        })?;
        Ok(())
    }

    /// Externally invocable URL for a mock path.
    pub fn invoke_url(&self, path: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
            None => path.to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_ttl_days() -> u32 {
    30
}

fn default_api_key_header() -> String {
    "x-api-key".to_string()
}

/// Demo definitions shipped with the engine.
pub fn builtin_demos() -> Vec<DefinitionInput> {
    vec![
        DefinitionInput {
            id: Some("demo-users".into()),
            name: Some("Demo user list".into()),
            description: Some("A list of generated users".into()),
            endpoint: Some("/users".into()),
            method: Some("GET".into()),
            response_template: Some(
                r#"{"users":[{"id":"{{uuid}}","name":"{{faker.name}}","email":"{{faker.email}}","avatar":"{{faker.avatar}}"},{"id":"{{uuid}}","name":"{{faker.name}}","email":"{{faker.email}}","avatar":"{{faker.avatar}}"}],"generatedAt":"{{datetime}}"}"#
                    .into(),
            ),
            status_code: Some(200),
            is_shared: Some(true),
            owner_id: Some("demo".into()),
            ..Default::default()
        },
        DefinitionInput {
            id: Some("demo-product".into()),
            name: Some("Demo product".into()),
            description: Some("A single product with a short delay".into()),
            endpoint: Some("/products/1".into()),
            method: Some("GET".into()),
            response_template: Some(
                r#"{"id":{{random.number}},"vendor":"{{faker.company}}","color":"{{faker.color}}","hex":"{{faker.hexColor}}","image":"{{faker.image}}","inStock":{{random.boolean}}}"#
                    .into(),
            ),
            status_code: Some(200),
            delay_ms: Some(250),
            is_shared: Some(true),
            owner_id: Some("demo".into()),
            ..Default::default()
        },
        DefinitionInput {
            id: Some("demo-secure".into()),
            name: Some("Demo protected order".into()),
            description: Some("Requires 'Authorization: Bearer demo-token'".into()),
            endpoint: Some("/orders".into()),
            method: Some("POST".into()),
            response_template: Some(
                r#"{"orderId":"{{uuid}}","createdAt":{{timestamp}},"note":"{{faker.lorem.sentence}}"}"#
                    .into(),
            ),
            status_code: Some(201),
            is_shared: Some(true),
            owner_id: Some("demo".into()),
            auth_mode: Some("bearerToken".into()),
            auth_secret: Some("demo-token".into()),
            ..Default::default()
        },
    ]
}
