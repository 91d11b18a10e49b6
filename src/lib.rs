//! Mock API Engine
//!
//! User-definable virtual HTTP endpoints. Callers register a mock definition
//! (path, method, templated JSON body, status code, delay, auth requirement,
//! sharing and expiry) and the engine serves live traffic against it,
//! substituting placeholder tokens into the response on every invocation.
//!
//! # Features
//!
//! - **Definition Management**: Create, list, update and delete definitions with
//!   validation and owner checks
//! - **Dynamic Templates**: `{{uuid}}`, `{{datetime}}`, `{{faker.email}}` and friends
//!   are expanded independently on every request
//! - **Latency Simulation**: Per-definition artificial delay
//! - **Auth Simulation**: Bearer token or API key required on invocation
//! - **Expiry**: Definitions stop serving after their TTL without being deleted
//! - **Durable Storage**: File-backed store with in-process fallback
//!
//! # Example Configuration
//!
//! ```yaml
//! settings:
//!   bind_address: 0.0.0.0:3000
//!   default_ttl_days: 30
//! storage:
//!   type: file
//!   directory: ./data
//! demos:
//!   - id: hello-world
//!     name: Hello
//!     endpoint: /hello
//!     method: GET
//!     responseTemplate: '{"message":"Hello, {{faker.firstName}}!"}'
//! ```

pub mod config;
pub mod definition;
pub mod dispatcher;
pub mod error;
pub mod fake;
pub mod management;
pub mod matcher;
pub mod server;
pub mod store;
pub mod template;

pub use config::MockEngineConfig;
pub use definition::{DefinitionInput, MockDefinition};
pub use dispatcher::MockDispatcher;
pub use error::MockError;
pub use management::DefinitionService;
pub use server::{router, AppState};
