pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod poller;
pub mod providers;
pub mod router;
pub mod schema;
pub mod types;

pub use client::Gateway;
pub use config::{Config, ProviderConfig, ProviderKind};
pub use error::{ProviderError, Result};
pub use poller::{JobSource, JobStatus, PollableJob, Poller};
pub use schema::{ExtractedSchema, SchemaCache};
pub use types::*;
