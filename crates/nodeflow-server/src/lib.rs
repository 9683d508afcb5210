//! Local HTTP gateway for the node-based generation editor.
//!
//! Serves `/api/generate` (Gemini, Replicate and fal.ai behind one request
//! shape), content-addressed save/load of generated media, model parameter
//! schemas and a health check.

pub mod cli;
pub mod error;
pub mod hosted;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::{build_router, init_tracing, start_server};
pub use state::AppState;
