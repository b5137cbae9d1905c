//! Thin HTTP façade over the ingestion pipeline
//!
//! Submit and query jobs; everything of substance happens in
//! `docflow-pipeline`. JWT validation is an upstream concern - this
//! surface trusts the `x-tenant-id` header it is handed.

pub mod error;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
