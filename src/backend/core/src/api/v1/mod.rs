//! V1 API: scheduler actions and agent management.

pub mod routes;

pub use routes::{paths, v1_router, V1_PREFIX};
