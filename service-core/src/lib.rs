//! service-core: shared infrastructure for the security platform services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
