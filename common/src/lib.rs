//! Shared building blocks for the SQL chatbot services.
//!
//! Configuration, the error type, logging setup, HTTP middleware,
//! request/response models and SQL utilities live here so the service
//! crate only carries orchestration.

pub mod config;
pub mod errors;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
