//! Utility functions and helpers.

pub mod id_generator;
pub mod sql_guard;

pub use id_generator::IdGenerator;
pub use sql_guard::SqlGuard;
