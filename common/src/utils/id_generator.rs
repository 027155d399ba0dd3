//! Unique ID generator.

use uuid::Uuid;

/// Generates unique identifiers for requests and chat turns.
pub struct IdGenerator;

impl IdGenerator {
    /// Generates a unique request ID (full UUID).
    pub fn request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Generates a chat turn ID (first 8 characters of a UUID).
    pub fn turn_id() -> String {
        Uuid::new_v4().simple().to_string()[..8].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_is_unique() {
        assert_ne!(IdGenerator::request_id(), IdGenerator::request_id());
    }

    #[test]
    fn test_turn_id_length() {
        assert_eq!(IdGenerator::turn_id().len(), 8);
    }
}
