/// Utility modules for common functionality
pub mod messages;
pub mod permissions;
pub mod string_utils;
pub mod validation;
