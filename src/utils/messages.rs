/// Pure functions for formatting error and success messages (Discord-agnostic)

/// Format a validation error message with emoji
pub fn format_error(message: &str) -> String {
    format!("❌ {}", message)
}

/// Format a success message with emoji
pub fn format_success(message: &str) -> String {
    format!("✅ {}", message)
}

/// Format an info message with emoji
pub fn format_info(message: &str) -> String {
    format!("ℹ️ {}", message)
}

/// Truncate a long message with ellipsis
pub fn truncate_message(message: &str, max_length: usize) -> String {
    if message.chars().count() <= max_length {
        message.to_string()
    } else if max_length < 3 {
        message.chars().take(max_length).collect()
    } else {
        let truncated: String = message.chars().take(max_length - 3).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error() {
        assert_eq!(format_error("Something failed"), "❌ Something failed");
    }

    #[test]
    fn test_format_success() {
        assert_eq!(format_success("It worked"), "✅ It worked");
    }

    #[test]
    fn test_format_info() {
        assert_eq!(format_info("Good to know"), "ℹ️ Good to know");
    }

    #[test]
    fn test_truncate_message_long() {
        assert_eq!(truncate_message("This is a very long message", 10), "This is...");
    }

    #[test]
    fn test_truncate_message_multibyte() {
        assert_eq!(truncate_message("ééééé", 5), "ééééé");
        assert_eq!(truncate_message("éééééé", 5), "éé...");
    }

    #[test]
    fn test_truncate_message_very_short_limit() {
        assert_eq!(truncate_message("Hello", 2), "He");
        assert_eq!(truncate_message("Hello", 0), "");
    }
}
