use poise::serenity_prelude::GuildId;

/// Validation error types
#[derive(Debug)]
pub enum ValidationError {
    NotInGuild,
    InvalidCommandId(i64),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::NotInGuild => write!(f, "This command must be used in a server"),
            ValidationError::InvalidCommandId(id) => write!(f, "Invalid custom command id: {}", id),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Ensure a command was invoked inside a guild
pub fn require_guild(guild_id: Option<GuildId>) -> Result<GuildId, ValidationError> {
    guild_id.ok_or(ValidationError::NotInGuild)
}

/// Custom command ids are positive and local to their guild
pub fn validate_command_id(id: i64) -> Result<i64, ValidationError> {
    if id < 1 {
        return Err(ValidationError::InvalidCommandId(id));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_guild() {
        assert!(require_guild(None).is_err());
        assert!(require_guild(Some(GuildId::new(123))).is_ok());
    }

    #[test]
    fn test_validate_command_id() {
        assert_eq!(validate_command_id(4).unwrap(), 4);
        assert!(validate_command_id(0).is_err());
        assert!(validate_command_id(-3).is_err());
    }
}
