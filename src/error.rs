use thiserror::Error;

/// Errors raised while matching, running or scheduling custom commands
#[derive(Debug, Error)]
pub enum CcError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("discord error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid trigger pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid cron expression `{0}`")]
    InvalidCron(String),

    #[error("Couldn't find custom command #{0}")]
    UnknownCommand(i64),

    #[error("Unknown channel")]
    UnknownChannel,

    #[error("Unknown member")]
    UnknownMember,

    #[error("custom command #{0} is disabled")]
    CommandDisabled(i64),

    #[error("custom command group of #{0} is disabled")]
    GroupDisabled(i64),

    #[error("Max nested immediate execCC calls reached ({0})")]
    MaxNestedCalls(u8),

    #[error("Too many calls to {0}")]
    TooManyCalls(&'static str),

    #[error("interaction has already been responded to")]
    AlreadyResponded,

    #[error("unknown trigger type {0}")]
    UnknownTriggerType(i32),

    #[error("{0}")]
    Script(String),

    #[error("no handler registered for scheduled event `{0}`")]
    NoHandler(String),
}

impl CcError {
    /// Scheduled deliveries failing with these are dropped instead of retried
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            CcError::UnknownCommand(_)
                | CcError::CommandDisabled(_)
                | CcError::GroupDisabled(_)
                | CcError::Payload(_)
                | CcError::NoHandler(_)
                | CcError::UnknownTriggerType(_)
        )
    }

    /// Errors that come from the script itself rather than the bot's plumbing
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            CcError::Script(_)
                | CcError::MaxNestedCalls(_)
                | CcError::TooManyCalls(_)
                | CcError::AlreadyResponded
                | CcError::UnknownCommand(_)
                | CcError::UnknownChannel
        )
    }
}
