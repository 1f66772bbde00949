use std::sync::Arc;

use crate::custom_commands::CcEngine;
use crate::services::DiscordState;

/// Bot state shared across all handlers
pub struct Data {
    /// Custom command engine behind every trigger entry point
    pub engine: Arc<CcEngine>,
    /// Gateway-fed guild state, also read by the engine
    pub state: Arc<DiscordState>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
