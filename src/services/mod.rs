/// Discord and script runtime implementations of the engine's collaborators
pub mod discord;
pub mod template;

pub use discord::{DiscordSink, DiscordState, member_info};
pub use template::PlainTextEngine;
