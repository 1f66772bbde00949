use poise::serenity_prelude::GuildId;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing::{error, info, warn};

use crate::constants::COMMANDS_CHANGED_CHANNEL;
use crate::custom_commands::CcEngine;
use crate::database::Database;

/// Parse `guild_id` or `guild_id:local_id`
pub fn parse_change_payload(payload: &str) -> Option<(GuildId, Option<i64>)> {
    let mut parts = payload.trim().splitn(2, ':');
    let guild = parts.next()?.parse::<u64>().ok().filter(|id| *id != 0)?;
    let local_id = match parts.next() {
        Some(raw) => Some(raw.parse::<i64>().ok()?),
        None => None,
    };
    Some((GuildId::new(guild), local_id))
}

/// Follow command edits made outside this process
pub fn start_change_listener(db: Database, engine: Arc<CcEngine>) {
    tokio::spawn(async move {
        loop {
            let mut listener = match db.listen(COMMANDS_CHANGED_CHANNEL).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Failed to listen for custom command changes: {}", e);
                    sleep(Duration::from_secs(60)).await;
                    continue;
                }
            };
            info!("Listening for custom command changes");

            loop {
                let notification = match listener.recv().await {
                    Ok(notification) => notification,
                    Err(e) => {
                        error!("Custom command change listener failed: {}", e);
                        break;
                    }
                };

                let Some((guild_id, local_id)) = parse_change_payload(notification.payload()) else {
                    warn!("Ignoring malformed change payload '{}'", notification.payload());
                    continue;
                };
                if let Err(e) = engine.on_command_changed(guild_id, local_id).await {
                    error!("Failed to apply custom command change in guild {}: {}", guild_id, e);
                }
            }

            sleep(Duration::from_secs(5)).await;
        }
    });
}
