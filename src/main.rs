mod commands;
mod config;
mod constants;
mod custom_commands;
mod database;
mod error;
mod handlers;
mod models;
mod schedule;
mod services;
mod utils;

use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    commands::{cc_diagnose, cc_run_now},
    config::Config,
    constants::LOG_DIRECTIVE,
    custom_commands::{CcEngine, EngineParts, Limits},
    database::Database,
    handlers::{handle_event, register_handlers, start_change_listener},
    models::Data,
    schedule::{RegistryBuilder, start_schedule_manager},
    services::{DiscordSink, DiscordState, PlainTextEngine},
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    initialize_logging();

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Connect to database
    let db = match Database::new(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if config.dev_guild_id.is_some() {
        info!("Development mode: Commands will be registered to guild only");
    }

    // Create and start the bot
    if let Err(e) = start_bot(config, db).await {
        error!("Bot error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the logging system
fn initialize_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(LOG_DIRECTIVE.parse().expect("valid log directive")),
        )
        .init();
}

/// Create and start the Discord bot
async fn start_bot(config: Config, db: Database) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let token = config.discord_token.clone();

    // Create framework
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![cc_diagnose(), cc_run_now()],
            event_handler: |_ctx, event, _framework, data| {
                Box::pin(async move {
                    handle_event(event, data).await;
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                let state = Arc::new(DiscordState::new(ctx.http.clone(), ctx.cache.clone()));
                let engine = CcEngine::new(EngineParts {
                    store: Arc::new(db.clone()),
                    cache_ttl: config.command_cache_ttl,
                    state: state.clone(),
                    templates: Arc::new(PlainTextEngine),
                    sink: Arc::new(DiscordSink::new(ctx.http.clone())),
                    scheduler: Arc::new(db.clone()),
                    kv: Arc::new(db.clone()),
                    limits: Limits::new(config.premium_guilds.clone()),
                    bot_id: ready.user.id,
                    default_prefix: config.default_prefix.clone(),
                });

                // Timed commands that missed their run while the bot was down
                match engine.repair_overdue_schedules().await {
                    Ok(0) => {}
                    Ok(count) => info!("Re-armed {} overdue timed custom command(s)", count),
                    Err(e) => error!("Failed to re-arm overdue timed custom commands: {}", e),
                }

                // Start schedule manager
                let registry = register_handlers(RegistryBuilder::new(), &engine).build();
                info!("Scheduled event handlers: {:?}", registry.names());
                start_schedule_manager(db.clone(), registry, config.scheduler_poll);
                info!("Schedule manager task started");

                start_change_listener(db, Arc::clone(&engine));

                // Register commands based on dev_guild_id
                if let Some(guild_id) = config.dev_guild_id {
                    let guild = serenity::GuildId::new(guild_id);
                    info!("Registering commands in development guild: {}", guild_id);
                    poise::builtins::register_in_guild(ctx, &framework.options().commands, guild)
                        .await?;
                    info!(
                        "Commands registered in guild {} (instant updates)",
                        guild_id
                    );
                } else {
                    info!("Registering commands globally (may take up to 1 hour)");
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                    info!("Commands registered globally");
                }

                info!("Bot is ready as {}", ready.user.name);

                Ok(Data { engine, state })
            })
        })
        .build();

    // Create client with required intents
    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MODERATION;

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    // Start the bot
    info!("Starting bot...");
    client.start().await?;

    Ok(())
}
