/// Log directive for the application
pub const LOG_DIRECTIVE: &str = "ccbot_rs=info";

/// Scheduled event carrying a one-shot deferred run
pub const EVENT_DELAYED_RUN: &str = "cc_delayed_run";

/// Scheduled event re-arming an interval or cron command
pub const EVENT_NEXT_RUN: &str = "cc_next_run";

/// Namespace prefix on component and modal custom ids that belong to custom commands
pub const COMPONENT_ID_PREFIX: &str = "templates-";

/// Maximum commands run from a single event
pub const EXEC_LIMIT: usize = 3;
pub const EXEC_LIMIT_PREMIUM: usize = 5;

/// Role trigger cooldown per (guild, user, role), in seconds
pub const ROLE_COOLDOWN_SECS: u64 = 300;
pub const ROLE_COOLDOWN_SECS_PREMIUM: u64 = 60;

/// Deepest frame allowed to start another zero-delay nested run
pub const MAX_NESTED_DEPTH: u8 = 2;

/// Nested or scheduled runs a single execution may request
pub const MAX_RUN_CALLS: u32 = 1;
pub const MAX_RUN_CALLS_PREMIUM: u32 = 10;

/// Cancellations of unique deferred runs a single execution may request
pub const MAX_CANCEL_CALLS: u32 = 2;
pub const MAX_CANCEL_CALLS_PREMIUM: u32 = 10;

/// Token bucket guarding scheduler-originated runs per (guild, channel)
pub const DELAYED_RUN_RATE_PER_SEC: f64 = 0.1;
pub const DELAYED_RUN_BURST: u32 = 10;

/// Discord message length limit
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Interval bounds in minutes (1 minute to 31 days)
pub const MIN_INTERVAL_MINUTES: i32 = 1;
pub const MAX_INTERVAL_MINUTES: i32 = 44_640;

/// A next-run event this far ahead of the command's stored next run is stale
pub const NEXT_RUN_STALE_SECS: i64 = 5;

/// Timed commands overdue by more than this are re-armed at startup
pub const OVERDUE_REPAIR_SECS: i64 = 3600;

/// Compiled trigger regexes are kept this long
pub const REGEX_CACHE_TTL_SECS: u64 = 600;
pub const REGEX_CACHE_CAPACITY: usize = 1024;

/// Scheduler retry policy
pub const SCHEDULER_MAX_ATTEMPTS: i32 = 10;
pub const SCHEDULER_BACKOFF_START_MILLIS: u64 = 1000;
pub const SCHEDULER_BACKOFF_MAX_MILLIS: u64 = 10_000;
pub const SCHEDULER_CLAIM_BATCH: i64 = 50;
pub const SCHEDULER_LEASE_SECS: f64 = 120.0;

/// Postgres channel notified when the dashboard edits a command
pub const COMMANDS_CHANGED_CHANNEL: &str = "custom_commands_changed";

/// Cooldown between manual runs per (guild, user), in seconds
pub const RUN_NOW_COOLDOWN_SECS: u64 = 5;

/// How often expired guard keys are purged from the database
pub const KV_PURGE_INTERVAL_SECS: u64 = 300;
