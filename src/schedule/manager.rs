use chrono::Utc;
use std::time::Duration;
use tokio::time::{interval, sleep};
use tracing::{debug, error, info, warn};

use super::registry::HandlerRegistry;
use super::types::{DueOutcome, ScheduledEvent};
use crate::constants::{
    DELAYED_RUN_BURST, DELAYED_RUN_RATE_PER_SEC, KV_PURGE_INTERVAL_SECS,
    SCHEDULER_BACKOFF_MAX_MILLIS, SCHEDULER_BACKOFF_START_MILLIS, SCHEDULER_CLAIM_BATCH, SCHEDULER_LEASE_SECS, SCHEDULER_MAX_ATTEMPTS,
};
use crate::custom_commands::full_refill_after;
use crate::database::Database;
use crate::error::CcError;

/// Delay before the given (1-based) retry: 1s doubling up to 10s
fn retry_backoff(attempt: i32) -> Duration {
    let shift = attempt.saturating_sub(1).clamp(0, 16) as u32;
    let millis = SCHEDULER_BACKOFF_START_MILLIS
        .saturating_mul(1u64 << shift)
        .min(SCHEDULER_BACKOFF_MAX_MILLIS);
    Duration::from_millis(millis)
}

/// What to write back after a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
enum Settlement {
    Processed(Option<String>),
    Retry { attempts: i32, reason: String },
}

fn settle(attempts: i32, outcome: Result<DueOutcome, CcError>) -> Settlement {
    let retry = |reason: String| {
        let attempts = attempts + 1;
        if attempts >= SCHEDULER_MAX_ATTEMPTS {
            Settlement::Processed(Some(format!("gave up after {} attempts: {}", attempts, reason)))
        } else {
            Settlement::Retry { attempts, reason }
        }
    };

    match outcome {
        Ok(DueOutcome::Done) => Settlement::Processed(None),
        Ok(DueOutcome::Retry) => retry("retry requested".to_string()),
        Err(e) if e.is_permanent() => Settlement::Processed(Some(e.to_string())),
        Err(e) => retry(e.to_string()),
    }
}

/// Start the worker that delivers due scheduled events
pub fn start_schedule_manager(db: Database, registry: HandlerRegistry, poll: Duration) {
    tokio::spawn(async move {
        info!(
            "Schedule manager started, handling: {}",
            registry.names().join(", ")
        );

        let mut purge = interval(Duration::from_secs(KV_PURGE_INTERVAL_SECS));
        let bucket_idle = full_refill_after(DELAYED_RUN_RATE_PER_SEC, DELAYED_RUN_BURST);

        loop {
            tokio::select! {
                _ = sleep(poll) => {}
                _ = purge.tick() => {
                    match db.purge_expired_keys().await {
                        Ok(0) => {}
                        Ok(n) => debug!("Purged {} expired guard keys", n),
                        Err(e) => error!("Failed to purge expired guard keys: {}", e),
                    }
                    match db.purge_idle_buckets(bucket_idle).await {
                        Ok(0) => {}
                        Ok(n) => debug!("Purged {} idle rate buckets", n),
                        Err(e) => error!("Failed to purge idle rate buckets: {}", e),
                    }
                    continue;
                }
            }

            match db.claim_due_events(SCHEDULER_CLAIM_BATCH, SCHEDULER_LEASE_SECS).await {
                Ok(events) => {
                    for event in events {
                        tokio::spawn(deliver(db.clone(), registry.clone(), event));
                    }
                }
                Err(e) => {
                    error!("Failed to claim scheduled events: {}", e);
                    sleep(Duration::from_secs(60)).await; // Retry in 1 minute
                }
            }
        }
    });
}

async fn deliver(db: Database, registry: HandlerRegistry, event: ScheduledEvent) {
    let outcome = registry.dispatch(&event).await;
    if let Err(e) = &outcome {
        warn!(
            "Scheduled event {} ({}) for guild {} failed: {}",
            event.id, event.name, event.guild_id, e
        );
    }

    let written = match settle(event.attempts, outcome) {
        Settlement::Processed(error) => {
            db.mark_event_processed(event.id, event.generation, error.as_deref())
                .await
        }
        Settlement::Retry { attempts, reason } => {
            let at = Utc::now() + chrono::Duration::milliseconds(retry_backoff(attempts).as_millis() as i64);
            db.reschedule_event(event.id, event.generation, at, attempts, &reason)
                .await
        }
    };

    match written {
        Ok(true) => {}
        Ok(false) => debug!("Scheduled event {} was replaced while running", event.id),
        Err(e) => error!("Failed to settle scheduled event {}: {}", event.id, e),
    }
}
