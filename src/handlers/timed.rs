use async_trait::async_trait;
use std::sync::Arc;

use crate::constants::{EVENT_DELAYED_RUN, EVENT_NEXT_RUN};
use crate::custom_commands::CcEngine;
use crate::error::CcError;
use crate::schedule::{DueOutcome, RegistryBuilder, ScheduledEvent, ScheduledEventHandler};

/// Delivers `cc_delayed_run` events
pub struct DelayedRunHandler {
    engine: Arc<CcEngine>,
}

#[async_trait]
impl ScheduledEventHandler for DelayedRunHandler {
    async fn on_due(&self, event: &ScheduledEvent) -> Result<DueOutcome, CcError> {
        self.engine.handle_delayed_run(event).await
    }
}

/// Delivers `cc_next_run` events
pub struct NextRunHandler {
    engine: Arc<CcEngine>,
}

#[async_trait]
impl ScheduledEventHandler for NextRunHandler {
    async fn on_due(&self, event: &ScheduledEvent) -> Result<DueOutcome, CcError> {
        self.engine.handle_next_run(event).await
    }
}

/// Add the custom command event handlers to a registry under construction
pub fn register_handlers(builder: RegistryBuilder, engine: &Arc<CcEngine>) -> RegistryBuilder {
    builder
        .register(
            EVENT_DELAYED_RUN,
            Arc::new(DelayedRunHandler {
                engine: Arc::clone(engine),
            }),
        )
        .register(
            EVENT_NEXT_RUN,
            Arc::new(NextRunHandler {
                engine: Arc::clone(engine),
            }),
        )
}
