use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::types::{DueOutcome, ScheduledEvent, ScheduledEventHandler};
use crate::error::CcError;

/// Collects handlers during startup
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<&'static str, Arc<dyn ScheduledEventHandler>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: &'static str, handler: Arc<dyn ScheduledEventHandler>) -> Self {
        if self.handlers.insert(name, handler).is_some() {
            warn!("Scheduled event handler for '{}' registered twice, keeping the last one", name);
        }
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: Arc::new(self.handlers),
        }
    }
}

/// Immutable event name to handler table
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: Arc<HashMap<&'static str, Arc<dyn ScheduledEventHandler>>>,
}

impl HandlerRegistry {
    pub async fn dispatch(&self, event: &ScheduledEvent) -> Result<DueOutcome, CcError> {
        match self.handlers.get(event.name.as_str()) {
            Some(handler) => handler.on_due(event).await,
            None => Err(CcError::NoHandler(event.name.clone())),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
