/// Durable scheduled events: types, handler registry and the delivery worker
mod manager;
mod registry;
mod types;

// Re-export public types and functions
pub use manager::start_schedule_manager;
pub use registry::RegistryBuilder;
pub use types::{
    DueOutcome, EventScheduler, NewScheduledEvent, PendingFilter, ScheduledEvent, ScheduledEventHandler,
};
