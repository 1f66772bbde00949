// Command modules
mod diagnose;
mod run_now;

// Re-export all commands
pub use diagnose::cc_diagnose;
pub use run_now::cc_run_now;
