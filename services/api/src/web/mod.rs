pub mod activity;
pub mod answer_task;
pub mod protocol;
pub mod relay;
pub mod rest;
pub mod reward;
pub mod router;
pub mod state;
pub mod status_task;

// Re-export the router builder so the binary and the HTTP tests share one wiring.
pub use router::build_router;
