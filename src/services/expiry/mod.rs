pub mod scheduler;

pub use scheduler::{run_expiry_pass, spawn_expiry_scheduler, ExpiryReport};
