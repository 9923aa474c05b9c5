//! Background Tasks Module
//!
//! # Tasks
//! - Cache cleanup: sweeps expired entries at the configured interval

mod cleanup;

pub use cleanup::{spawn_cleanup_task, MIN_CLEANUP_INTERVAL};
