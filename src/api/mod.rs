//! API Module
//!
//! HTTP handlers and routing for the read/admin introspection surface.
//! Nothing here fetches data; it only reports on and administers the cache
//! and the recovery executor.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Cache statistics
//! - `GET /recovery` - Recovery status
//! - `POST /invalidate` - Invalidate by key, tag or pattern
//! - `POST /circuits/:operation_id/reset` - Reset a circuit breaker

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
