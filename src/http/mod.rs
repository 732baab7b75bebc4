//! HTTP surface of the health check.
//!
//! - `server`: bind/serve/stop lifecycle
//! - `dispatch`: single-path matching and the 404/500 fallbacks
//! - `shutdown`: termination signals for the binary

mod dispatch;
mod server;
mod shutdown;

pub use server::HealthServer;
pub use shutdown::{setup_shutdown_handler, shutdown_signal};
