//! Browser relay — local web page for watching and poking the robot.
//!
//! Provides:
//! - `http`: incremental HTTP/1.1 request parsing and responses
//! - `routes`: endpoint dispatch and held-key head control
//! - `server`: TCP listener, per-client state, camera streaming
//!
//! The relay trusts its local network; nothing here authenticates.

pub mod http;
pub mod routes;
pub mod server;

pub use server::run;
