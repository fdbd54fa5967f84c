//! Crafting automation core: session engine, event stream, and the REST +
//! WebSocket control surface.

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod events;
pub mod server;
pub mod session;
pub mod snapshot;
