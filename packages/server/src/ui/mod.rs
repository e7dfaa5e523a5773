//! HTTP and WebSocket front of the development server.

mod handler;
mod server;
mod signal;
pub mod state;

pub use server::Server;
