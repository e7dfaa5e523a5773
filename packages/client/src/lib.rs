//! Terminal client for pwchat.
//!
//! Two independent state machines drive the client:
//!
//! - [`connection`]: one WebSocket per room with exponential-backoff reconnect
//! - [`poller`]: MCP connection status polling with adaptive cadence
//!
//! Both report to the terminal through the traits in [`ui`].

pub mod connection;
pub mod domain;
pub mod error;
pub mod formatter;
pub mod poller;
pub mod runner;
pub mod store;
pub mod ui;

pub use connection::{ConnectionConfig, ConnectionController, ConnectionSnapshot};
pub use error::ClientError;
pub use poller::{HttpMcpApi, McpApi, McpCommand, PollState, StatusPoller};
pub use runner::{ClientOptions, run_client};
pub use store::LocalStore;
