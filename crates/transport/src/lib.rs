//! Remote execution of tool functions over line-delimited JSON.
//!
//! A [`Server`] hosts the function tables of many tools in a [`Registry`]
//! keyed by tool id. A [`Client`] on the other end of the connection
//! exposes those functions as a local [`toolspec::FunctionTable`], so the
//! runtime renders a remote tool exactly like a local one.
//!
//! # Example
//!
//! ```no_run
//! use transport::{Client, Registry, Server};
//! use toolspec::{FunctionTable, ToolSpec};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = ToolSpec::from_json(
//!     r#"{"id": "ops", "title": "Ops", "content": {"type": "actionButton", "action": "deploy"}}"#,
//! )?;
//!
//! let mut functions = FunctionTable::new();
//! functions.register("deploy", |_params| async { Ok(serde_json::json!("deployed")) });
//!
//! let mut registry = Registry::new();
//! registry.register(spec.id.clone(), functions);
//!
//! let (local, remote) = tokio::io::duplex(64 * 1024);
//! let (server_read, server_write) = tokio::io::split(remote);
//! let server = Server::new(registry);
//! tokio::spawn(async move { server.serve(server_read, server_write).await });
//!
//! let (client_read, client_write) = tokio::io::split(local);
//! let client = Client::connect(client_read, client_write);
//! let value = client.invoke("ops", "deploy", serde_json::Value::Null).await?;
//! assert_eq!(value, "deployed");
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod protocol;
mod registry;
mod server;

pub use client::{Client, RemoteFunction, RemoteStream};
pub use error::{Error, Result};
pub use protocol::{MAX_FRAME_SIZE, Message, RequestId, into_result};
pub use registry::Registry;
pub use server::Server;
