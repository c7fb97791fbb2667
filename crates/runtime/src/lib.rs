//! Rendering and synchronization runtime for tool specifications.
//!
//! This crate turns a [`toolspec::ToolSpec`] into an interactive view and
//! routes user interaction back to the developer functions behind it.
//!
//! # Overview
//!
//! The runtime is organized around these concepts:
//!
//! - **Invocation**: the single path into developer code ([`invoke`],
//!   [`invoke_with`]). Reports Pending, then exactly one of Fulfilled or
//!   Rejected.
//! - **Renderer**: dispatches on the content variant, owns the filter
//!   inputs, and routes [`Action`]s to the rendered component.
//! - **EditableGrid**: server-side paging and sorting with inline row
//!   editing. Stale page fetches are discarded by generation.
//! - **LiveGrid**: applies an ordered stream of [`toolspec::StreamEvent`]s
//!   to an identity-keyed row cache and owns the stream's cleanup handle.
//!
//! # Example
//!
//! ```no_run
//! use runtime::{Action, Renderer, RuntimeConfig};
//! use serde_json::json;
//! use toolspec::{FunctionTable, ToolSpec};
//!
//! # async fn example() -> runtime::Result<()> {
//! let mut functions = FunctionTable::new();
//! functions.register("loadUsers", |_params| async {
//!     Ok(json!({"items": [{"id": 1, "name": "Ada"}], "totalItems": 1}))
//! });
//!
//! let spec = ToolSpec::from_json(r#"{
//!     "id": "users",
//!     "title": "Users",
//!     "content": {"type": "editableGrid", "dataLoader": "loadUsers", "columns": ["id", "name"]}
//! }"#)
//! .map_err(|e| runtime::Error::Config(e.to_string()))?
//! .with_functions(functions);
//!
//! let mut renderer = Renderer::new(spec, RuntimeConfig::default());
//! renderer.render().await;
//! renderer.handle(Action::Refresh).await?;
//! println!("{}", renderer.view());
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod format;
mod grid;
mod inputs;
mod invoke;
mod live;
mod render;
mod statics;
mod view;

pub use config::RuntimeConfig;
pub use error::{Error, GridError, InvokeError, Result};

// Invocation protocol
pub use invoke::{
    Callbacks, Lifecycle, invoke, invoke_with, resolve_call, resolve_stream, start_stream,
};

// Components
pub use grid::{EditState, EditableGrid, FetchTicket, GridStatus, SaveOutcome, SaveTicket};
pub use live::{ConnectionStatus, LiveGrid};
pub use statics::{ActionButton, ActionState, Form, FormState, RecordView};

// Dispatch and output
pub use format::{format_value, input_text};
pub use inputs::{FilterInputs, Refresh};
pub use render::{Action, Component, Renderer};
pub use view::{
    ButtonView, CellView, FormView, HeaderView, InputView, PaginationView, RowView, TableView, View,
};
